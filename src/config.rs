//! Fixture-wide tunables (§3 "defaults": disk latency 10ms, network latency
//! 15ms, election timeout `1000 + i*100`ms, minimum capacity 8 servers).

use crate::Millis;
use crate::MIN_CAPACITY;

/// Configuration for a [`crate::Fixture`], supplied to
/// `Fixture::with_config` (or defaulted via `Fixture::new`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixtureConfig {
    /// Simulated disk append latency, in milliseconds.
    pub disk_latency_ms: Millis,
    /// Simulated one-way network latency, in milliseconds.
    pub network_latency_ms: Millis,
    /// The base of the randomized election timeout: server `i`'s default
    /// timeout is `election_timeout_base_ms + i * election_timeout_stride_ms`.
    pub election_timeout_base_ms: Millis,
    pub election_timeout_stride_ms: Millis,
    /// The maximum number of servers the fixture can `grow` to. Never
    /// allowed below [`MIN_CAPACITY`].
    pub max_servers: usize,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            disk_latency_ms: 10,
            network_latency_ms: 15,
            election_timeout_base_ms: 1000,
            election_timeout_stride_ms: 100,
            max_servers: MIN_CAPACITY,
        }
    }
}

impl FixtureConfig {
    /// The default election timeout for server index `i`.
    pub fn election_timeout_for(&self, index: usize) -> Millis {
        self.election_timeout_base_ms + index as Millis * self.election_timeout_stride_ms
    }
}
