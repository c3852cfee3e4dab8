//! A deterministic, in-memory discrete-event test harness for Raft clusters.
//!
//! This crate drives N Raft instances through a shared virtual clock,
//! simulating disk I/O, network delivery and timer expiration so that tests
//! can exercise election, replication and membership flows with reproducible
//! event ordering. The Raft consensus algorithm itself, the application
//! state machine, and wire serialization are *not* implemented here: they
//! are external collaborators consumed through the [`RaftInstance`] trait.
//!
//! See the [`Fixture`] type for the entry point.

mod config;
mod connectivity;
mod error;
mod event;
mod fixture;
mod io;
mod log;
mod message;
mod raft_api;
mod safety;
mod scenario;
mod server;
mod time;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::FixtureConfig;
pub use connectivity::LinkState;
pub use error::FixtureError;
pub use error::IoFault;
pub use error::SafetyViolation;
pub use event::Event;
pub use event::EventKind;
pub use fixture::Fixture;
pub use io::CallbackToken;
pub use io::IoBackend;
pub use log::EntryKind;
pub use log::LogEntry;
pub use log::Snapshot;
pub use message::AppendEntries;
pub use message::AppendEntriesResponse;
pub use message::InstallSnapshot;
pub use message::InstallSnapshotResponse;
pub use message::Message;
pub use message::MessageKind;
pub use message::Vote;
pub use message::VoteResponse;
pub use raft_api::Configuration;
pub use raft_api::RaftInstance;
pub use raft_api::RaftState;
pub use raft_api::ServerConfig;

/// Identifies a server within a [`Fixture`] cluster.
///
/// Servers are conventionally numbered `1..=n` (server index `i` has id
/// `i + 1`), matching the `id = index + 1` convention in `fixture.h`.
pub type ServerId = u64;

/// A Raft term number.
pub type Term = u64;

/// A 1-based log index. `0` means "no entry".
pub type Index = u64;

/// Milliseconds on the fixture's virtual clock.
pub type Millis = u64;

/// The bound required of application payloads carried in log entries and
/// `AppendEntries` messages.
///
/// Mirrors `async_raft::AppData`, minus the `Send + Sync` async-runtime
/// bounds: the fixture is explicitly single-threaded (§5 Non-goals: "real
/// concurrency"), so `P` only needs to be cheap to clone and debug-print.
pub trait Payload: Clone + std::fmt::Debug + 'static {}

impl<T> Payload for T where T: Clone + std::fmt::Debug + 'static {}

/// The largest number of servers a single [`Fixture`] may hold, matching
/// `RAFT_FIXTURE_MAX_SERVERS` in `fixture.h`. `Fixture::with_config` may
/// raise this via `FixtureConfig::max_servers`, but it can never go below it.
pub const MIN_CAPACITY: usize = 8;
