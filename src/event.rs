//! The event the step engine selected and fired on the most recent `step`
//! call (§4.D, §4.E) — returned to callers so tests and scenario helpers can
//! assert on what actually happened without re-deriving it from counters.

use crate::time::VirtualTime;

/// What kind of event fired.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// A server's tick timer expired.
    Tick,
    /// A message was delivered to a server.
    Network,
    /// A server's pending disk operation completed.
    Disk,
}

/// One fired event, as returned by [`crate::Fixture::step`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Event {
    /// The index (not id) of the server the event was delivered to.
    pub server_index: usize,
    pub kind: EventKind,
    pub time: VirtualTime,
}
