//! The capability interface the fixture consumes from a Raft instance
//! (§6), and the interface it exposes back via [`crate::IoBackend`].
//!
//! This is deliberately a *seam*, not an implementation: the fixture never
//! runs Raft's election/replication logic itself. Tests (including this
//! crate's own) supply a type implementing [`RaftInstance`].

use crate::io::IoBackend;
use crate::log::LogEntry;
use crate::message::Message;
use crate::Index;
use crate::Payload;
use crate::ServerId;
use crate::Term;

/// The lifecycle/voting state a Raft instance reports (§6: `state()`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RaftState {
    Follower,
    Candidate,
    Leader,
    /// Not yet started, or stopped.
    Unavailable,
}

impl RaftState {
    pub fn is_leader(self) -> bool {
        matches!(self, RaftState::Leader)
    }
}

/// One entry of the configuration the fixture assembles in
/// `Fixture::configuration` and passes to `RaftInstance::bootstrap` (§6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub id: ServerId,
    pub address: String,
    pub voting: bool,
}

/// A `{id, address, voting}` list describing the cluster membership at
/// bootstrap time (§3 "Lifecycle", §6 `configuration(n_voting, out)`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Configuration {
    pub servers: Vec<ServerConfig>,
}

impl Configuration {
    pub fn voting_ids(&self) -> Vec<ServerId> {
        self.servers.iter().filter(|s| s.voting).map(|s| s.id).collect()
    }

    pub fn voting_count(&self) -> usize {
        self.servers.iter().filter(|s| s.voting).count()
    }
}

/// The capability interface a Raft instance exposes to the fixture (§6).
///
/// Every method that mutates state is also handed a `&mut IoBackend<'_, P>`:
/// per the design note in §9, the fixture owns both the Raft instance and
/// its I/O backend, and the step engine invokes these methods directly
/// rather than storing boxed callbacks, so `RaftInstance` never needs to
/// hold its own reference back to the I/O backend — it only ever borrows
/// one, for the duration of a single call.
pub trait RaftInstance<P: Payload> {
    /// This instance's own id, fixed at construction time.
    fn id(&self) -> ServerId;

    fn state(&self) -> RaftState;
    fn current_term(&self) -> Term;
    fn voted_for(&self) -> Option<ServerId>;
    fn commit_index(&self) -> Index;
    fn last_applied(&self) -> Index;
    fn log_view(&self) -> &[LogEntry<P>];

    /// Seed this instance with the cluster's initial membership (§3
    /// Lifecycle: "bootstrap seeds identical initial log+configuration on
    /// all servers").
    fn bootstrap(&mut self, io: &mut IoBackend<'_, P>, config: &Configuration);

    /// Arm this instance's tick timer and begin participating (§3
    /// Lifecycle: "start arms tick timers").
    fn start(&mut self, io: &mut IoBackend<'_, P>);

    /// Stop participating. A stopped instance still exists in the fixture
    /// (it may be restarted) but is treated like a dead server for the
    /// purposes of ticking and receiving.
    fn stop(&mut self, io: &mut IoBackend<'_, P>);

    /// Invoked by the step engine when this server's tick timer expires.
    fn on_tick(&mut self, io: &mut IoBackend<'_, P>);

    /// Invoked by the step engine when a message addressed to this server
    /// is delivered.
    fn on_recv(&mut self, from: ServerId, message: Message<P>, io: &mut IoBackend<'_, P>);

    /// Invoked by the step engine when one of this server's `submit_append`
    /// requests completes (successfully or with an injected fault).
    fn on_append_complete(
        &mut self,
        token: crate::io::CallbackToken,
        result: Result<(), crate::error::IoFault>,
        io: &mut IoBackend<'_, P>,
    );

    /// Invoked by the step engine when one of this server's `submit_send`
    /// requests' send-callback fires (the local buffer is released; this is
    /// not delivery).
    fn on_send_complete(&mut self, token: crate::io::CallbackToken, io: &mut IoBackend<'_, P>);
}
