//! Error taxonomy for the fixture (§7).
//!
//! Following the pattern `async_raft::error` uses for `RaftError` /
//! `ChangeConfigError` / `InitializeError`: small `thiserror` enums per
//! concern rather than one catch-all error type.

use thiserror::Error;

use crate::ServerId;
use crate::Term;

/// Errors surfaced synchronously by the fixture's control surface and I/O
/// backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FixtureError {
    /// Returned by `submit_send` when the sender→destination edge is
    /// disconnected at admission time.
    #[error("no connection from server {from} to server {to}")]
    NoConnection { from: ServerId, to: ServerId },

    /// Bad arguments to a scenario driver or control-surface call, e.g.
    /// `elect` when a leader already exists, or `grow` past capacity.
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    /// A control-surface call addressed a server index that doesn't exist.
    #[error("no server at index {0}")]
    UnknownServer(usize),

    /// `grow` was called when the fixture is already at its configured
    /// maximum server count.
    #[error("fixture is at capacity ({max} servers)")]
    CapacityExceeded { max: usize },
}

/// The failure handed back through an append (or send) callback when the
/// fault schedule is currently suppressing I/O (§3 "Fault schedule", §4.C).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("injected I/O fault")]
pub struct IoFault;

/// A fatal, unrecoverable violation of one of the fixture's safety
/// properties (§3 invariants 5–6, §8 properties 1–2).
///
/// Unlike [`FixtureError`], a `SafetyViolation` is never meant to be
/// handled: per §7, "fatal invariant violations terminate the step
/// immediately after detection ... they are never recovered." `Fixture::step`
/// returns it as an `Err` and the fixture must not be stepped again.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SafetyViolation {
    /// Election Safety: two servers reported leader state in the same term.
    #[error("election safety violated: servers {a} and {b} are both leader in term {term}")]
    TwoLeadersSameTerm { term: Term, a: ServerId, b: ServerId },

    /// Leader Append-Only: a stable leader's log was not a prefix-extension
    /// of the log snapshot taken on the previous step.
    #[error("leader append-only violated: leader {leader}'s log diverged from its previous snapshot")]
    LeaderLogRewritten { leader: ServerId },
}
