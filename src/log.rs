//! Persisted log entries and snapshots (§3 "Persisted state").

use crate::Index;
use crate::Payload;
use crate::Term;

/// The kind of a [`LogEntry`], mirroring `async_raft::raft::EntryPayload`
/// trimmed to what the fixture needs to track.
#[derive(Clone, Debug, PartialEq)]
pub enum EntryKind<P: Payload> {
    /// An empty entry committed by a new leader.
    Blank,
    /// An application-specific entry.
    Normal(P),
    /// A membership change entry.
    ConfigChange(Vec<crate::ServerId>),
}

/// A single entry in a server's persisted log.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry<P: Payload> {
    pub term: Term,
    pub index: Index,
    pub entry_type: EntryKind<P>,
}

impl<P: Payload> LogEntry<P> {
    pub fn blank(term: Term, index: Index) -> Self {
        Self {
            term,
            index,
            entry_type: EntryKind::Blank,
        }
    }

    pub fn normal(term: Term, index: Index, payload: P) -> Self {
        Self {
            term,
            index,
            entry_type: EntryKind::Normal(payload),
        }
    }
}

/// A point-in-time compaction of the log up to (and including) `last_index`.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot<P: Payload> {
    pub last_term: Term,
    pub last_index: Index,
    pub data: Vec<P>,
}

impl<P: Payload> Snapshot<P> {
    pub fn new(last_term: Term, last_index: Index, data: Vec<P>) -> Self {
        Self {
            last_term,
            last_index,
            data,
        }
    }
}

/// Returns `true` iff `candidate` is a prefix-extension of `previous`: every
/// entry present in `previous` is present, unchanged, at the same position
/// in `candidate` (§3 invariant 6, Leader Append-Only, §8 property 2).
pub fn is_prefix_extension<P: Payload + PartialEq>(previous: &[LogEntry<P>], candidate: &[LogEntry<P>]) -> bool {
    if candidate.len() < previous.len() {
        return false;
    }
    previous.iter().zip(candidate.iter()).all(|(a, b)| a == b)
}
