//! RPC message envelope exchanged between Raft instances over the fixture's
//! simulated network (§4.C, §6).
//!
//! The fixture does not interpret message contents; it only needs a
//! `kind()` tag to drive the `n_send[type]`/`n_recv[type]` counters (§3,
//! §8 property 7). The variant shapes below mirror the RPCs
//! `async_raft::raft` defines (`AppendEntriesRequest`, `VoteRequest`,
//! `InstallSnapshotRequest`, ...), trimmed to the fields the fixture's tests
//! and counters actually need; a real `RaftInstance` impl is free to carry
//! richer payloads by parameterizing `P`.

use crate::log::LogEntry;
use crate::log::Snapshot;
use crate::Index;
use crate::Payload;
use crate::ServerId;
use crate::Term;

/// The six RPC message kinds a Raft instance exchanges, used only as a tag
/// for the fixture's send/recv counters.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    AppendEntries,
    AppendEntriesResponse,
    Vote,
    VoteResponse,
    InstallSnapshot,
    InstallSnapshotResponse,
}

impl MessageKind {
    /// All kinds, for callers that want to report a zeroed counter table.
    pub const ALL: [MessageKind; 6] = [
        MessageKind::AppendEntries,
        MessageKind::AppendEntriesResponse,
        MessageKind::Vote,
        MessageKind::VoteResponse,
        MessageKind::InstallSnapshot,
        MessageKind::InstallSnapshotResponse,
    ];
}

/// An RPC sent by a cluster leader to replicate log entries, and as a
/// heartbeat when `entries` is empty.
#[derive(Clone, Debug)]
pub struct AppendEntries<P: Payload> {
    pub term: Term,
    pub leader_id: ServerId,
    pub prev_log_index: Index,
    pub prev_log_term: Term,
    pub entries: Vec<LogEntry<P>>,
    pub leader_commit: Index,
}

#[derive(Clone, Debug)]
pub struct AppendEntriesResponse {
    pub term: Term,
    pub success: bool,
}

/// An RPC sent by a candidate to gather votes.
#[derive(Clone, Debug)]
pub struct Vote {
    pub term: Term,
    pub candidate_id: ServerId,
    pub last_log_index: Index,
    pub last_log_term: Term,
}

#[derive(Clone, Debug)]
pub struct VoteResponse {
    pub term: Term,
    pub vote_granted: bool,
}

#[derive(Clone, Debug)]
pub struct InstallSnapshot<P: Payload> {
    pub term: Term,
    pub leader_id: ServerId,
    pub snapshot: Snapshot<P>,
}

#[derive(Clone, Debug)]
pub struct InstallSnapshotResponse {
    pub term: Term,
}

/// A message in flight between two servers' I/O backends.
#[derive(Clone, Debug)]
pub enum Message<P: Payload> {
    AppendEntries(AppendEntries<P>),
    AppendEntriesResponse(AppendEntriesResponse),
    Vote(Vote),
    VoteResponse(VoteResponse),
    InstallSnapshot(InstallSnapshot<P>),
    InstallSnapshotResponse(InstallSnapshotResponse),
}

impl<P: Payload> Message<P> {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::AppendEntries(_) => MessageKind::AppendEntries,
            Message::AppendEntriesResponse(_) => MessageKind::AppendEntriesResponse,
            Message::Vote(_) => MessageKind::Vote,
            Message::VoteResponse(_) => MessageKind::VoteResponse,
            Message::InstallSnapshot(_) => MessageKind::InstallSnapshot,
            Message::InstallSnapshotResponse(_) => MessageKind::InstallSnapshotResponse,
        }
    }

    pub fn term(&self) -> Term {
        match self {
            Message::AppendEntries(m) => m.term,
            Message::AppendEntriesResponse(m) => m.term,
            Message::Vote(m) => m.term,
            Message::VoteResponse(m) => m.term,
            Message::InstallSnapshot(m) => m.term,
            Message::InstallSnapshotResponse(m) => m.term,
        }
    }
}
