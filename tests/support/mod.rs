//! A deliberately-simplified `RaftInstance` used to drive the fixture's
//! integration tests (the consensus algorithm itself is out of scope for
//! this crate — see `raft_fixture::RaftInstance`). `ScriptedRaft`
//! implements just enough of election, heartbeats and log replication to
//! exercise the fixture's step engine, connectivity and I/O fault
//! injection deterministically. It is not a correct Raft implementation:
//! no snapshotting, no log-compaction, no joint-consensus membership
//! changes.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Once;

use maplit::btreeset;
use raft_fixture::AppendEntries;
use raft_fixture::AppendEntriesResponse;
use raft_fixture::CallbackToken;
use raft_fixture::Configuration;
use raft_fixture::IoBackend;
use raft_fixture::IoFault;
use raft_fixture::LogEntry;
use raft_fixture::Message;
use raft_fixture::RaftInstance;
use raft_fixture::RaftState;
use raft_fixture::ServerId;
use raft_fixture::Vote;
use raft_fixture::VoteResponse;
use tracing_subscriber::prelude::*;

pub const HEARTBEAT_MS: u64 = 50;

static INIT: Once = Once::new();

/// Install a `tracing` subscriber reading `RUST_LOG`, once per test binary
/// (mirrors `raft_fixture::testing::init_tracing`, duplicated here since
/// that one lives behind the `test-support` feature and this crate's own
/// integration tests don't enable it).
pub fn init_tracing() {
    INIT.call_once(|| {
        let fmt_layer = tracing_subscriber::fmt::Layer::default()
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::FULL)
            .with_ansi(false);
        let subscriber = tracing_subscriber::Registry::default()
            .with(tracing_subscriber::EnvFilter::from_default_env())
            .with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber).expect("error setting global tracing subscriber");
    });
}

struct PendingAppend<P> {
    token: CallbackToken,
    from: ServerId,
    new_log: Vec<LogEntry<P>>,
    new_commit: u64,
}

/// A minimal single-term-aware Raft mock: real elections, real heartbeats,
/// real log replication with majority commit, but no retries beyond what a
/// leader's next heartbeat naturally provides.
pub struct ScriptedRaft<P: raft_fixture::Payload> {
    id: ServerId,
    election_timeout_ms: u64,
    state: RaftState,
    current_term: u64,
    voted_for: Option<ServerId>,
    commit_index: u64,
    last_applied: u64,
    log: Vec<LogEntry<P>>,
    config: Configuration,
    votes_received: BTreeSet<ServerId>,
    match_index: BTreeMap<ServerId, u64>,
    next_index: BTreeMap<ServerId, u64>,
    pending_append: Option<PendingAppend<P>>,
}

impl<P: raft_fixture::Payload> ScriptedRaft<P> {
    pub fn new(id: ServerId, election_timeout_ms: u64) -> Self {
        Self {
            id,
            election_timeout_ms,
            state: RaftState::Unavailable,
            current_term: 0,
            voted_for: None,
            commit_index: 0,
            last_applied: 0,
            log: Vec::new(),
            config: Configuration::default(),
            votes_received: BTreeSet::new(),
            match_index: BTreeMap::new(),
            next_index: BTreeMap::new(),
            pending_append: None,
        }
    }

    /// Test-only client write path: append `payload` to the leader's own
    /// log immediately (no simulated disk latency for the leader's own
    /// write — only replication to followers goes through the fixture's
    /// I/O backend). Returns the new entry's index, or `None` if this
    /// instance isn't currently leader.
    pub fn propose(&mut self, payload: P, io: &mut IoBackend<'_, P>) -> Option<u64> {
        if self.state != RaftState::Leader {
            return None;
        }
        let index = self.log.len() as u64 + 1;
        let entry = LogEntry::normal(self.current_term, index, payload);
        io.append_entry(entry.clone());
        self.log.push(entry);
        self.match_index.insert(self.id, index);
        Some(index)
    }

    fn voting_peer_ids(&self) -> Vec<ServerId> {
        self.config.voting_ids()
    }

    fn has_majority(&self, acks: &BTreeSet<ServerId>) -> bool {
        let voting = self.voting_peer_ids();
        if voting.is_empty() {
            return false;
        }
        let count = voting.iter().filter(|p| acks.contains(p)).count();
        count * 2 > voting.len()
    }

    fn term_at(&self, index: u64) -> Option<u64> {
        if index == 0 {
            return Some(0);
        }
        self.log.iter().find(|e| e.index == index).map(|e| e.term)
    }

    fn last_log_term_index(&self) -> (u64, u64) {
        match self.log.last() {
            Some(e) => (e.term, e.index),
            None => (0, 0),
        }
    }

    fn step_down(&mut self, term: u64, io: &mut IoBackend<'_, P>) {
        self.current_term = term;
        self.state = RaftState::Follower;
        self.voted_for = None;
        io.persist_term(term);
        io.persist_vote(None);
    }

    fn start_election(&mut self, io: &mut IoBackend<'_, P>) {
        self.current_term += 1;
        self.state = RaftState::Candidate;
        self.voted_for = Some(self.id);
        self.votes_received = btreeset! { self.id };
        io.persist_term(self.current_term);
        io.persist_vote(self.voted_for);
        let (last_term, last_index) = self.last_log_term_index();
        for peer in self.voting_peer_ids() {
            if peer == self.id {
                continue;
            }
            let _ = io.submit_send(
                peer,
                Message::Vote(Vote {
                    term: self.current_term,
                    candidate_id: self.id,
                    last_log_index: last_index,
                    last_log_term: last_term,
                }),
            );
        }
        if self.has_majority(&self.votes_received) {
            self.become_leader(io);
        }
    }

    fn become_leader(&mut self, io: &mut IoBackend<'_, P>) {
        self.state = RaftState::Leader;
        self.match_index.clear();
        self.next_index.clear();
        let next = self.log.len() as u64 + 1;
        for peer in self.voting_peer_ids() {
            self.next_index.insert(peer, next);
            self.match_index.insert(peer, 0);
        }
        self.match_index.insert(self.id, self.log.len() as u64);
        io.tick(HEARTBEAT_MS);
        self.broadcast_append_entries(io);
    }

    fn broadcast_append_entries(&mut self, io: &mut IoBackend<'_, P>) {
        for peer in self.voting_peer_ids() {
            if peer == self.id {
                continue;
            }
            let next = *self.next_index.get(&peer).unwrap_or(&1);
            let prev_index = next.saturating_sub(1);
            let prev_term = self.term_at(prev_index).unwrap_or(0);
            let entries: Vec<LogEntry<P>> = self.log.iter().filter(|e| e.index >= next).cloned().collect();
            let _ = io.submit_send(
                peer,
                Message::AppendEntries(AppendEntries {
                    term: self.current_term,
                    leader_id: self.id,
                    prev_log_index: prev_index,
                    prev_log_term: prev_term,
                    entries,
                    leader_commit: self.commit_index,
                }),
            );
        }
    }

    fn recompute_commit_index(&mut self) {
        let mut indices: Vec<u64> = self
            .voting_peer_ids()
            .iter()
            .map(|p| {
                if *p == self.id {
                    self.log.len() as u64
                } else {
                    *self.match_index.get(p).unwrap_or(&0)
                }
            })
            .collect();
        indices.sort_unstable();
        if let Some(&majority_index) = indices.get(indices.len() / 2) {
            if majority_index > self.commit_index {
                self.commit_index = majority_index;
                self.last_applied = self.commit_index;
            }
        }
    }

    fn handle_vote_request(&mut self, from: ServerId, req: Vote, io: &mut IoBackend<'_, P>) {
        if req.term > self.current_term {
            self.step_down(req.term, io);
        }
        let (my_last_term, my_last_index) = self.last_log_term_index();
        let log_ok = req.last_log_term > my_last_term || (req.last_log_term == my_last_term && req.last_log_index >= my_last_index);
        let grant = req.term >= self.current_term && log_ok && (self.voted_for.is_none() || self.voted_for == Some(req.candidate_id));
        if grant {
            self.voted_for = Some(req.candidate_id);
            io.persist_vote(self.voted_for);
        }
        let _ = io.submit_send(
            from,
            Message::VoteResponse(VoteResponse {
                term: self.current_term,
                vote_granted: grant,
            }),
        );
    }

    fn handle_vote_response(&mut self, from: ServerId, resp: VoteResponse, io: &mut IoBackend<'_, P>) {
        if resp.term > self.current_term {
            self.step_down(resp.term, io);
            return;
        }
        if self.state != RaftState::Candidate || resp.term != self.current_term {
            return;
        }
        if resp.vote_granted {
            self.votes_received.insert(from);
            if self.has_majority(&self.votes_received) {
                self.become_leader(io);
            }
        }
    }

    fn handle_append_entries(&mut self, from: ServerId, req: AppendEntries<P>, io: &mut IoBackend<'_, P>) {
        if req.term < self.current_term {
            let _ = io.submit_send(
                from,
                Message::AppendEntriesResponse(AppendEntriesResponse {
                    term: self.current_term,
                    success: false,
                }),
            );
            return;
        }
        if req.term > self.current_term || self.state != RaftState::Follower {
            self.current_term = req.term;
            self.state = RaftState::Follower;
            self.voted_for = None;
            io.persist_term(self.current_term);
            io.persist_vote(None);
        }
        io.tick(self.election_timeout_ms);

        let consistent = req.prev_log_index == 0 || self.term_at(req.prev_log_index) == Some(req.prev_log_term);
        if !consistent {
            let _ = io.submit_send(
                from,
                Message::AppendEntriesResponse(AppendEntriesResponse {
                    term: self.current_term,
                    success: false,
                }),
            );
            return;
        }

        let mut new_log: Vec<LogEntry<P>> = self.log.iter().take_while(|e| e.index <= req.prev_log_index).cloned().collect();
        new_log.extend(req.entries.iter().cloned());
        let new_commit = req.leader_commit.min(new_log.last().map(|e| e.index).unwrap_or(0));
        let token = io.submit_append(new_log.clone());
        self.pending_append = Some(PendingAppend {
            token,
            from,
            new_log,
            new_commit,
        });
    }

    fn handle_append_response(&mut self, from: ServerId, resp: AppendEntriesResponse, io: &mut IoBackend<'_, P>) {
        if resp.term > self.current_term {
            self.step_down(resp.term, io);
            return;
        }
        if self.state != RaftState::Leader || resp.term != self.current_term {
            return;
        }
        if resp.success {
            let sent_index = self.log.len() as u64;
            self.match_index.insert(from, sent_index);
            self.next_index.insert(from, sent_index + 1);
            self.recompute_commit_index();
        } else {
            let next = self.next_index.entry(from).or_insert(1);
            if *next > 1 {
                *next -= 1;
            }
        }
    }
}

impl<P: raft_fixture::Payload> RaftInstance<P> for ScriptedRaft<P> {
    fn id(&self) -> ServerId {
        self.id
    }

    fn state(&self) -> RaftState {
        self.state
    }

    fn current_term(&self) -> u64 {
        self.current_term
    }

    fn voted_for(&self) -> Option<ServerId> {
        self.voted_for
    }

    fn commit_index(&self) -> u64 {
        self.commit_index
    }

    fn last_applied(&self) -> u64 {
        self.last_applied
    }

    fn log_view(&self) -> &[LogEntry<P>] {
        &self.log
    }

    fn bootstrap(&mut self, io: &mut IoBackend<'_, P>, config: &Configuration) {
        self.config = config.clone();
        self.log = io.log().to_vec();
    }

    fn start(&mut self, _io: &mut IoBackend<'_, P>) {
        self.state = RaftState::Follower;
    }

    fn stop(&mut self, _io: &mut IoBackend<'_, P>) {
        self.state = RaftState::Unavailable;
    }

    fn on_tick(&mut self, io: &mut IoBackend<'_, P>) {
        match self.state {
            RaftState::Follower | RaftState::Candidate => self.start_election(io),
            RaftState::Leader => {
                io.tick(HEARTBEAT_MS);
                self.broadcast_append_entries(io);
            }
            RaftState::Unavailable => {}
        }
    }

    fn on_recv(&mut self, from: ServerId, message: Message<P>, io: &mut IoBackend<'_, P>) {
        match message {
            Message::Vote(req) => self.handle_vote_request(from, req, io),
            Message::VoteResponse(resp) => self.handle_vote_response(from, resp, io),
            Message::AppendEntries(req) => self.handle_append_entries(from, req, io),
            Message::AppendEntriesResponse(resp) => self.handle_append_response(from, resp, io),
            Message::InstallSnapshot(_) | Message::InstallSnapshotResponse(_) => {}
        }
    }

    fn on_append_complete(&mut self, token: CallbackToken, result: Result<(), IoFault>, io: &mut IoBackend<'_, P>) {
        let pending = match self.pending_append.take() {
            Some(p) if p.token == token => p,
            other => {
                self.pending_append = other;
                return;
            }
        };
        match result {
            Ok(()) => {
                self.log = pending.new_log;
                self.commit_index = pending.new_commit;
                self.last_applied = self.commit_index;
                let _ = io.submit_send(
                    pending.from,
                    Message::AppendEntriesResponse(AppendEntriesResponse {
                        term: self.current_term,
                        success: true,
                    }),
                );
            }
            Err(_) => {
                let _ = io.submit_send(
                    pending.from,
                    Message::AppendEntriesResponse(AppendEntriesResponse {
                        term: self.current_term,
                        success: false,
                    }),
                );
            }
        }
    }

    fn on_send_complete(&mut self, _token: CallbackToken, _io: &mut IoBackend<'_, P>) {}
}

/// Build an `n`-server voting cluster of `ScriptedRaft<P>` instances, with
/// the default staggered election timeouts (`1000 + i*100` ms).
pub fn scripted_cluster<P: raft_fixture::Payload>(n: usize) -> Vec<ScriptedRaft<P>> {
    (0..n).map(|i| ScriptedRaft::new(i as u64 + 1, 1000 + i as u64 * 100)).collect()
}
