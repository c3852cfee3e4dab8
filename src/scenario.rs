//! Scenario drivers: thin, deterministic policies layered over
//! [`Fixture::step`] (§4.F) — `elect`, `depose`, `step_n`, and the
//! `step_until_*` family plus the predicates they're built from.

use crate::fixture::Fixture;
use crate::raft_api::RaftInstance;
use crate::raft_api::RaftState;
use crate::Index;
use crate::Millis;
use crate::Payload;
use crate::SafetyViolation;
use crate::ServerId;
use crate::Term;

/// A very large timeout, used by `elect` to effectively disable an
/// election timer without a dedicated "infinite" representation (§4.F:
/// "a value larger than any plausible simulation horizon").
const EFFECTIVELY_INFINITE_MS: Millis = u64::MAX / 2;

impl<P: Payload + PartialEq, R: RaftInstance<P>> Fixture<P, R> {
    /// Drive step-by-step advancement until `pred` holds or `max_ms` of
    /// virtual time elapses (§4.F `step_until`). Returns `Ok(true)` iff
    /// `pred` became true before the deadline.
    pub fn step_until(
        &mut self,
        max_ms: Millis,
        mut pred: impl FnMut(&Self) -> bool,
    ) -> Result<bool, SafetyViolation> {
        let t_start = self.time();
        loop {
            if pred(self) {
                return Ok(true);
            }
            if self.time().saturating_sub(t_start) > max_ms {
                return Ok(false);
            }
            match self.step()? {
                Some(_) => {}
                None => return Ok(pred(self)),
            }
        }
    }

    /// Invoke `step` `k` times, returning the last dispatched event (§4.F
    /// `step_n`).
    pub fn step_n(&mut self, k: usize) -> Result<Option<crate::Event>, SafetyViolation> {
        let mut last = None;
        for _ in 0..k {
            match self.step()? {
                Some(event) => last = Some(event),
                None => break,
            }
        }
        Ok(last)
    }

    pub fn step_until_elapsed(&mut self, ms: Millis) -> Result<bool, SafetyViolation> {
        self.step_until(ms, |_| false)
    }

    pub fn step_until_has_leader(&mut self, max_ms: Millis) -> Result<bool, SafetyViolation> {
        self.step_until(max_ms, |f| f.has_leader())
    }

    pub fn step_until_has_no_leader(&mut self, max_ms: Millis) -> Result<bool, SafetyViolation> {
        self.step_until(max_ms, |f| f.has_no_leader())
    }

    /// When `i == n()`, requires every server to have applied `index`
    /// (§4.F `applied(i, index)`).
    pub fn step_until_applied(&mut self, i: usize, index: Index, max_ms: Millis) -> Result<bool, SafetyViolation> {
        self.step_until(max_ms, |f| f.applied(i, index))
    }

    pub fn step_until_state_is(&mut self, i: usize, state: RaftState, max_ms: Millis) -> Result<bool, SafetyViolation> {
        self.step_until(max_ms, |f| f.state_is(i, state))
    }

    pub fn step_until_term_is(&mut self, i: usize, term: Term, max_ms: Millis) -> Result<bool, SafetyViolation> {
        self.step_until(max_ms, |f| f.term_is(i, term))
    }

    pub fn step_until_voted_for(&mut self, i: usize, j: ServerId, max_ms: Millis) -> Result<bool, SafetyViolation> {
        self.step_until(max_ms, |f| f.voted_for_is(i, j))
    }

    pub fn step_until_delivered(&mut self, i: usize, j: usize, max_ms: Millis) -> Result<bool, SafetyViolation> {
        self.step_until(max_ms, |f| f.delivered(i, j))
    }

    pub fn has_leader(&self) -> bool {
        self.leader_index().is_some()
    }

    pub fn has_no_leader(&self) -> bool {
        self.leader_index().is_none()
    }

    /// `i == n()` means "require every live server", matching §4.F.
    pub fn applied(&self, i: usize, index: Index) -> bool {
        if i == self.n() {
            (0..self.n()).all(|idx| self.server_applied(idx, index))
        } else {
            self.server_applied(i, index)
        }
    }

    fn server_applied(&self, i: usize, index: Index) -> bool {
        self.get(i).map(|r| r.last_applied() >= index).unwrap_or(false)
    }

    pub fn state_is(&self, i: usize, state: RaftState) -> bool {
        self.get(i).map(|r| r.state() == state).unwrap_or(false)
    }

    pub fn term_is(&self, i: usize, term: Term) -> bool {
        self.get(i).map(|r| r.current_term() == term).unwrap_or(false)
    }

    pub fn voted_for_is(&self, i: usize, j: ServerId) -> bool {
        self.voted_for(i) == Some(j)
    }

    /// True iff the transit queue `i -> j` is empty and there is no pending
    /// send from `i` to `j` (§4.F).
    pub fn delivered(&self, i: usize, j: usize) -> bool {
        let dest_id = crate::server::index_to_id(j);
        let from_id = crate::server::index_to_id(i);
        !self.send_queue_has_dest(i, dest_id) && !self.transit_has_sender(j, from_id)
    }

    /// Elect server `i` as leader (§4.F `elect`): preconditions — no
    /// leader, no candidate, `i` voting and connected to a majority of
    /// voting peers. Every other server's election timeout is raised to an
    /// effectively-infinite value so only `i` can time out; timeouts are
    /// restored once `i` is stable.
    pub fn elect(&mut self, i: usize, max_ms: Millis) -> Result<bool, crate::FixtureError> {
        if self.has_leader() {
            return Err(crate::FixtureError::PreconditionViolation(
                "elect: a leader already exists".into(),
            ));
        }
        if (0..self.n()).any(|idx| self.state_is(idx, RaftState::Candidate)) {
            return Err(crate::FixtureError::PreconditionViolation(
                "elect: a candidate already exists".into(),
            ));
        }
        self.check_votes(i)?;

        let saved: Vec<(usize, Millis)> = (0..self.n())
            .filter(|&idx| idx != i)
            .map(|idx| (idx, self.raw_tick_period(idx)))
            .collect();
        for &(idx, _) in &saved {
            let _ = self.set_randomized_election_timeout(idx, EFFECTIVELY_INFINITE_MS);
        }

        let reached = self
            .step_until(max_ms, |f| f.state_is(i, RaftState::Leader) && f.leader_index() == Some(i))
            .unwrap_or(false);

        for (idx, period) in saved {
            let _ = self.set_randomized_election_timeout(idx, period);
        }

        Ok(reached)
    }

    fn check_votes(&self, i: usize) -> Result<(), crate::FixtureError> {
        if i >= self.n() {
            return Err(crate::FixtureError::UnknownServer(i));
        }
        if !self.is_voting(i) {
            return Err(crate::FixtureError::PreconditionViolation(format!(
                "elect: server {} is not a voting member",
                i
            )));
        }
        let voting_peers: Vec<usize> = (0..self.n()).filter(|&idx| self.is_voting(idx)).collect();
        let reachable = voting_peers
            .iter()
            .filter(|&&idx| idx == i || self.connectivity_allows(i, idx))
            .count();
        if reachable * 2 <= voting_peers.len() {
            return Err(crate::FixtureError::PreconditionViolation(format!(
                "elect: server {} is not connected to a majority of voting peers",
                i
            )));
        }
        Ok(())
    }

    /// Depose the current leader (§4.F `depose`): saturate every edge the
    /// leader uses to reach its followers, so stable-leader detection (§4.E
    /// Phase 3) can no longer count a majority of acknowledgers, then step
    /// until the fixture no longer recognizes a stable leader.
    pub fn depose(&mut self, max_ms: Millis) -> Result<bool, crate::FixtureError> {
        let leader = match self.leader_index() {
            Some(idx) => idx,
            None => {
                return Err(crate::FixtureError::PreconditionViolation(
                    "depose: no current leader".into(),
                ))
            }
        };
        let saturated_edges: Vec<usize> = (0..self.n())
            .filter(|&idx| idx != leader && !self.saturated(leader, idx))
            .collect();
        for &idx in &saturated_edges {
            let _ = self.saturate(leader, idx);
        }

        let done = self
            .step_until(max_ms, |f| f.leader_index() != Some(leader))
            .map_err(|_violation| crate::FixtureError::PreconditionViolation("depose: safety violation".into()))?;

        Ok(done)
    }
}
