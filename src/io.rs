//! The per-server in-memory I/O backend (§4.C) — the heaviest component of
//! the fixture. `IoState` is the owned, persisted state a `Server` holds;
//! `IoBackend` is the short-lived, borrowed facade handed to a
//! [`RaftInstance`](crate::RaftInstance) for the duration of a single
//! callback, matching the "non-owning handle" design note in §9.

use std::collections::HashMap;

use crate::connectivity::Connectivity;
use crate::error::FixtureError;
use crate::log::LogEntry;
use crate::log::Snapshot;
use crate::message::Message;
use crate::message::MessageKind;
use crate::server::id_to_index;
use crate::time::VirtualTime;
use crate::Index;
use crate::Millis;
use crate::Payload;
use crate::ServerId;
use crate::Term;

/// Identifies one in-flight append or send request, handed back through
/// `RaftInstance::on_append_complete` / `on_send_complete`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallbackToken(u64);

#[derive(Debug)]
pub(crate) struct PendingAppend<P: Payload> {
    pub token: CallbackToken,
    pub entries: Vec<LogEntry<P>>,
    pub completion_time: VirtualTime,
    pub faulting: bool,
}

#[derive(Debug)]
pub(crate) struct PendingSend<P: Payload> {
    pub token: CallbackToken,
    pub dest: ServerId,
    pub message: Message<P>,
    pub completion_time: VirtualTime,
}

#[derive(Debug)]
pub(crate) struct TransitMessage<P: Payload> {
    pub from: ServerId,
    pub message: Message<P>,
    pub delivery_time: VirtualTime,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TickTimer {
    pub period: Millis,
    pub next_expiry: VirtualTime,
}

/// `{delay, repeat}` fault schedule (§3). `delay == -1` disables the
/// schedule entirely.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FaultSchedule {
    delay: i64,
    repeat: i64,
}

impl FaultSchedule {
    fn disabled() -> Self {
        Self { delay: -1, repeat: 0 }
    }

    fn set(&mut self, delay: i64, repeat: i64) {
        self.delay = delay;
        self.repeat = repeat;
    }

    /// Advance the schedule by one submission, returning whether *this*
    /// submission should fail.
    fn hit(&mut self) -> bool {
        if self.delay < 0 {
            return false;
        }
        if self.delay > 0 {
            self.delay -= 1;
            return false;
        }
        if self.repeat > 0 {
            self.repeat -= 1;
            if self.repeat == 0 {
                self.delay = -1;
            }
            return true;
        }
        self.delay = -1;
        false
    }
}

/// The owned, persisted I/O state of one server. Lives inside
/// [`crate::server::Server`]; never exposed directly outside the crate.
#[derive(Debug)]
pub(crate) struct IoState<P: Payload> {
    pub id: ServerId,
    term: Term,
    voted_for: Option<ServerId>,
    log: Vec<LogEntry<P>>,
    snapshot: Option<Snapshot<P>>,

    pub(crate) append_queue: Vec<PendingAppend<P>>,
    pub(crate) send_queue: Vec<PendingSend<P>>,
    pub(crate) transit_queue: Vec<TransitMessage<P>>,
    pub(crate) tick_timer: TickTimer,

    pub(crate) disk_latency: Millis,
    pub(crate) network_latency: Millis,

    fault_schedule: FaultSchedule,
    n_send: HashMap<MessageKind, u32>,
    n_recv: HashMap<MessageKind, u32>,
    next_token: u64,
}

impl<P: Payload> IoState<P> {
    pub fn new(id: ServerId, default_election_timeout: Millis, disk_latency: Millis, network_latency: Millis) -> Self {
        Self {
            id,
            term: 0,
            voted_for: None,
            log: Vec::new(),
            snapshot: None,
            append_queue: Vec::new(),
            send_queue: Vec::new(),
            transit_queue: Vec::new(),
            tick_timer: TickTimer {
                period: default_election_timeout,
                next_expiry: VirtualTime::ZERO,
            },
            disk_latency,
            network_latency,
            fault_schedule: FaultSchedule::disabled(),
            n_send: MessageKind::ALL.iter().map(|k| (*k, 0)).collect(),
            n_recv: MessageKind::ALL.iter().map(|k| (*k, 0)).collect(),
            next_token: 0,
        }
    }

    fn next_token(&mut self) -> CallbackToken {
        let t = CallbackToken(self.next_token);
        self.next_token += 1;
        t
    }

    pub fn set_election_timeout(&mut self, ms: Millis, now: VirtualTime) {
        self.tick_timer.period = ms;
        self.tick_timer.next_expiry = now.checked_add(ms);
    }

    pub fn set_fault_schedule(&mut self, delay: i64, repeat: i64) {
        self.fault_schedule.set(delay, repeat);
    }

    pub fn set_disk_latency(&mut self, ms: Millis) {
        self.disk_latency = ms;
    }

    pub fn set_network_latency(&mut self, ms: Millis) {
        self.network_latency = ms;
    }

    pub fn term(&self) -> Term {
        self.term
    }

    pub fn voted_for(&self) -> Option<ServerId> {
        self.voted_for
    }

    pub fn log(&self) -> &[LogEntry<P>] {
        &self.log
    }

    pub fn snapshot(&self) -> Option<&Snapshot<P>> {
        self.snapshot.as_ref()
    }

    pub fn set_term(&mut self, term: Term) {
        self.term = term;
    }

    pub fn set_voted_for(&mut self, voted_for: Option<ServerId>) {
        self.voted_for = voted_for;
    }

    pub fn set_entries(&mut self, entries: Vec<LogEntry<P>>) {
        self.log = entries;
    }

    pub fn add_entry(&mut self, entry: LogEntry<P>) {
        self.log.push(entry);
    }

    pub fn set_snapshot(&mut self, snapshot: Snapshot<P>) {
        self.snapshot = Some(snapshot);
    }

    pub fn n_send(&self, kind: MessageKind) -> u32 {
        self.n_send[&kind]
    }

    pub fn n_recv(&self, kind: MessageKind) -> u32 {
        self.n_recv[&kind]
    }

    /// Counted when a send-completion callback fires (§3, §8 property 7) —
    /// never at admission time.
    pub(crate) fn record_send(&mut self, kind: MessageKind) {
        *self.n_send.get_mut(&kind).expect("MessageKind::ALL is exhaustive") += 1;
    }

    /// Counted only for messages actually delivered to `on_recv`, never for
    /// silent drops (§8 property 7).
    pub(crate) fn record_recv(&mut self, kind: MessageKind) {
        *self.n_recv.get_mut(&kind).expect("MessageKind::ALL is exhaustive") += 1;
    }

    /// Minimum append-completion time across the queue, or `None` if empty.
    pub fn next_disk_time(&self) -> Option<VirtualTime> {
        self.append_queue.iter().map(|p| p.completion_time).min()
    }

    /// Minimum send-completion time across the queue, or `None` if empty.
    pub fn next_send_time(&self) -> Option<VirtualTime> {
        self.send_queue.iter().map(|p| p.completion_time).min()
    }

    /// Minimum deliverable-message delivery time across transit, ignoring
    /// entries whose edge is no longer deliverable (they're reaped lazily
    /// by the step engine rather than participating in selection).
    pub fn next_deliverable_time(&self, connectivity: &Connectivity, self_index: usize) -> Option<VirtualTime> {
        self.transit_queue
            .iter()
            .filter(|m| connectivity.allows_delivery(id_to_index(m.from), self_index))
            .map(|m| m.delivery_time)
            .min()
    }
}

/// The borrowed capability view of a server's I/O backend, handed to a
/// [`RaftInstance`](crate::RaftInstance) for the duration of one callback.
pub struct IoBackend<'a, P: Payload> {
    pub(crate) state: &'a mut IoState<P>,
    pub(crate) connectivity: &'a Connectivity,
    pub(crate) self_index: usize,
    pub(crate) now: VirtualTime,
}

impl<'a, P: Payload> IoBackend<'a, P> {
    /// The current virtual time, as observed at the start of this callback.
    pub fn now(&self) -> VirtualTime {
        self.now
    }

    /// Enqueue a persistence request. Completes at `now + disk_latency`,
    /// unless the fault schedule is currently hitting, in which case it
    /// still completes at `now` (not later) but reports failure (§4.C).
    pub fn submit_append(&mut self, entries: Vec<LogEntry<P>>) -> CallbackToken {
        let token = self.state.next_token();
        let faulting = self.state.fault_schedule.hit();
        let completion_time = if faulting {
            self.now
        } else {
            self.now.checked_add(self.state.disk_latency)
        };
        self.state.append_queue.push(PendingAppend {
            token,
            entries,
            completion_time,
            faulting,
        });
        token
    }

    /// Enqueue an outbound message. Fails synchronously if this server is
    /// disconnected from `dest`; otherwise enqueues in the send queue,
    /// regardless of whether the edge is connected or merely saturated
    /// (§4.B: saturation allows the local send to "succeed").
    pub fn submit_send(&mut self, dest: ServerId, message: Message<P>) -> Result<CallbackToken, FixtureError> {
        let dest_index = id_to_index(dest);
        if !self.connectivity.allows_send(self.self_index, dest_index) {
            return Err(FixtureError::NoConnection {
                from: self.state.id,
                to: dest,
            });
        }
        let token = self.state.next_token();
        let completion_time = self.now.checked_add(self.state.network_latency / 2);
        self.state.send_queue.push(PendingSend {
            token,
            dest,
            message,
            completion_time,
        });
        Ok(token)
    }

    /// Arm the tick timer with the given period, re-triggering from `now`.
    pub fn tick(&mut self, period_ms: Millis) {
        self.state.tick_timer = TickTimer {
            period: period_ms,
            next_expiry: self.now.checked_add(period_ms),
        };
    }

    pub fn term(&self) -> Term {
        self.state.term()
    }

    pub fn voted_for(&self) -> Option<ServerId> {
        self.state.voted_for()
    }

    pub fn log(&self) -> &[LogEntry<P>] {
        self.state.log()
    }

    pub fn snapshot(&self) -> Option<&Snapshot<P>> {
        self.state.snapshot()
    }

    pub fn persist_term(&mut self, term: Term) {
        self.state.set_term(term);
    }

    pub fn persist_vote(&mut self, voted_for: Option<ServerId>) {
        self.state.set_voted_for(voted_for);
    }

    pub fn persist_entries(&mut self, entries: Vec<LogEntry<P>>) {
        self.state.set_entries(entries);
    }

    pub fn append_entry(&mut self, entry: LogEntry<P>) {
        self.state.add_entry(entry);
    }

    pub fn persist_snapshot(&mut self, snapshot: Snapshot<P>) {
        self.state.set_snapshot(snapshot);
    }

    pub fn n_send(&self, kind: MessageKind) -> u32 {
        self.state.n_send(kind)
    }

    pub fn n_recv(&self, kind: MessageKind) -> u32 {
        self.state.n_recv(kind)
    }

    /// The last-log (term, index), or `(0, 0)` for a pristine log — handy
    /// when a `RaftInstance` impl needs it to build a `Vote`/`AppendEntries`
    /// request without threading its own log cache.
    pub fn last_log_term_index(&self) -> (Term, Index) {
        match self.state.log().last() {
            Some(e) => (e.term, e.index),
            None => (0, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_schedule_disabled_never_faults() {
        let mut f = FaultSchedule::disabled();
        for _ in 0..5 {
            assert!(!f.hit());
        }
    }

    #[test]
    fn fault_schedule_delays_then_fails_repeat_times_then_disables() {
        let mut f = FaultSchedule::disabled();
        f.set(2, 2);
        assert!(!f.hit()); // delay 2 -> 1
        assert!(!f.hit()); // delay 1 -> 0
        assert!(f.hit()); // repeat 2 -> 1, fault
        assert!(f.hit()); // repeat 1 -> 0, fault, now disabled
        assert!(!f.hit()); // disabled
        assert!(!f.hit());
    }

    #[test]
    fn fault_schedule_zero_delay_faults_immediately() {
        let mut f = FaultSchedule::disabled();
        f.set(0, 1);
        assert!(f.hit());
        assert!(!f.hit());
    }
}
