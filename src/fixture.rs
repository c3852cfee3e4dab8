//! The fixture itself: the owned aggregate of servers, connectivity and
//! virtual clock, and the step engine that drives them (§3, §4.E — "the
//! heart of the system").
//!
//! Mirrors the shape of `async_raft`'s `RaftRouter` test fixture (see
//! `tests/fixtures/mod.rs` in the upstream crate) but, per §9 "Global
//! mutable state", as a single owned struct passed by exclusive borrow to
//! every scenario helper rather than a `Arc<Mutex<_>>` shared singleton —
//! there is no real concurrency here to guard against.

use tracing::instrument;
use tracing::trace;

use crate::config::FixtureConfig;
use crate::connectivity::Connectivity;
use crate::error::FixtureError;
use crate::error::IoFault;
use crate::event::Event;
use crate::event::EventKind;
use crate::io::IoBackend;
use crate::io::TransitMessage;
use crate::log::LogEntry;
use crate::log::Snapshot;
use crate::message::MessageKind;
use crate::raft_api::Configuration;
use crate::raft_api::RaftInstance;
use crate::safety::check_leader_append_only;
use crate::safety::detect_stable_leader;
use crate::safety::StableLeaderSnapshot;
use crate::server::id_to_index;
use crate::server::index_to_id;
use crate::server::Server;
use crate::time::VirtualTime;
use crate::Index;
use crate::Millis;
use crate::Payload;
use crate::SafetyViolation;
use crate::ServerId;

/// The fixture: owns every server, the connectivity matrix, and the virtual
/// clock. See module docs.
pub struct Fixture<P: Payload + PartialEq, R: RaftInstance<P>> {
    config: FixtureConfig,
    now: VirtualTime,
    servers: Vec<Server<P, R>>,
    connectivity: Connectivity,
    voting: Vec<bool>,
    leader_id: ServerId,
    stable_leader_snapshot: Option<StableLeaderSnapshot<P>>,
    last_commit_index: Index,
    last_event: Option<Event>,
    hook: Option<Box<dyn FnMut(Event)>>,
}

impl<P: Payload + PartialEq, R: RaftInstance<P>> Fixture<P, R> {
    /// Allocate a fixture over `raft_instances` (§3 Lifecycle: "init
    /// allocates N servers and a full-mesh connectivity matrix"), using
    /// default timings (§4.C).
    pub fn new(raft_instances: Vec<R>) -> Self {
        Self::with_config(FixtureConfig::default(), raft_instances)
    }

    pub fn with_config(config: FixtureConfig, raft_instances: Vec<R>) -> Self {
        let n = raft_instances.len();
        let connectivity = Connectivity::new(n);
        let servers = raft_instances
            .into_iter()
            .enumerate()
            .map(|(index, raft)| {
                Server::new(
                    index,
                    format!("server-{}", index_to_id(index)),
                    config.election_timeout_for(index),
                    config.disk_latency_ms,
                    config.network_latency_ms,
                    raft,
                )
            })
            .collect();
        Self {
            config,
            now: VirtualTime::ZERO,
            servers,
            connectivity,
            voting: vec![false; n],
            leader_id: 0,
            stable_leader_snapshot: None,
            last_commit_index: 0,
            last_event: None,
            hook: None,
        }
    }

    pub fn n(&self) -> usize {
        self.servers.len()
    }

    pub fn time(&self) -> Millis {
        self.now.as_millis()
    }

    pub fn get(&self, i: usize) -> Option<&R> {
        self.servers.get(i).map(|s| &s.raft)
    }

    pub fn alive(&self, i: usize) -> bool {
        self.servers.get(i).map(|s| s.alive).unwrap_or(false)
    }

    /// `0` if no stable leader is currently recorded (§3 "current leader id
    /// (0 = none)"), otherwise the stable leader's server index.
    pub fn leader_index(&self) -> Option<usize> {
        if self.leader_id == 0 {
            None
        } else {
            Some(id_to_index(self.leader_id))
        }
    }

    pub fn voted_for(&self, i: usize) -> Option<ServerId> {
        self.servers.get(i).and_then(|s| s.io.voted_for())
    }

    pub fn last_event(&self) -> Option<Event> {
        self.last_event
    }

    /// The commit index last observed on the stable leader (§3 "last
    /// observed commit index"), or `0` if none has ever been stable.
    pub fn last_commit_index(&self) -> Index {
        self.last_commit_index
    }

    /// Assemble a `{id, address, voting}` configuration with the first
    /// `n_voting` servers marked voting (§6 `configuration(n_voting, out)`).
    pub fn configuration(&self, n_voting: usize) -> Configuration {
        let servers = self
            .servers
            .iter()
            .enumerate()
            .map(|(index, s)| crate::ServerConfig {
                id: s.id(),
                address: s.address.clone(),
                voting: index < n_voting,
            })
            .collect();
        Configuration { servers }
    }

    /// Seed identical initial log + configuration on every server (§3
    /// Lifecycle).
    pub fn bootstrap(&mut self, config: &Configuration) {
        self.voting = vec![false; self.servers.len()];
        for sc in &config.servers {
            if sc.id > 0 {
                let idx = id_to_index(sc.id);
                if idx < self.voting.len() {
                    self.voting[idx] = sc.voting;
                }
            }
        }
        let now = self.now;
        for index in 0..self.servers.len() {
            let connectivity = &self.connectivity;
            let server = &mut self.servers[index];
            let mut io = IoBackend {
                state: &mut server.io,
                connectivity,
                self_index: index,
                now,
            };
            server.raft.bootstrap(&mut io, config);
        }
    }

    /// Arm every alive server's tick timer and start its Raft instance (§3
    /// Lifecycle: "start arms tick timers").
    pub fn start(&mut self) {
        let now = self.now;
        for index in 0..self.servers.len() {
            if !self.servers[index].alive {
                continue;
            }
            let period = self.servers[index].io.tick_timer.period;
            self.servers[index].io.tick_timer.next_expiry = now.checked_add(period);
            let connectivity = &self.connectivity;
            let server = &mut self.servers[index];
            let mut io = IoBackend {
                state: &mut server.io,
                connectivity,
                self_index: index,
                now,
            };
            server.raft.start(&mut io);
        }
    }

    /// Release every server's queues (§3 Lifecycle: "close releases all
    /// queues and server resources in reverse order").
    pub fn close(&mut self) {
        for index in (0..self.servers.len()).rev() {
            let server = &mut self.servers[index];
            server.io.append_queue.clear();
            server.io.send_queue.clear();
            server.io.transit_queue.clear();
            server.alive = false;
        }
    }

    pub fn set_hook(&mut self, hook: impl FnMut(Event) + 'static) {
        self.hook = Some(Box::new(hook));
    }

    pub fn clear_hook(&mut self) {
        self.hook = None;
    }

    fn check_index(&self, i: usize) -> Result<(), FixtureError> {
        if i < self.servers.len() {
            Ok(())
        } else {
            Err(FixtureError::UnknownServer(i))
        }
    }

    pub fn disconnect(&mut self, i: usize, j: usize) -> Result<(), FixtureError> {
        self.check_index(i)?;
        self.check_index(j)?;
        self.connectivity.disconnect(i, j);
        Ok(())
    }

    pub fn reconnect(&mut self, i: usize, j: usize) -> Result<(), FixtureError> {
        self.check_index(i)?;
        self.check_index(j)?;
        self.connectivity.reconnect(i, j);
        Ok(())
    }

    pub fn saturate(&mut self, i: usize, j: usize) -> Result<(), FixtureError> {
        self.check_index(i)?;
        self.check_index(j)?;
        self.connectivity.saturate(i, j);
        Ok(())
    }

    pub fn desaturate(&mut self, i: usize, j: usize) -> Result<(), FixtureError> {
        self.check_index(i)?;
        self.check_index(j)?;
        self.connectivity.desaturate(i, j);
        Ok(())
    }

    pub fn saturated(&self, i: usize, j: usize) -> bool {
        self.connectivity.saturated(i, j)
    }

    /// Clear `alive` and freeze the tick timer; already-submitted appends
    /// still complete (§4.H, §9 Open Question 2), but their deliveries drop
    /// and new submissions are rejected going forward.
    pub fn kill(&mut self, i: usize) -> Result<(), FixtureError> {
        self.check_index(i)?;
        self.servers[i].alive = false;
        Ok(())
    }

    /// Append a server with a fresh id, install a connected row/column, and
    /// leave it unbootstrapped and unstarted (§4.H).
    pub fn grow(&mut self, raft: R) -> Result<usize, FixtureError> {
        if self.servers.len() >= self.config.max_servers {
            return Err(FixtureError::CapacityExceeded {
                max: self.config.max_servers,
            });
        }
        let index = self.servers.len();
        let server = Server::new(
            index,
            format!("server-{}", index_to_id(index)),
            self.config.election_timeout_for(index),
            self.config.disk_latency_ms,
            self.config.network_latency_ms,
            raft,
        );
        self.servers.push(server);
        self.voting.push(false);
        self.connectivity.grow_to(self.servers.len());
        Ok(index)
    }

    pub fn set_randomized_election_timeout(&mut self, i: usize, ms: Millis) -> Result<(), FixtureError> {
        self.check_index(i)?;
        let now = self.now;
        self.servers[i].io.set_election_timeout(ms, now);
        Ok(())
    }

    pub fn set_network_latency(&mut self, i: usize, ms: Millis) -> Result<(), FixtureError> {
        self.check_index(i)?;
        self.servers[i].io.set_network_latency(ms);
        Ok(())
    }

    pub fn set_disk_latency(&mut self, i: usize, ms: Millis) -> Result<(), FixtureError> {
        self.check_index(i)?;
        self.servers[i].io.set_disk_latency(ms);
        Ok(())
    }

    pub fn set_term(&mut self, i: usize, term: crate::Term) -> Result<(), FixtureError> {
        self.check_index(i)?;
        self.servers[i].io.set_term(term);
        Ok(())
    }

    pub fn set_snapshot(&mut self, i: usize, snapshot: Snapshot<P>) -> Result<(), FixtureError> {
        self.check_index(i)?;
        self.servers[i].io.set_snapshot(snapshot);
        Ok(())
    }

    pub fn set_entries(&mut self, i: usize, entries: Vec<LogEntry<P>>) -> Result<(), FixtureError> {
        self.check_index(i)?;
        self.servers[i].io.set_entries(entries);
        Ok(())
    }

    pub fn add_entry(&mut self, i: usize, entry: LogEntry<P>) -> Result<(), FixtureError> {
        self.check_index(i)?;
        self.servers[i].io.add_entry(entry);
        Ok(())
    }

    pub fn io_fault(&mut self, i: usize, delay: i64, repeat: i64) -> Result<(), FixtureError> {
        self.check_index(i)?;
        self.servers[i].io.set_fault_schedule(delay, repeat);
        Ok(())
    }

    pub fn n_send(&self, i: usize, kind: MessageKind) -> Result<u32, FixtureError> {
        self.check_index(i)?;
        Ok(self.servers[i].io.n_send(kind))
    }

    pub fn n_recv(&self, i: usize, kind: MessageKind) -> Result<u32, FixtureError> {
        self.check_index(i)?;
        Ok(self.servers[i].io.n_recv(kind))
    }

    pub(crate) fn raw_tick_period(&self, i: usize) -> Millis {
        self.servers[i].io.tick_timer.period
    }

    pub(crate) fn send_queue_has_dest(&self, i: usize, dest_id: ServerId) -> bool {
        self.servers[i].io.send_queue.iter().any(|p| p.dest == dest_id)
    }

    pub(crate) fn transit_has_sender(&self, j: usize, from_id: ServerId) -> bool {
        self.servers[j].io.transit_queue.iter().any(|m| m.from == from_id)
    }

    pub(crate) fn is_voting(&self, i: usize) -> bool {
        self.voting.get(i).copied().unwrap_or(false)
    }

    pub(crate) fn connectivity_allows(&self, i: usize, j: usize) -> bool {
        self.connectivity.allows_send(i, j) && self.connectivity.allows_send(j, i)
    }

    /// Advance time to the next scheduled event across the whole cluster
    /// and dispatch exactly one callback (§4.E). Returns `Ok(None)` if
    /// nothing is left to schedule (no alive server and no pending I/O),
    /// `Ok(Some(event))` on a normal dispatch, or `Err` on a fatal safety
    /// violation — the fixture must not be stepped again after an `Err`.
    #[instrument(level = "trace", skip(self))]
    pub fn step(&mut self) -> Result<Option<Event>, SafetyViolation> {
        let event = match self.dispatch_one() {
            Some(event) => event,
            None => return Ok(None),
        };
        trace!(?event, "dispatched");
        self.run_safety_checks()?;
        self.last_event = Some(event);
        if let Some(hook) = &mut self.hook {
            hook(event);
        }
        Ok(Some(event))
    }

    fn dispatch_one(&mut self) -> Option<Event> {
        let send_min = self.servers.iter().filter_map(|s| s.io.next_send_time()).min();
        let phase2 = self.phase2_candidate();

        let use_phase1 = match (send_min, phase2) {
            (Some(sm), Some((t2, _, _))) => sm <= t2,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if use_phase1 {
            self.dispatch_send_completion(send_min.expect("use_phase1 implies Some"))
        } else {
            let (t, index, kind) = phase2?;
            self.now = t;
            match kind {
                EventKind::Tick => self.dispatch_tick(index),
                EventKind::Disk => self.dispatch_disk(index),
                EventKind::Network => self.dispatch_network(index),
            }
            Some(Event {
                server_index: index,
                kind,
                time: t,
            })
        }
    }

    /// Phase 2 candidate selection: lowest `(time, server_index,
    /// kind-priority)` across disk completion, network delivery and tick
    /// expiry, tick-priority lowest so it wins ties (§4.E Phase 2).
    fn phase2_candidate(&self) -> Option<(VirtualTime, usize, EventKind)> {
        let mut best: Option<(VirtualTime, usize, u8)> = None;
        for (index, server) in self.servers.iter().enumerate() {
            let disk_t = server.io.next_disk_time();
            let net_t = server.io.next_deliverable_time(&self.connectivity, index);
            let tick_t = if server.alive {
                Some(server.io.tick_timer.next_expiry)
            } else {
                None
            };
            for (t, priority) in [(tick_t, 0u8), (disk_t, 1u8), (net_t, 2u8)] {
                if let Some(t) = t {
                    let candidate = (t, index, priority);
                    if best.map(|b| candidate < b).unwrap_or(true) {
                        best = Some(candidate);
                    }
                }
            }
        }
        best.map(|(t, index, priority)| {
            let kind = match priority {
                0 => EventKind::Tick,
                1 => EventKind::Disk,
                _ => EventKind::Network,
            };
            (t, index, kind)
        })
    }

    /// Phase 1: flush the globally oldest send completion (§4.E Phase 1).
    fn dispatch_send_completion(&mut self, t: VirtualTime) -> Option<Event> {
        let from_index = self
            .servers
            .iter()
            .enumerate()
            .filter(|(_, s)| s.io.next_send_time() == Some(t))
            .map(|(i, _)| i)
            .min()?;
        self.now = t;
        let pos = self.servers[from_index]
            .io
            .send_queue
            .iter()
            .position(|p| p.completion_time == t)?;
        let pending = self.servers[from_index].io.send_queue.remove(pos);
        let kind = pending.message.kind();
        self.servers[from_index].io.record_send(kind);

        let now = self.now;
        {
            let connectivity = &self.connectivity;
            let server = &mut self.servers[from_index];
            let mut io = IoBackend {
                state: &mut server.io,
                connectivity,
                self_index: from_index,
                now,
            };
            server.raft.on_send_complete(pending.token, &mut io);
        }

        let to_index = id_to_index(pending.dest);
        let dest_alive = self.servers.get(to_index).map(|s| s.alive).unwrap_or(false);
        if self.connectivity.allows_send(from_index, to_index) && dest_alive {
            let network_latency = self.servers[from_index].io.network_latency;
            let delivery_time = t.checked_add(network_latency / 2);
            self.servers[to_index].io.transit_queue.push(TransitMessage {
                from: index_to_id(from_index),
                message: pending.message,
                delivery_time,
            });
        }

        Some(Event {
            server_index: from_index,
            kind: EventKind::Network,
            time: t,
        })
    }

    fn dispatch_tick(&mut self, index: usize) {
        let now = self.now;
        let old_period = self.servers[index].io.tick_timer.period;
        let old_next = self.servers[index].io.tick_timer.next_expiry;
        {
            let connectivity = &self.connectivity;
            let server = &mut self.servers[index];
            let mut io = IoBackend {
                state: &mut server.io,
                connectivity,
                self_index: index,
                now,
            };
            server.raft.on_tick(&mut io);
        }
        let timer = &mut self.servers[index].io.tick_timer;
        if timer.next_expiry == old_next {
            timer.next_expiry = old_next.checked_add(old_period);
        }
    }

    fn dispatch_disk(&mut self, index: usize) {
        let now = self.now;
        let pos = self.servers[index]
            .io
            .append_queue
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| p.completion_time)
            .map(|(i, _)| i);
        let pos = match pos {
            Some(p) => p,
            None => return,
        };
        let pending = self.servers[index].io.append_queue.remove(pos);
        let result = if pending.faulting { Err(IoFault) } else { Ok(()) };
        let connectivity = &self.connectivity;
        let server = &mut self.servers[index];
        let mut io = IoBackend {
            state: &mut server.io,
            connectivity,
            self_index: index,
            now,
        };
        server.raft.on_append_complete(pending.token, result, &mut io);
    }

    fn dispatch_network(&mut self, index: usize) {
        let now = self.now;
        let pos = {
            let connectivity = &self.connectivity;
            self.servers[index]
                .io
                .transit_queue
                .iter()
                .enumerate()
                .filter(|(_, m)| connectivity.allows_delivery(id_to_index(m.from), index))
                .min_by_key(|(_, m)| m.delivery_time)
                .map(|(i, _)| i)
        };
        let pos = match pos {
            Some(p) => p,
            None => return,
        };
        let msg = self.servers[index].io.transit_queue.remove(pos);
        let deliverable = self.connectivity.allows_delivery(id_to_index(msg.from), index) && self.servers[index].alive;
        if deliverable {
            self.servers[index].io.record_recv(msg.message.kind());
            let connectivity = &self.connectivity;
            let server = &mut self.servers[index];
            let mut io = IoBackend {
                state: &mut server.io,
                connectivity,
                self_index: index,
                now,
            };
            server.raft.on_recv(msg.from, msg.message, &mut io);
        }
        // else: silent drop (§3 invariant 3, §9 Open Question 1) — this still
        // counts as the step's dispatched event.
    }

    /// Phases 3–4: stable leader detection, Election Safety, Leader
    /// Append-Only, and the snapshot taken for the next comparison.
    fn run_safety_checks(&mut self) -> Result<(), SafetyViolation> {
        let refs: Vec<(bool, &R)> = self.servers.iter().map(|s| (s.alive, &s.raft)).collect();
        let voting_indices: Vec<usize> = self
            .voting
            .iter()
            .enumerate()
            .filter(|(_, v)| **v)
            .map(|(i, _)| i)
            .collect();
        let leader_index = detect_stable_leader::<P, R>(&refs, &self.connectivity, &voting_indices)?;
        match leader_index {
            Some(idx) => {
                let current_id = index_to_id(idx);
                let current_log = self.servers[idx].raft.log_view().to_vec();
                if let Some(prev) = &self.stable_leader_snapshot {
                    check_leader_append_only(prev, current_id, &current_log)?;
                }
                self.leader_id = current_id;
                self.last_commit_index = self.servers[idx].raft.commit_index();
                self.stable_leader_snapshot = Some(StableLeaderSnapshot {
                    id: current_id,
                    log: current_log,
                });
            }
            None => {
                self.leader_id = 0;
            }
        }
        Ok(())
    }
}
