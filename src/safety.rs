//! The cluster-wide safety checks run after every step (§4.E Phase 3/4):
//! Election Safety, Leader Append-Only, and the "stable leader" detection
//! those checks are keyed on.
//!
//! "Acknowledged", for the purposes of stable-leader detection, is pinned
//! here (§9 Open Question 3) as: a voting server the leader can currently
//! reach whose log is byte-for-byte identical to the leader's log. This is
//! the simplest reading consistent with §8 property 2 (Leader Append-Only)
//! and needs no extra capability on [`RaftInstance`] beyond `log_view`.

use crate::connectivity::Connectivity;
use crate::log::is_prefix_extension;
use crate::log::LogEntry;
use crate::raft_api::RaftInstance;
use crate::raft_api::RaftState;
use crate::server::index_to_id;
use crate::Payload;
use crate::SafetyViolation;
use crate::ServerId;

/// A snapshot of the stable leader taken after a step, for comparison on
/// the next step (§4.E Phase 4).
#[derive(Clone, Debug)]
pub(crate) struct StableLeaderSnapshot<P: Payload> {
    pub id: ServerId,
    pub log: Vec<LogEntry<P>>,
}

/// Scans all live servers for the stable leader (§4.E Phase 3), asserting
/// Election Safety along the way.
///
/// `voting` is the set of server indices that count toward the voting
/// majority. Returns `Ok(Some(index))` for the stable leader's index,
/// `Ok(None)` if no leader is currently stable, or `Err` on a fatal
/// invariant violation.
pub(crate) fn detect_stable_leader<P, R>(
    servers: &[(bool, &R)],
    connectivity: &Connectivity,
    voting: &[usize],
) -> Result<Option<usize>, SafetyViolation>
where
    P: Payload + PartialEq,
    R: RaftInstance<P>,
{
    let mut leaders: Vec<(usize, u64)> = Vec::new();
    for (index, (alive, raft)) in servers.iter().enumerate() {
        if *alive && raft.state() == RaftState::Leader {
            leaders.push((index, raft.current_term()));
        }
    }

    let highest_term = match leaders.iter().map(|(_, t)| *t).max() {
        Some(t) => t,
        None => return Ok(None),
    };
    let at_highest: Vec<usize> = leaders
        .iter()
        .filter(|(_, t)| *t == highest_term)
        .map(|(i, _)| *i)
        .collect();

    if at_highest.len() > 1 {
        return Err(SafetyViolation::TwoLeadersSameTerm {
            term: highest_term,
            a: index_to_id(at_highest[0]),
            b: index_to_id(at_highest[1]),
        });
    }

    let leader_index = at_highest[0];
    let leader_log = servers[leader_index].1.log_view();

    let voting_count = voting.len();
    if voting_count == 0 {
        return Ok(None);
    }
    let majority = voting_count / 2 + 1;

    let mut reachable_all_ack = true;
    let mut ack_count = 0usize;
    for &j in voting {
        if j == leader_index {
            ack_count += 1;
            continue;
        }
        if !connectivity.allows_delivery(leader_index, j) {
            continue;
        }
        let (alive, raft) = servers[j];
        let acknowledges = alive && raft.log_view() == leader_log;
        if acknowledges {
            ack_count += 1;
        } else {
            reachable_all_ack = false;
        }
    }

    if reachable_all_ack && ack_count >= majority {
        Ok(Some(leader_index))
    } else {
        Ok(None)
    }
}

/// Asserts Leader Append-Only (§4.E Phase 3, §8 property 2): if the
/// newly-detected stable leader is the same server as `previous`, its
/// previously-snapshotted log must be a prefix of its current log.
pub(crate) fn check_leader_append_only<P: Payload + PartialEq>(
    previous: &StableLeaderSnapshot<P>,
    current_id: ServerId,
    current_log: &[LogEntry<P>],
) -> Result<(), SafetyViolation> {
    if previous.id != current_id {
        return Ok(());
    }
    if is_prefix_extension(&previous.log, current_log) {
        Ok(())
    } else {
        Err(SafetyViolation::LeaderLogRewritten { leader: current_id })
    }
}
