//! Partition-heals scenario (S4): a minority partition is created and
//! healed, and Leader Append-Only must hold across the whole run.
//!
//! RUST_LOG=raft_fixture=trace cargo test -p raft-fixture --test partition

mod support;

use raft_fixture::Fixture;
use support::scripted_cluster;

#[allow(unused_imports)]
use pretty_assertions::assert_eq;
#[allow(unused_imports)]
use pretty_assertions::assert_ne;

#[test]
fn minority_partition_heals_without_rewriting_the_leaders_log() {
    support::init_tracing();

    let mut fixture = Fixture::new(scripted_cluster::<u64>(5));
    let config = fixture.configuration(5);
    fixture.bootstrap(&config);
    fixture.start();

    assert!(fixture.elect(0, 10_000).unwrap());
    let leader = fixture.leader_index().expect("leader elected");

    let followers: Vec<usize> = (0..5).filter(|&i| i != leader).collect();
    let minority = followers[0];

    // Isolate one follower from the rest of the cluster (both directions),
    // leaving a four-node majority intact.
    for &other in followers.iter().filter(|&&o| o != minority).chain(std::iter::once(&leader)) {
        fixture.disconnect(minority, other).unwrap();
        fixture.disconnect(other, minority).unwrap();
    }

    // Drive the cluster while partitioned; the safety checks run on every
    // `step` inside `step_until_elapsed`, so a Leader Append-Only violation
    // would surface as an `Err` here.
    fixture.step_until_elapsed(3_000).expect("no safety violation while partitioned");
    assert_eq!(fixture.leader_index(), Some(leader), "majority side keeps its leader");

    for &other in followers.iter().filter(|&&o| o != minority).chain(std::iter::once(&leader)) {
        fixture.reconnect(minority, other).unwrap();
        fixture.reconnect(other, minority).unwrap();
    }

    // Healing may cost the original leader its term (the rejoining server's
    // inflated term can force a fresh election), but the cluster must
    // converge back onto exactly one stable leader with no safety violation.
    let restabilized = fixture
        .step_until(10_000, |f| f.has_leader())
        .expect("no safety violation after healing");
    assert!(restabilized, "cluster should re-converge on a single leader after healing");
}
