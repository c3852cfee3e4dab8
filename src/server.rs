//! A single cluster member: its id/address, its I/O state, and the
//! `RaftInstance` driving it (§3, §6).

use crate::io::IoState;
use crate::raft_api::RaftInstance;
use crate::Millis;
use crate::Payload;
use crate::ServerId;

/// Maps a server index (`0..n`) to its conventional id (§3: "id typically
/// `i + 1`"). The fixture adopts this convention unconditionally.
pub fn index_to_id(index: usize) -> ServerId {
    index as ServerId + 1
}

/// The inverse of [`index_to_id`]. Panics if `id` is `0`, which is never a
/// valid server id under this crate's convention.
pub fn id_to_index(id: ServerId) -> usize {
    assert!(id > 0, "server id 0 is not valid under the index+1 convention");
    (id - 1) as usize
}

pub(crate) struct Server<P: Payload, R: RaftInstance<P>> {
    pub alive: bool,
    pub address: String,
    pub io: IoState<P>,
    pub raft: R,
}

impl<P: Payload, R: RaftInstance<P>> Server<P, R> {
    pub fn new(
        index: usize,
        address: String,
        default_election_timeout: Millis,
        disk_latency: Millis,
        network_latency: Millis,
        raft: R,
    ) -> Self {
        Self {
            alive: true,
            address,
            io: IoState::new(index_to_id(index), default_election_timeout, disk_latency, network_latency),
            raft,
        }
    }

    pub fn id(&self) -> ServerId {
        self.io.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_and_index_round_trip() {
        for index in 0..16usize {
            assert_eq!(id_to_index(index_to_id(index)), index);
        }
    }

    #[test]
    fn index_zero_is_id_one() {
        assert_eq!(index_to_id(0), 1);
    }
}
