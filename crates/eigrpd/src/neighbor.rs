//! The neighbor record and its FSM (§4.C): DOWN → PENDING → UP, K-value mismatch handling,
//! holddown, and graceful-restart resync bookkeeping.

use crate::{
    config::DEFAULT_HOLD_TIME,
    topology::NeighborId,
    transport::{
        RetransQueue,
        SequenceCounter,
    },
};
use eigrp_packet::tlv::KValues;
use eigrp_common::Ipv4Prefix;
use std::{
    collections::HashSet,
    net::Ipv4Addr,
    time::Duration,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborState {
    Down,
    Pending,
    Up,
}

/// Graceful-restart resync bookkeeping (§8 scenario 6 / GLOSSARY "Graceful Restart"). `None`
/// outside of a resync window.
#[derive(Debug, Clone, Default)]
pub struct RestartResync {
    /// Snapshot of every prefix previously known from this neighbor, taken at the first
    /// `INIT|RS` Update; entries are removed as they're re-advertised, and whatever remains at
    /// `EOT` is poisoned. Keyed by the full `(address, prefix_len)` pair, not just the address,
    /// since two different prefixes can share a network address under different masks.
    pub stale_prefixes: HashSet<Ipv4Prefix>,
}

/// One neighbor: FSM state, the reliable-transport queue, and what the last Hello/Update told us
/// about the peer (§3's "Neighbor record").
#[derive(Debug, Clone)]
pub struct NeighborRecord {
    pub id: NeighborId,
    pub interface_id: u32,
    pub address: Ipv4Addr,
    pub state: NeighborState,
    pub k_values: KValues,
    pub hold_time: Duration,
    pub sequence: SequenceCounter,
    pub init_update_sequence: Option<u32>,
    pub resync: Option<RestartResync>,
    /// The highest AUTH TLV `key_sequence` accepted from this neighbor so far (§4.A replay
    /// guard). `None` until the first authenticated packet is verified.
    pub last_accepted_key_sequence: Option<u32>,
}

impl NeighborRecord {
    pub fn new(id: NeighborId, interface_id: u32, address: Ipv4Addr) -> Self {
        Self {
            id,
            interface_id,
            address,
            state: NeighborState::Down,
            k_values: KValues::DEFAULT,
            hold_time: DEFAULT_HOLD_TIME,
            sequence: SequenceCounter::default(),
            init_update_sequence: None,
            resync: None,
            last_accepted_key_sequence: None,
        }
    }

    /// The first Hello from a previously-unknown source: §8 scenario 1, "R2 creates neighbor
    /// PENDING". `local_k` is this process's own K-value vector (§7 `KMismatch`).
    pub fn on_first_hello(&mut self, peer_k: KValues, local_k: KValues) -> Result<(), KMismatch> {
        if peer_k != local_k {
            return Err(KMismatch);
        }
        self.k_values = peer_k;
        self.state = NeighborState::Pending;
        Ok(())
    }

    /// A later Hello (or a Hello carrying only an ACK) on an already-known neighbor: re-checks
    /// K-values and rearms holddown. Returns `Err` if the adjacency must be torn down (§7
    /// `KMismatch`: "if adjacency exists, tear it down").
    pub fn on_hello(&mut self, peer_k: KValues) -> Result<(), KMismatch> {
        if self.state != NeighborState::Down && peer_k != self.k_values {
            self.state = NeighborState::Down;
            return Err(KMismatch);
        }
        Ok(())
    }

    /// ACK for the INIT-Update arrived (§4.B: "if it was the INIT-UPDATE, transition neighbor
    /// PENDING→UP").
    pub fn on_init_update_acked(&mut self) {
        if self.state == NeighborState::Pending {
            self.state = NeighborState::Up;
        }
    }

    /// Holddown expiry (§4.C / §8 scenario 2): no valid Hello within `hold_time`.
    pub fn on_holddown_expired(&mut self) {
        self.state = NeighborState::Down;
    }

    /// Retransmit exhaustion or SIA-stuck teardown (§7: both dispositions are "adjacency torn
    /// down; all prefixes learned from that neighbor are withdrawn through DUAL").
    pub fn tear_down(&mut self) {
        self.state = NeighborState::Down;
    }

    pub fn is_up(&self) -> bool {
        self.state == NeighborState::Up
    }

    /// First `INIT|RS` Update of a graceful restart (§8 scenario 6): snapshots the prefixes
    /// currently known from this neighbor so EOT can tell what wasn't re-advertised.
    pub fn begin_restart_resync(&mut self, known_prefixes: &[Ipv4Prefix]) {
        self.resync = Some(RestartResync { stale_prefixes: known_prefixes.iter().copied().collect() });
    }

    /// A re-advertised prefix during resync is removed from the stale set.
    pub fn mark_resync_prefix_seen(&mut self, prefix: Ipv4Prefix) {
        if let Some(resync) = &mut self.resync {
            resync.stale_prefixes.remove(&prefix);
        }
    }

    /// EOT marker: returns the prefixes never re-advertised, which the caller must poison, and
    /// clears the resync window.
    pub fn end_restart_resync(&mut self) -> Vec<Ipv4Prefix> {
        match self.resync.take() {
            Some(resync) => resync.stale_prefixes.into_iter().collect(),
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KMismatch;

impl std::fmt::Display for KMismatch {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "K-value mismatch")
    }
}

impl std::error::Error for KMismatch {}

/// Owns a neighbor's reliable-transport queue alongside its FSM state, since both are mutated
/// together on every inbound packet (§4.C "shared resource policy").
#[derive(Debug)]
pub struct NeighborSlot {
    pub record: NeighborRecord,
    pub retrans: RetransQueue,
}

impl NeighborSlot {
    pub fn new(id: NeighborId, interface_id: u32, address: Ipv4Addr) -> Self {
        Self { record: NeighborRecord::new(id, interface_id, address), retrans: RetransQueue::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_hello_with_matching_k_goes_pending() {
        let mut neighbor = NeighborRecord::new(1, 0, Ipv4Addr::new(10, 0, 0, 2));
        neighbor.on_first_hello(KValues::DEFAULT, KValues::DEFAULT).unwrap();
        assert_eq!(neighbor.state, NeighborState::Pending);
    }

    #[test]
    fn first_hello_with_mismatched_k_is_rejected() {
        let mut neighbor = NeighborRecord::new(1, 0, Ipv4Addr::new(10, 0, 0, 2));
        let mismatched = KValues { k1: 2, ..KValues::DEFAULT };
        assert!(neighbor.on_first_hello(mismatched, KValues::DEFAULT).is_err());
        assert_eq!(neighbor.state, NeighborState::Down);
    }

    #[test]
    fn init_update_ack_moves_pending_to_up() {
        let mut neighbor = NeighborRecord::new(1, 0, Ipv4Addr::new(10, 0, 0, 2));
        neighbor.on_first_hello(KValues::DEFAULT, KValues::DEFAULT).unwrap();
        neighbor.on_init_update_acked();
        assert_eq!(neighbor.state, NeighborState::Up);
    }

    #[test]
    fn k_mismatch_on_established_neighbor_tears_down() {
        let mut neighbor = NeighborRecord::new(1, 0, Ipv4Addr::new(10, 0, 0, 2));
        neighbor.on_first_hello(KValues::DEFAULT, KValues::DEFAULT).unwrap();
        neighbor.on_init_update_acked();
        let mismatched = KValues { k3: 5, ..KValues::DEFAULT };
        assert!(neighbor.on_hello(mismatched).is_err());
        assert_eq!(neighbor.state, NeighborState::Down);
    }

    #[test]
    fn holddown_expiry_tears_down_the_neighbor() {
        let mut neighbor = NeighborRecord::new(1, 0, Ipv4Addr::new(10, 0, 0, 2));
        neighbor.on_first_hello(KValues::DEFAULT, KValues::DEFAULT).unwrap();
        neighbor.on_init_update_acked();
        neighbor.on_holddown_expired();
        assert_eq!(neighbor.state, NeighborState::Down);
    }

    #[test]
    fn restart_resync_poisons_prefixes_never_reseen() {
        let mut neighbor = NeighborRecord::new(1, 0, Ipv4Addr::new(10, 0, 0, 2));
        let known = vec![
            Ipv4Prefix::new(Ipv4Addr::new(10, 0, 0, 0), 24).unwrap(),
            Ipv4Prefix::new(Ipv4Addr::new(10, 0, 1, 0), 24).unwrap(),
        ];
        neighbor.begin_restart_resync(&known);
        neighbor.mark_resync_prefix_seen(known[0]);
        let stale = neighbor.end_restart_resync();
        assert_eq!(stale, vec![known[1]]);
        assert!(neighbor.resync.is_none());
    }
}
