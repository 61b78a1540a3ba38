//! The topology table (§4.D): `(prefix, prefixlen) -> PrefixEntry`, each holding the set of
//! neighbor-entries that advertise it and the bookkeeping DUAL needs (reply-status bitmap,
//! serial number, pending-action flags).

use crate::{
    dual::DualState,
    metric::{
        LinkMetric,
        METRIC_INFINITE,
    },
};
use bitflags::bitflags;
use eigrp_common::Ipv4Prefix;
use std::collections::{
    HashMap,
    HashSet,
};

pub type NeighborId = u32;

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct NeighborEntryFlags: u8 {
        const SUCCESSOR          = 0x01;
        const FEASIBLE_SUCCESSOR = 0x02;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct PendingFlags: u8 {
        const NEEDS_UPDATE = 0x01;
        const NEEDS_QUERY  = 0x02;
    }
}

/// A single (prefix, advertising-neighbor) tuple (§3's "Neighbor entry"). A synthetic
/// "self" neighbor (`NeighborId::MAX`) represents directly connected routes.
#[derive(Debug, Clone)]
pub struct NeighborEntry {
    pub neighbor_id: NeighborId,
    pub interface_id: u32,
    pub reported_distance: u32,
    pub local_distance: u32,
    /// The combined (neighbor-reported + outgoing-interface) distance vector, kept alongside the
    /// composed `local_distance` so a Query/Reply TLV re-advertised toward another neighbor can
    /// report a faithful vector instead of just the scalar this process derived from it.
    pub vector: LinkMetric,
    pub hop_count: u8,
    pub flags: NeighborEntryFlags,
}

/// Sentinel neighbor id for directly connected / redistributed routes with no real neighbor.
pub const SELF_NEIGHBOR: NeighborId = NeighborId::MAX;

/// One topology-table node (§3's "Prefix entry").
#[derive(Debug, Clone)]
pub struct PrefixEntry {
    pub prefix: Ipv4Prefix,
    pub state: DualState,
    pub fd: u32,
    pub serial: u64,
    pub entries: Vec<NeighborEntry>,
    pub reply_status: HashSet<NeighborId>,
    pub sia_status: HashSet<NeighborId>,
    /// Neighbors that sent a Query for this prefix while it was or became ACTIVE; each is owed a
    /// Reply once this prefix resolves back to PASSIVE, independent of whichever neighbor-entry
    /// change actually drove the transition.
    pub queriers: HashSet<NeighborId>,
    pub pending: PendingFlags,
}

impl PrefixEntry {
    fn new(prefix: Ipv4Prefix, serial: u64) -> Self {
        Self {
            prefix,
            state: DualState::Passive,
            fd: METRIC_INFINITE,
            serial,
            entries: Vec::new(),
            reply_status: HashSet::new(),
            sia_status: HashSet::new(),
            queriers: HashSet::new(),
            pending: PendingFlags::empty(),
        }
    }

    pub fn entry(&self, neighbor_id: NeighborId) -> Option<&NeighborEntry> {
        self.entries.iter().find(|entry| entry.neighbor_id == neighbor_id)
    }

    pub fn entry_mut(&mut self, neighbor_id: NeighborId) -> Option<&mut NeighborEntry> {
        self.entries.iter_mut().find(|entry| entry.neighbor_id == neighbor_id)
    }

    pub fn successor(&self) -> Option<&NeighborEntry> {
        self.entries.iter().find(|entry| entry.flags.contains(NeighborEntryFlags::SUCCESSOR))
    }

    pub fn feasible_successors(&self) -> impl Iterator<Item = &NeighborEntry> {
        self.entries.iter().filter(|entry| entry.flags.contains(NeighborEntryFlags::FEASIBLE_SUCCESSOR))
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, DualState::Passive)
    }

    /// Re-derives SUCCESSOR/FEASIBLE_SUCCESSOR flags after a change to any entry's distance or to
    /// `fd`. Returns `true` if the successor neighbor changed (§4.D step 4).
    ///
    /// Feasibility condition (§4.D step 3, GLOSSARY): an entry is a feasible successor iff
    /// `reported_distance < fd` (the FD in effect *before* this recomputation) and
    /// `distance <= variance * min_dist`.
    pub fn recompute_successor(&mut self, variance: u32) -> bool {
        let previous_successor = self.successor().map(|entry| entry.neighbor_id);
        let feasibility_fd = self.fd;

        for entry in &mut self.entries {
            entry.flags = NeighborEntryFlags::empty();
        }

        let min_dist = self.entries.iter().map(|entry| entry.local_distance).min();

        if let Some(min_dist) = min_dist {
            // Deterministic tie-break by (neighbor.src, interface.ifindex): NeighborId/interface_id
            // stand in for those keys in this arena-based model (§9).
            let successor_id = self
                .entries
                .iter()
                .filter(|entry| entry.local_distance == min_dist)
                .min_by_key(|entry| (entry.neighbor_id, entry.interface_id))
                .map(|entry| entry.neighbor_id);

            let ceiling = (min_dist as u64).saturating_mul(variance.max(1) as u64).min(METRIC_INFINITE as u64) as u32;

            for entry in &mut self.entries {
                if Some(entry.neighbor_id) == successor_id {
                    entry.flags.insert(NeighborEntryFlags::SUCCESSOR);
                }
                if entry.reported_distance < feasibility_fd && entry.local_distance <= ceiling {
                    entry.flags.insert(NeighborEntryFlags::FEASIBLE_SUCCESSOR);
                }
            }
        }

        let new_successor = self.successor().map(|entry| entry.neighbor_id);
        if new_successor != previous_successor {
            self.pending.insert(PendingFlags::NEEDS_UPDATE);
            true
        } else {
            false
        }
    }
}

/// Keyed by `(prefix, prefixlen)` per §4.D.
#[derive(Debug, Default)]
pub struct TopologyTable {
    entries: HashMap<(std::net::Ipv4Addr, u8), PrefixEntry>,
    next_serial: u64,
}

impl TopologyTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(prefix: Ipv4Prefix) -> (std::net::Ipv4Addr, u8) {
        (prefix.address, prefix.prefix_len)
    }

    pub fn lookup(&self, prefix: Ipv4Prefix) -> Option<&PrefixEntry> {
        self.entries.get(&Self::key(prefix))
    }

    pub fn lookup_mut(&mut self, prefix: Ipv4Prefix) -> Option<&mut PrefixEntry> {
        self.entries.get_mut(&Self::key(prefix))
    }

    /// Returns the existing entry for `prefix`, creating one (in PASSIVE, FD = infinite) if
    /// absent.
    pub fn insert(&mut self, prefix: Ipv4Prefix) -> &mut PrefixEntry {
        let serial = self.next_serial;
        let entry = self.entries.entry(Self::key(prefix)).or_insert_with(|| {
            self.next_serial += 1;
            PrefixEntry::new(prefix, serial)
        });
        entry
    }

    pub fn delete(&mut self, prefix: Ipv4Prefix) -> Option<PrefixEntry> {
        self.entries.remove(&Self::key(prefix))
    }

    pub fn lookup_entry(&self, prefix: Ipv4Prefix, neighbor_id: NeighborId) -> Option<&NeighborEntry> {
        self.lookup(prefix).and_then(|entry| entry.entry(neighbor_id))
    }

    /// All prefixes with a neighbor-entry from `neighbor_id` (§4.D operation
    /// `prefixes_from(neighbor)`), used to withdraw routes on holddown expiry / retransmit
    /// exhaustion and to drive graceful-restart resync.
    pub fn prefixes_from(&self, neighbor_id: NeighborId) -> Vec<Ipv4Prefix> {
        self.entries
            .values()
            .filter(|entry| entry.entry(neighbor_id).is_some())
            .map(|entry| entry.prefix)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrefixEntry> {
        self.entries.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PrefixEntry> {
        self.entries.values_mut()
    }

    pub fn active_prefixes(&self) -> impl Iterator<Item = &PrefixEntry> {
        self.entries.values().filter(|entry| entry.is_active())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn prefix() -> Ipv4Prefix {
        Ipv4Prefix::new(Ipv4Addr::new(10, 0, 0, 0), 24).unwrap()
    }

    fn neighbor_entry(neighbor_id: NeighborId, reported_distance: u32, local_distance: u32) -> NeighborEntry {
        NeighborEntry { neighbor_id, interface_id: 0, reported_distance, local_distance, vector: LinkMetric::default(), hop_count: 0, flags: NeighborEntryFlags::empty() }
    }

    #[test]
    fn lower_distance_wins_successor() {
        let mut table = TopologyTable::new();
        let entry = table.insert(prefix());
        entry.entries.push(neighbor_entry(1, 50, 150));
        entry.entries.push(neighbor_entry(2, 90, 100));
        entry.fd = METRIC_INFINITE;
        entry.recompute_successor(1);

        let entry = table.lookup(prefix()).unwrap();
        assert_eq!(entry.successor().unwrap().neighbor_id, 2);
    }

    #[test]
    fn feasibility_condition_requires_reported_distance_below_fd() {
        let mut table = TopologyTable::new();
        let entry = table.insert(prefix());
        entry.fd = 100;
        entry.entries.push(neighbor_entry(1, 50, 150));
        entry.entries.push(neighbor_entry(2, 120, 140));
        entry.recompute_successor(1);

        let entry = table.lookup(prefix()).unwrap();
        assert!(entry.entry(1).unwrap().flags.contains(NeighborEntryFlags::FEASIBLE_SUCCESSOR));
        assert!(!entry.entry(2).unwrap().flags.contains(NeighborEntryFlags::FEASIBLE_SUCCESSOR));
    }

    #[test]
    fn successor_change_sets_needs_update() {
        let mut table = TopologyTable::new();
        let entry = table.insert(prefix());
        entry.entries.push(neighbor_entry(1, 10, 100));
        entry.recompute_successor(1);
        assert!(entry.pending.contains(PendingFlags::NEEDS_UPDATE));

        entry.pending = PendingFlags::empty();
        entry.entries[0].local_distance = 50;
        let changed = entry.recompute_successor(1);
        assert!(!changed);
        assert!(!entry.pending.contains(PendingFlags::NEEDS_UPDATE));
    }

    #[test]
    fn prefixes_from_finds_every_prefix_with_that_neighbor() {
        let mut table = TopologyTable::new();
        table.insert(prefix()).entries.push(neighbor_entry(7, 1, 1));
        let other = Ipv4Prefix::new(Ipv4Addr::new(192, 168, 0, 0), 24).unwrap();
        table.insert(other);

        let found = table.prefixes_from(7);
        assert_eq!(found, vec![prefix()]);
    }
}
