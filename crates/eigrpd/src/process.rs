//! The Autonomous System instance (§3 / §9 "Global mutable state" → a `Process` handle
//! threaded explicitly instead of module globals). Owns every interface, the topology table, and
//! the AS-wide sequence counter; the scheduler is the only thing that drives it.

use crate::{
    config::ProcessConfig,
    dual::{
        self,
        ChangeTrigger,
        DualAction,
    },
    error::{
        EigrpError,
        FatalError,
    },
    interface::Interface,
    metric::{
        self,
        METRIC_INFINITE,
    },
    neighbor::{
        NeighborSlot,
        NeighborState,
    },
    topology::{
        NeighborEntry,
        NeighborEntryFlags,
        NeighborId,
        TopologyTable,
    },
    transport::SequenceCounter,
};
use eigrp_common::Ipv4Prefix;
use eigrp_packet::tlv::{
    Ipv4InternalTlv,
    ReportedMetric,
};
use eigrp_route::{
    FibRoute,
    KeychainSource,
    RouteSink,
};
use std::{
    collections::HashMap,
    net::Ipv4Addr,
    sync::Arc,
};

/// A deferred FIB call. §5 forbids suspension points inside packet-handling callbacks, so
/// DUAL records what the FIB should do and the scheduler drains this queue on an async runtime
/// between event-loop ticks.
#[derive(Debug, Clone)]
pub enum FibAction {
    Install(FibRoute),
    Withdraw(Ipv4Prefix),
}

/// Deferred outbound Query/Reply work DUAL asked for on this tick (§4.E orchestration). Unlike
/// `FibAction` this always needs the scheduler, since building the packet requires the transport
/// layer (sequence numbers, retransmit queues); the scheduler drains this the same way.
#[derive(Debug, Clone)]
pub enum DualPacketAction {
    QueryAllNeighbors { prefix: Ipv4Prefix },
    ReplyToQueriers { prefix: Ipv4Prefix, queriers: Vec<NeighborId> },
}

/// The AS instance (§3). Generic over the route sink so the topology/DUAL core never
/// depends on `rtnetlink` directly; tests plug in `eigrp_route::null::NullRouteSink`.
pub struct Process<S: RouteSink> {
    pub config: ProcessConfig,
    pub interfaces: HashMap<u32, Interface>,
    pub neighbors: HashMap<NeighborId, NeighborSlot>,
    pub topology: TopologyTable,
    pub sequence: SequenceCounter,
    pub pending_fib_actions: Vec<FibAction>,
    pub pending_dual_actions: Vec<DualPacketAction>,
    next_neighbor_id: NeighborId,
    pub route_sink: S,
    pub keychain_source: Arc<dyn KeychainSource>,
}

impl<S: RouteSink> Process<S> {
    pub fn new(config: ProcessConfig, route_sink: S, keychain_source: Arc<dyn KeychainSource>) -> Self {
        let interfaces = config.interfaces.iter().map(|iface| (iface.ifindex, Interface::new(iface.clone()))).collect();
        Self {
            config,
            interfaces,
            neighbors: HashMap::new(),
            topology: TopologyTable::new(),
            sequence: SequenceCounter::default(),
            pending_fib_actions: Vec::new(),
            pending_dual_actions: Vec::new(),
            next_neighbor_id: 0,
            route_sink,
            keychain_source,
        }
    }

    /// Resolves the active send key for `keychain_name` right now, or `None` if the keychain has
    /// no active key (e.g. during a rollover gap) or isn't configured at all.
    pub fn resolve_send_key(&self, keychain_name: &str) -> Option<eigrp_route::AuthKey> {
        self.keychain_source.lookup(keychain_name)?.active_send_key(unix_now())
    }

    /// Resolves the accept-key secret for `key_id` on `keychain_name`, as claimed by an inbound
    /// packet's AUTH TLV.
    pub fn resolve_accept_key(&self, keychain_name: &str, key_id: u32) -> Option<Vec<u8>> {
        self.keychain_source.lookup(keychain_name)?.accept_key(key_id, unix_now())
    }

    /// Admits a new source address as a neighbor (§8 scenario 1). Returns `None` if `src` is
    /// outside `interface_id`'s configured network (§7 `NetworkMismatch`).
    pub fn admit_neighbor(&mut self, interface_id: u32, src: Ipv4Addr) -> Option<NeighborId> {
        let interface = self.interfaces.get(&interface_id)?;
        if !interface.contains(src) {
            return None;
        }
        if let Some(slot) = self.neighbors.values().find(|slot| slot.record.interface_id == interface_id && slot.record.address == src) {
            return Some(slot.record.id);
        }
        let id = self.next_neighbor_id;
        self.next_neighbor_id += 1;
        self.neighbors.insert(id, NeighborSlot::new(id, interface_id, src));
        Some(id)
    }

    pub fn neighbor_up_count_on(&self, interface_id: u32) -> usize {
        self.neighbors.values().filter(|slot| slot.record.interface_id == interface_id && slot.record.is_up()).count()
    }

    /// Applies a neighbor-entry change for `prefix` learned from `neighbor_id` and runs it through
    /// DUAL, recording any resulting FIB action. `reported` is the metric the neighbor advertised;
    /// `withdrawn` models an infinite-metric / removed advertisement (§4.E poison rule).
    pub fn apply_neighbor_update(&mut self, prefix: Ipv4Prefix, neighbor_id: NeighborId, tlv: &Ipv4InternalTlv) -> Result<(), EigrpError> {
        // Callers only ever pass a `neighbor_id` returned by `admit_neighbor`.
        let interface_id = self.neighbors.get(&neighbor_id).expect("neighbor_id came from admit_neighbor").record.interface_id;
        let link_metric = self.interfaces.get(&interface_id).map(|iface| iface.link_metric()).unwrap_or(metric::LinkMetric { bandwidth_kbps: 0, delay_10us: 0, reliability: 0, load: 0 });

        let reported_vector =
            metric::LinkMetric { bandwidth_kbps: tlv.metric.bandwidth, delay_10us: tlv.metric.delay, reliability: tlv.metric.reliability, load: tlv.metric.load };
        let reported_distance = metric::composite(self.config.k_values, reported_vector);
        let combined_vector = metric::combine(reported_vector, link_metric);
        let (local_distance, vector) =
            if tlv.metric.is_infinite() { (METRIC_INFINITE, combined_vector) } else { (metric::composite(self.config.k_values, combined_vector), combined_vector) };
        let hop_count = tlv.metric.hop_count.saturating_add(1);

        let entry = self.topology.insert(prefix);
        let was_successor = entry.entry(neighbor_id).is_some_and(|e| e.flags.contains(NeighborEntryFlags::SUCCESSOR));

        if tlv.metric.is_infinite() {
            entry.entries.retain(|e| e.neighbor_id != neighbor_id);
        } else if let Some(existing) = entry.entry_mut(neighbor_id) {
            existing.reported_distance = reported_distance;
            existing.local_distance = local_distance;
            existing.vector = vector;
            existing.hop_count = hop_count;
        } else {
            entry.entries.push(NeighborEntry { neighbor_id, interface_id, reported_distance, local_distance, vector, hop_count, flags: NeighborEntryFlags::empty() });
        }

        let trigger = if was_successor { ChangeTrigger::FromSuccessor(neighbor_id) } else { ChangeTrigger::FromNonSuccessor(neighbor_id) };
        let action = dual::on_metric_change(entry, self.config.variance, trigger);
        self.record_dual_action(prefix, action);
        Ok(())
    }

    /// A Query carries the same per-route TLVs an Update does, so it drives DUAL through the same
    /// path; the only difference is that `neighbor_id` is remembered as owed a Reply once this
    /// prefix next resolves (§4.E: every neighbor that queried while a prefix was ACTIVE gets a
    /// Reply, not just the one whose input caused the transition).
    pub fn apply_query(&mut self, prefix: Ipv4Prefix, neighbor_id: NeighborId, tlv: &Ipv4InternalTlv) -> Result<(), EigrpError> {
        self.topology.insert(prefix).queriers.insert(neighbor_id);
        self.apply_neighbor_update(prefix, neighbor_id, tlv)
    }

    /// Records a Reply from `neighbor_id` for `prefix` and, if it empties the reply-status bitmap,
    /// queues the resulting FIB action (§4.E / §8 scenario 5).
    pub fn apply_reply(&mut self, prefix: Ipv4Prefix, neighbor_id: NeighborId) {
        let Some(entry) = self.topology.lookup_mut(prefix) else { return };
        let action = dual::on_reply_received(entry, neighbor_id, self.config.variance);
        self.record_dual_action(prefix, action);
    }

    /// Withdraws every prefix whose only path was `neighbor_id` (holddown expiry, retransmit
    /// exhaustion, SIA-stuck; §8 scenarios 2/3).
    pub fn withdraw_neighbor(&mut self, neighbor_id: NeighborId) {
        for prefix in self.topology.prefixes_from(neighbor_id) {
            let Some(entry) = self.topology.lookup_mut(prefix) else { continue };
            let action = dual::poison(entry, neighbor_id, self.config.variance);
            self.record_dual_action(prefix, action);
            if let Some(entry) = self.topology.lookup_mut(prefix) {
                entry.entries.retain(|e| e.neighbor_id != neighbor_id);
            }
        }
        if let Some(slot) = self.neighbors.get_mut(&neighbor_id) {
            slot.record.tear_down();
        }
    }

    /// Poisons specific prefixes learned from `neighbor_id` without tearing the neighbor itself
    /// down (§8 scenario 6: graceful-restart EOT poisons only what was never re-advertised
    /// during the resync window; the adjacency stays up).
    pub fn withdraw_stale_prefixes(&mut self, neighbor_id: NeighborId, stale: &[Ipv4Prefix]) {
        for &prefix in stale {
            let Some(entry) = self.topology.lookup_mut(prefix) else { continue };
            let action = dual::poison(entry, neighbor_id, self.config.variance);
            self.record_dual_action(prefix, action);
            if let Some(entry) = self.topology.lookup_mut(prefix) {
                entry.entries.retain(|e| e.neighbor_id != neighbor_id);
            }
        }
    }

    /// Translates a `DualAction` into the deferred work the scheduler must carry out: a FIB
    /// install/withdraw, an outbound Query to every neighbor, and/or a Reply to every neighbor
    /// that queried this prefix while it was ACTIVE.
    fn record_dual_action(&mut self, prefix: Ipv4Prefix, action: DualAction) {
        if action.notify_route_sink {
            if let Some(entry) = self.topology.lookup(prefix) {
                match entry.successor() {
                    Some(successor) if !metric::is_infinite(entry.fd) => {
                        let next_hop = self.neighbors.get(&successor.neighbor_id).map(|slot| slot.record.address).unwrap_or(Ipv4Addr::UNSPECIFIED);
                        self.pending_fib_actions.push(FibAction::Install(FibRoute { prefix, next_hop, metric: entry.fd }));
                    }
                    _ => self.pending_fib_actions.push(FibAction::Withdraw(prefix)),
                }
            }
        }

        if action.query_all_neighbors {
            self.pending_dual_actions.push(DualPacketAction::QueryAllNeighbors { prefix });
        }

        if action.send_reply_to_origin {
            if let Some(entry) = self.topology.lookup_mut(prefix) {
                let queriers: Vec<NeighborId> = entry.queriers.drain().collect();
                if !queriers.is_empty() {
                    self.pending_dual_actions.push(DualPacketAction::ReplyToQueriers { prefix, queriers });
                }
            }
        }
    }

    /// Drains the deferred FIB queue; the scheduler calls this with an async runtime handle since
    /// `RouteSink::install`/`withdraw` are async (§6).
    pub fn take_pending_fib_actions(&mut self) -> Vec<FibAction> {
        std::mem::take(&mut self.pending_fib_actions)
    }

    /// Drains the deferred Query/Reply queue; the scheduler builds and enqueues the actual packets
    /// since only it holds the transport-layer sequence counter and retransmit queues.
    pub fn take_pending_dual_actions(&mut self) -> Vec<DualPacketAction> {
        std::mem::take(&mut self.pending_dual_actions)
    }

    /// Checks the quantified invariants §8 lists, aborting the process on violation (§7
    /// "Fatal: invariant violation I1-I6").
    pub fn check_invariants(&self) -> Result<(), FatalError> {
        for entry in self.topology.iter() {
            if let Some(successor) = entry.successor() {
                let min_dist = entry.entries.iter().map(|e| e.local_distance).min().unwrap_or(METRIC_INFINITE);
                if successor.local_distance != min_dist {
                    return Err(FatalError::SuccessorNotMinimal { prefix: entry.prefix });
                }
            }
            if !entry.is_active() {
                if let Some(successor) = entry.successor() {
                    if entry.fd != successor.local_distance {
                        return Err(FatalError::PassiveFdMismatch { prefix: entry.prefix });
                    }
                }
            } else if entry.reply_status.is_empty() {
                return Err(FatalError::ActiveWithNoPendingReplies { prefix: entry.prefix });
            }
        }
        for slot in self.neighbors.values() {
            if slot.record.state != NeighborState::Down && !self.interfaces.contains_key(&slot.record.interface_id) {
                return Err(FatalError::NeighborNotIndexed { src: slot.record.address });
            }
        }
        Ok(())
    }
}

/// Builds the `Ipv4InternalTlv` this process would advertise for a route whose distance vector
/// and hop count are already known: re-advertising a learned route toward a Query/Reply/Update
/// recipient reports this process's own local distance unmodified, not recombined again with the
/// outgoing interface's link metric.
pub fn route_tlv(prefix: Ipv4Prefix, vector: metric::LinkMetric, hop_count: u8) -> Ipv4InternalTlv {
    Ipv4InternalTlv {
        next_hop: None,
        metric: ReportedMetric { delay: vector.delay_10us, bandwidth: vector.bandwidth_kbps, mtu: [0; 3], hop_count, reliability: vector.reliability, load: vector.load, tag: 0, flags: 0 },
        prefix,
    }
}

/// Builds the `Ipv4InternalTlv` this process would advertise for a directly-connected / locally
/// originated prefix (§4.D local distance = reported distance for self-originated routes).
pub fn originate_tlv(prefix: Ipv4Prefix, link: metric::LinkMetric) -> Ipv4InternalTlv {
    route_tlv(prefix, link, 0)
}

/// The infinite-metric TLV a Query carries when this router has lost its own route and is asking
/// neighbors for one, and what a Reply carries back if DUAL still has no successor once every
/// reply is in.
pub fn infinite_route_tlv(prefix: Ipv4Prefix) -> Ipv4InternalTlv {
    Ipv4InternalTlv { next_hop: None, metric: ReportedMetric::infinite(), prefix }
}

/// Wall-clock seconds since the epoch, the time base `Keychain::active_send_key`/`accept_key`
/// evaluate a key's validity window against.
fn unix_now() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AuthConfig,
        DEFAULT_HELLO_INTERVAL,
        DEFAULT_HOLD_TIME,
    };
    use eigrp_route::null::{
        NullKeychainSource,
        NullRouteSink,
    };

    fn process() -> Process<NullRouteSink> {
        let config = ProcessConfig::new(Ipv4Addr::new(1, 1, 1, 1), 100).with_interface(crate::config::InterfaceConfig {
            name: "eth0".into(),
            ifindex: 2,
            address: Ipv4Addr::new(10, 0, 0, 1),
            prefix_len: 30,
            bandwidth_kbps: 100_000,
            delay_10us: 10,
            mtu: 1500,
            hello_interval: DEFAULT_HELLO_INTERVAL,
            hold_time: DEFAULT_HOLD_TIME,
            authentication: AuthConfig::None,
        });
        Process::new(config, NullRouteSink::new(), Arc::new(NullKeychainSource))
    }

    fn prefix() -> Ipv4Prefix {
        Ipv4Prefix::new(Ipv4Addr::new(10, 1, 0, 0), 24).unwrap()
    }

    fn tlv(delay: u32, bandwidth: u32) -> Ipv4InternalTlv {
        Ipv4InternalTlv { next_hop: None, metric: ReportedMetric { delay, bandwidth, mtu: [0; 3], hop_count: 1, reliability: 255, load: 1, tag: 0, flags: 0 }, prefix: prefix() }
    }

    #[test]
    fn admit_neighbor_rejects_address_outside_network() {
        let mut proc = process();
        assert!(proc.admit_neighbor(2, Ipv4Addr::new(192, 168, 1, 1)).is_none());
        assert!(proc.admit_neighbor(2, Ipv4Addr::new(10, 0, 0, 2)).is_some());
    }

    #[test]
    fn apply_neighbor_update_installs_a_route() {
        let mut proc = process();
        let neighbor = proc.admit_neighbor(2, Ipv4Addr::new(10, 0, 0, 2)).unwrap();
        proc.apply_neighbor_update(prefix(), neighbor, &tlv(10, 100_000)).unwrap();

        let actions = proc.take_pending_fib_actions();
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], FibAction::Install(_)));
    }

    #[test]
    fn withdraw_neighbor_clears_its_prefixes() {
        let mut proc = process();
        let neighbor = proc.admit_neighbor(2, Ipv4Addr::new(10, 0, 0, 2)).unwrap();
        proc.apply_neighbor_update(prefix(), neighbor, &tlv(10, 100_000)).unwrap();
        proc.take_pending_fib_actions();

        proc.withdraw_neighbor(neighbor);
        let entry = proc.topology.lookup(prefix()).unwrap();
        assert!(entry.entry(neighbor).is_none());
    }

    #[test]
    fn invariants_hold_on_a_fresh_process() {
        let proc = process();
        assert!(proc.check_invariants().is_ok());
    }

    #[test]
    fn query_with_no_feasible_successor_queues_a_query_to_all_neighbors() {
        let mut proc = process();
        let successor = proc.admit_neighbor(2, Ipv4Addr::new(10, 0, 0, 2)).unwrap();
        proc.apply_neighbor_update(prefix(), successor, &tlv(10, 100_000)).unwrap();
        proc.take_pending_fib_actions();

        let querier = proc.admit_neighbor(2, Ipv4Addr::new(10, 0, 0, 3)).unwrap();
        proc.apply_query(prefix(), querier, &Ipv4InternalTlv { next_hop: None, metric: ReportedMetric::infinite(), prefix: prefix() }).unwrap();

        let actions = proc.take_pending_dual_actions();
        assert!(actions.iter().any(|a| matches!(a, DualPacketAction::QueryAllNeighbors { prefix: p } if *p == prefix())));
    }

    #[test]
    fn active_prefix_replies_to_every_neighbor_that_queried_it() {
        let mut proc = process();
        let successor = proc.admit_neighbor(2, Ipv4Addr::new(10, 0, 0, 2)).unwrap();
        let other = proc.admit_neighbor(2, Ipv4Addr::new(10, 0, 0, 3)).unwrap();
        proc.apply_neighbor_update(prefix(), successor, &tlv(10, 100_000)).unwrap();
        proc.apply_neighbor_update(prefix(), other, &tlv(1000, 1_000)).unwrap();
        proc.take_pending_fib_actions();

        let querier = proc.admit_neighbor(2, Ipv4Addr::new(10, 0, 0, 4)).unwrap();
        let infinite = Ipv4InternalTlv { next_hop: None, metric: ReportedMetric::infinite(), prefix: prefix() };
        proc.apply_query(prefix(), querier, &infinite).unwrap();
        proc.take_pending_dual_actions();

        // The successor withdraws; `other`'s reported distance isn't feasible against the old FD,
        // so the prefix goes ACTIVE with `other` as the only entry left to reply.
        proc.apply_neighbor_update(prefix(), successor, &infinite).unwrap();
        proc.take_pending_dual_actions();

        proc.apply_reply(prefix(), other);
        let actions = proc.take_pending_dual_actions();
        assert!(actions.iter().any(|a| matches!(a, DualPacketAction::ReplyToQueriers { queriers, .. } if queriers == &[querier])));
    }
}
