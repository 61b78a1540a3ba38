//! The DUAL (Diffusing Update Algorithm) state machine (§4.E), implemented as an explicit
//! transition table over `(state, event)` per §9's design note, rather than as nested
//! conditionals scattered through the update-handling code.

use crate::topology::{
    NeighborEntryFlags,
    NeighborId,
    PendingFlags,
    PrefixEntry,
};

/// The five DUAL states (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DualState {
    Passive,
    Active0,
    Active1,
    Active2,
    Active3,
}

/// The events that drive a prefix's DUAL state (§4.E / §9: "the 7 FSM events"). `Input*`
/// events fire when a neighbor-entry's metric changes or is withdrawn; `AllRepliesReceived` fires
/// when the reply-status bitmap empties while ACTIVE; `ReplyReceived`/`QueryReceived` update
/// bookkeeping without necessarily changing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DualEvent {
    InputFeasibleSuccessorRetained,
    SuccessorDistanceIncreasedWithFs,
    LossOfFsFromSuccessorInput,
    LossOfFsFromNonSuccessorInput,
    NoFeasibleSuccessor,
    ReplyReceived,
    AllRepliesReceived,
}

/// What the caller must do in response to a transition: which neighbors to query (empty for a
/// same-state no-op), and whether to send a Reply back to whichever neighbor made us ACTIVE.
#[derive(Debug, Clone, Default)]
pub struct DualAction {
    pub query_all_neighbors: bool,
    pub send_reply_to_origin: bool,
    pub notify_route_sink: bool,
}

/// The `(state, event) -> new_state` transition matrix (§9's design note: implement this as
/// data, not nested conditionals).
pub fn transition(state: DualState, event: DualEvent) -> (DualState, DualAction) {
    use DualEvent::*;
    use DualState::*;

    match (state, event) {
        (Passive, InputFeasibleSuccessorRetained) => (Passive, DualAction { notify_route_sink: true, ..Default::default() }),
        (Passive, SuccessorDistanceIncreasedWithFs) => (Passive, DualAction { notify_route_sink: true, ..Default::default() }),
        (Passive, LossOfFsFromSuccessorInput) => (Active2, DualAction { query_all_neighbors: true, ..Default::default() }),
        (Passive, LossOfFsFromNonSuccessorInput) => (Active3, DualAction { query_all_neighbors: true, ..Default::default() }),
        (Passive, NoFeasibleSuccessor) => (Active0, DualAction { query_all_neighbors: true, ..Default::default() }),

        (Active0 | Active1 | Active2 | Active3, ReplyReceived) => (state, DualAction::default()),

        (Active0 | Active1 | Active2 | Active3, AllRepliesReceived) => {
            (Passive, DualAction { send_reply_to_origin: true, notify_route_sink: true, ..Default::default() })
        }

        // Further input while already ACTIVE does not change state; the new metric is recorded
        // in the topology table but DUAL only re-evaluates once all replies are in.
        (active, _) => (active, DualAction::default()),
    }
}

/// Which neighbor-entry changed and whether it was the prefix's successor, determined by the
/// caller *before* it mutated the entry (withdrawal removes the entry entirely, so this can't be
/// recovered afterward). `Local` models a directly-connected/redistributed route appearing or
/// disappearing with no originating neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeTrigger {
    Local,
    FromSuccessor(NeighborId),
    FromNonSuccessor(NeighborId),
}

/// Re-evaluates a prefix entry after a neighbor-entry's metric changed (§4.E "Key rules").
/// Recomputes the successor, classifies the resulting event, drives the transition table, and
/// updates `entry.fd`/`entry.state` in place. Returns the action the caller (the packet/transport
/// layer) must carry out.
pub fn on_metric_change(entry: &mut PrefixEntry, variance: u32, trigger: ChangeTrigger) -> DualAction {
    entry.recompute_successor(variance);

    let min_dist = entry.entries.iter().map(|e| e.local_distance).min();

    let event = match min_dist {
        None => DualEvent::NoFeasibleSuccessor,
        Some(min_dist) => {
            let has_feasible_successor = entry.feasible_successors().next().is_some();
            if has_feasible_successor {
                // §8 scenario 4: switching to a feasible successor updates FD to its
                // distance even when that distance is higher than the old one.
                let event = if min_dist > entry.fd { DualEvent::SuccessorDistanceIncreasedWithFs } else { DualEvent::InputFeasibleSuccessorRetained };
                entry.fd = min_dist;
                event
            } else {
                match trigger {
                    ChangeTrigger::Local => DualEvent::NoFeasibleSuccessor,
                    ChangeTrigger::FromSuccessor(_) => DualEvent::LossOfFsFromSuccessorInput,
                    ChangeTrigger::FromNonSuccessor(_) => DualEvent::LossOfFsFromNonSuccessorInput,
                }
            }
        }
    };

    let (new_state, action) = transition(entry.state, event);
    if matches!(new_state, DualState::Active0 | DualState::Active1 | DualState::Active2 | DualState::Active3) && !entry.is_active() {
        entry.reply_status = entry.entries.iter().map(|e| e.neighbor_id).collect();
    }
    entry.state = new_state;
    action
}

/// Records a Reply from `neighbor_id` while a prefix is ACTIVE (§4.E: "record Replies in the
/// reply-status bitmap"). When the bitmap empties, recomputes FD/successor from the current
/// entries and returns the action to transition back to PASSIVE.
pub fn on_reply_received(entry: &mut PrefixEntry, neighbor_id: NeighborId, variance: u32) -> DualAction {
    entry.reply_status.remove(&neighbor_id);
    entry.sia_status.remove(&neighbor_id);

    if entry.reply_status.is_empty() {
        entry.recompute_successor(variance);
        entry.fd = entry.entries.iter().map(|e| e.local_distance).min().unwrap_or(crate::metric::METRIC_INFINITE);
        let (new_state, action) = transition(entry.state, DualEvent::AllRepliesReceived);
        entry.state = new_state;
        entry.pending.insert(PendingFlags::NEEDS_UPDATE);
        action
    } else {
        let (new_state, action) = transition(entry.state, DualEvent::ReplyReceived);
        entry.state = new_state;
        action
    }
}

/// Whether `entry`, entered ACTIVE `elapsed` ago, is due an SIA-Query (§4.E: "half the
/// active-time limit") or should be declared stuck (§4.E / §7 `SIAStuck`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiaStatus {
    Healthy,
    DueForProbe,
    Stuck,
}

pub fn sia_status(elapsed: std::time::Duration, active_time: std::time::Duration) -> SiaStatus {
    if elapsed >= active_time {
        SiaStatus::Stuck
    } else if elapsed >= active_time / 2 {
        SiaStatus::DueForProbe
    } else {
        SiaStatus::Healthy
    }
}

/// Clears SUCCESSOR/FEASIBLE_SUCCESSOR bookkeeping and poisons a prefix by driving its metric to
/// infinite (§4.E filtering rule: "synthesize an infinite-metric Update (poison)"), used both
/// for outbound-filter denial and for graceful-restart stale-route cleanup.
pub fn poison(entry: &mut PrefixEntry, neighbor_id: NeighborId, variance: u32) -> DualAction {
    let was_successor = entry.entry(neighbor_id).is_some_and(|e| e.flags.contains(NeighborEntryFlags::SUCCESSOR));
    if let Some(neighbor_entry) = entry.entry_mut(neighbor_id) {
        neighbor_entry.reported_distance = crate::metric::METRIC_INFINITE;
        neighbor_entry.local_distance = crate::metric::METRIC_INFINITE;
    }
    let trigger = if was_successor { ChangeTrigger::FromSuccessor(neighbor_id) } else { ChangeTrigger::FromNonSuccessor(neighbor_id) };
    on_metric_change(entry, variance, trigger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{
        NeighborEntry,
        TopologyTable,
    };
    use eigrp_common::Ipv4Prefix;
    use std::net::Ipv4Addr;

    fn prefix() -> Ipv4Prefix {
        Ipv4Prefix::new(Ipv4Addr::new(10, 0, 0, 0), 24).unwrap()
    }

    fn neighbor_entry(id: NeighborId, reported: u32, local: u32) -> NeighborEntry {
        NeighborEntry {
            neighbor_id: id,
            interface_id: 0,
            reported_distance: reported,
            local_distance: local,
            vector: crate::metric::LinkMetric::default(),
            hop_count: 0,
            flags: NeighborEntryFlags::empty(),
        }
    }

    #[test]
    fn feasible_successor_swap_stays_passive() {
        let mut table = TopologyTable::new();
        let entry = table.insert(prefix());
        entry.entries.push(neighbor_entry(2, 90, 100));
        entry.entries.push(neighbor_entry(3, 50, 150));
        entry.fd = 100;
        entry.state = DualState::Passive;
        on_metric_change(entry, 1, ChangeTrigger::Local);
        assert_eq!(entry.state, DualState::Passive);

        // R2 withdraws, leaving R3 which is feasible (RD 50 < FD 100).
        entry.entries.retain(|e| e.neighbor_id != 2);
        let action = on_metric_change(entry, 1, ChangeTrigger::FromSuccessor(2));
        assert_eq!(entry.state, DualState::Passive);
        assert!(action.notify_route_sink);
        assert_eq!(entry.fd, 150);
        assert_eq!(entry.successor().unwrap().neighbor_id, 3);
    }

    #[test]
    fn loss_of_feasible_successor_goes_active() {
        let mut table = TopologyTable::new();
        let entry = table.insert(prefix());
        entry.entries.push(neighbor_entry(2, 90, 100));
        entry.entries.push(neighbor_entry(3, 120, 150));
        entry.fd = 100;
        on_metric_change(entry, 1, ChangeTrigger::Local);
        assert_eq!(entry.state, DualState::Passive);

        entry.entries.retain(|e| e.neighbor_id != 2);
        let action = on_metric_change(entry, 1, ChangeTrigger::FromSuccessor(2));
        assert!(matches!(entry.state, DualState::Active2 | DualState::Active3));
        assert!(action.query_all_neighbors);
        assert_eq!(entry.reply_status.len(), 1);
    }

    #[test]
    fn all_replies_received_returns_to_passive() {
        let mut table = TopologyTable::new();
        let entry = table.insert(prefix());
        entry.entries.push(neighbor_entry(3, 120, 150));
        entry.state = DualState::Active2;
        entry.reply_status.insert(3);

        let action = on_reply_received(entry, 3, 1);
        assert_eq!(entry.state, DualState::Passive);
        assert!(action.send_reply_to_origin);
        assert_eq!(entry.fd, 150);
    }

    #[test]
    fn sia_watchdog_fires_at_half_active_time() {
        use std::time::Duration;
        let active_time = Duration::from_secs(180);
        assert_eq!(sia_status(Duration::from_secs(89), active_time), SiaStatus::Healthy);
        assert_eq!(sia_status(Duration::from_secs(90), active_time), SiaStatus::DueForProbe);
        assert_eq!(sia_status(Duration::from_secs(180), active_time), SiaStatus::Stuck);
    }
}
