//! Reliable transport (§4.B): a per-neighbor retransmission FIFO, the retransmit timer
//! contract, and ACK reconciliation.
//!
//! §9's design note retires the separate multicast FIFO: a reliable multicast Update is
//! modeled by cloning the packet into *every* neighbor's own `retrans` FIFO at send time, so each
//! peer's unacknowledged copy retransmits via unicast independently, rather than draining one
//! shared multicast FIFO peer-by-peer. Each neighbor's `RetransQueue` (see `NeighborSlot` in
//! `neighbor.rs`) is that per-peer FIFO; there is no separate aggregate owning all of them (see
//! DESIGN.md).

use crate::config::{
    EIGRP_PACKET_RETRANS_MAX,
    EIGRP_PACKET_RETRANS_TIME,
};
use eigrp_packet::message::EigrpPacket;
use std::{
    collections::VecDeque,
    time::Duration,
};

/// An outbound packet plus the bookkeeping needed to retransmit it (§4.B).
#[derive(Debug, Clone)]
pub struct PacketBuffer {
    pub packet: EigrpPacket,
    pub retransmit_count: u32,
}

impl PacketBuffer {
    pub fn new(packet: EigrpPacket) -> Self {
        Self { packet, retransmit_count: 0 }
    }
}

/// What the caller must do after a transport event fires.
#[derive(Debug, Clone, Default)]
pub struct TransportAction {
    /// A duplicate of the FIFO's new tail packet to push onto the interface's outbound queue.
    pub retransmit: Option<EigrpPacket>,
    /// Whether the neighbor's retransmit budget was exhausted (§7 `RetransmitExhausted`).
    pub exhausted: bool,
    /// Whether the popped packet was the INIT-Update (PENDING→UP, §4.C).
    pub was_init_update: bool,
}

/// Per-neighbor reliable-delivery queue. Owned by the neighbor record; the AS instance's event
/// loop is the only mutator (§4.C "shared resource policy").
#[derive(Debug, Default)]
pub struct RetransQueue {
    fifo: VecDeque<PacketBuffer>,
}

impl RetransQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fifo.len()
    }

    /// The packet currently on the wire awaiting an ACK: always the oldest enqueued, never the
    /// most recently enqueued (that's what distinguishes this from a plain stack).
    pub fn head(&self) -> Option<&PacketBuffer> {
        self.fifo.front()
    }

    /// Step 1 of the send contract: enqueues `packet` at the back; if it becomes the new head
    /// (the FIFO was previously empty), the caller must duplicate it onto the interface's
    /// outbound queue and arm the retransmit timer. A packet enqueued behind an already-in-flight
    /// head waits there untransmitted until the head is acknowledged.
    pub fn enqueue(&mut self, packet: EigrpPacket) -> bool {
        let becomes_head = self.fifo.is_empty();
        self.fifo.push_back(PacketBuffer::new(packet));
        becomes_head
    }

    /// ACK handling (§4.B): if `ack` matches the head packet's sequence — the only packet ever
    /// actually on the wire — pops it and, if more packets remain, returns the new head for
    /// immediate transmission.
    pub fn acknowledge(&mut self, ack: u32, init_update_sequence: Option<u32>) -> TransportAction {
        let Some(head) = self.fifo.front() else {
            return TransportAction::default();
        };
        if head.packet.header.sequence != ack {
            return TransportAction::default();
        }

        let popped = self.fifo.pop_front().expect("checked above");
        let was_init_update = init_update_sequence == Some(popped.packet.header.sequence);

        TransportAction {
            retransmit: self.fifo.front().map(|buffer| buffer.packet.clone()),
            exhausted: false,
            was_init_update,
        }
    }

    /// Retransmit-timer fire (§4.B): duplicates the head, bumps its counter, and reports
    /// exhaustion once the counter reaches [`EIGRP_PACKET_RETRANS_MAX`].
    pub fn on_retransmit_timer(&mut self) -> TransportAction {
        let Some(buffer) = self.fifo.front_mut() else {
            return TransportAction::default();
        };
        buffer.retransmit_count += 1;
        if buffer.retransmit_count >= EIGRP_PACKET_RETRANS_MAX {
            return TransportAction { exhausted: true, ..Default::default() };
        }
        TransportAction { retransmit: Some(buffer.packet.clone()), ..Default::default() }
    }

    pub fn retransmit_interval(&self) -> Duration {
        EIGRP_PACKET_RETRANS_TIME
    }
}

/// The AS-wide sequence-number counter (§4.B step 3 / §8 "sequence-number wraparound"). Zero
/// is reserved to mean "no ACK", so the counter skips it on wraparound.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceCounter(u32);

impl SequenceCounter {
    /// Increments exactly once per new (not retransmitted) packet, returning the new value.
    pub fn next(&mut self) -> u32 {
        self.0 = match self.0.checked_add(1) {
            Some(0) | None => 1,
            Some(next) => next,
        };
        self.0
    }

    pub fn current(&self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eigrp_packet::header::{
        EigrpHeader,
        HeaderFlags,
        Opcode,
    };

    fn packet(sequence: u32) -> EigrpPacket {
        EigrpPacket {
            header: EigrpHeader {
                version: 2,
                opcode: Opcode::Update,
                checksum: 0,
                flags: HeaderFlags::empty(),
                sequence,
                ack: 0,
                virtual_router_id: 0,
                as_number: 100,
            },
            tlvs: Vec::new(),
        }
    }

    #[test]
    fn enqueue_reports_when_it_becomes_the_new_head() {
        let mut queue = RetransQueue::new();
        assert!(queue.enqueue(packet(1)));
        assert!(!queue.enqueue(packet(2)));
    }

    #[test]
    fn matching_ack_pops_and_surfaces_next_head() {
        let mut queue = RetransQueue::new();
        queue.enqueue(packet(1));
        queue.enqueue(packet(2));

        let action = queue.acknowledge(1, None);
        assert_eq!(queue.len(), 1);
        assert_eq!(action.retransmit.unwrap().header.sequence, 2);
    }

    #[test]
    fn second_enqueue_while_first_in_flight_does_not_steal_the_match_point() {
        let mut queue = RetransQueue::new();
        assert!(queue.enqueue(packet(1)));
        assert!(!queue.enqueue(packet(2)));
        // The head is still seq 1 — the ack for the in-flight packet must still match.
        let action = queue.acknowledge(1, None);
        assert_eq!(action.retransmit.unwrap().header.sequence, 2);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn mismatched_ack_is_ignored() {
        let mut queue = RetransQueue::new();
        queue.enqueue(packet(5));
        let action = queue.acknowledge(99, None);
        assert_eq!(queue.len(), 1);
        assert!(action.retransmit.is_none());
    }

    #[test]
    fn init_update_ack_is_flagged() {
        let mut queue = RetransQueue::new();
        queue.enqueue(packet(1));
        let action = queue.acknowledge(1, Some(1));
        assert!(action.was_init_update);
    }

    #[test]
    fn exhausts_after_max_retransmits() {
        let mut queue = RetransQueue::new();
        queue.enqueue(packet(1));
        for _ in 0..EIGRP_PACKET_RETRANS_MAX - 1 {
            let action = queue.on_retransmit_timer();
            assert!(!action.exhausted);
        }
        let action = queue.on_retransmit_timer();
        assert!(action.exhausted);
    }

    #[test]
    fn sequence_counter_skips_zero_on_wraparound() {
        let mut counter = SequenceCounter(u32::MAX);
        assert_eq!(counter.next(), 1);
    }

    #[test]
    fn reliable_multicast_clones_into_every_neighbor_queue() {
        let mut queues: std::collections::HashMap<u32, RetransQueue> = std::collections::HashMap::new();
        for id in [1, 2, 3] {
            queues.entry(id).or_default().enqueue(packet(7));
        }
        assert_eq!(queues.get(&2).unwrap().head().unwrap().packet.header.sequence, 7);
    }
}
