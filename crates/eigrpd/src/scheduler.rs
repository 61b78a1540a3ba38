//! The event loop (§4.G / §5): a single `mio::Poll` over the raw EIGRP socket plus periodic
//! timer sweeps for Hello, holddown, retransmit, and SIA watchdogs. Grounded on the donor's
//! `mio::Poll`/`Events`/`Token`/`Interest` server loop (`ocatvius-daemon/src/bgp/mod.rs`), adapted
//! from an async TCP accept loop to a synchronous raw-socket loop: §5 requires a single
//! cooperative thread with no suspension points inside packet-handling callbacks, so unlike the
//! donor this loop never `.await`s mid-tick — deferred FIB calls are drained on a throwaway tokio
//! runtime only between ticks.

use crate::{
    config::AuthConfig,
    error::EigrpError,
    neighbor::NeighborState,
    process::{
        DualPacketAction,
        FibAction,
        Process,
    },
    topology::NeighborId,
    transport::RetransQueue,
};
use eigrp_packet::{
    auth::{
        AuthAlgorithm,
        DigestMode,
    },
    message::EigrpPacket,
    tlv::{
        ParametersTlv,
        Tlv,
    },
    EigrpElement,
    Opcode,
};
use eigrp_route::RouteSink;
use log::{
    debug,
    error,
    info,
    warn,
};
use mio::{
    unix::SourceFd,
    Events,
    Interest,
    Poll,
    Token,
};
use socket2::{
    Domain,
    Protocol,
    Socket,
    Type,
};
use std::{
    collections::HashMap,
    io,
    net::Ipv4Addr,
    os::fd::AsRawFd,
    time::{
        Duration,
        Instant,
    },
};

const EIGRP_IP_PROTOCOL: i32 = 88;
const SOCKET_TOKEN: Token = Token(0);
const TICK: Duration = Duration::from_millis(250);

pub fn open_raw_socket() -> io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::from(EIGRP_IP_PROTOCOL)))?;
    socket.set_nonblocking(true)?;
    socket.set_header_included(true)?;
    Ok(socket)
}

/// Builds the 20-byte IPv4 header `IP_HDRINCL` requires the caller to supply (§4.G: the
/// codec crate stays "no I/O, no sockets", so this framing lives here instead). TTL 1: EIGRP
/// packets never cross a router hop.
fn build_ip_header(src: Ipv4Addr, dst: Ipv4Addr, payload_len: usize) -> [u8; 20] {
    let mut header = [0u8; 20];
    header[0] = 0x45;
    header[1] = 0xC0;
    header[2..4].copy_from_slice(&((20 + payload_len) as u16).to_be_bytes());
    header[8] = 1;
    header[9] = EIGRP_IP_PROTOCOL as u8;
    header[12..16].copy_from_slice(&src.octets());
    header[16..20].copy_from_slice(&dst.octets());
    let checksum = eigrp_packet::checksum::internet_checksum(&header);
    header[10..12].copy_from_slice(&checksum.to_be_bytes());
    header
}

/// Per-neighbor retransmit-timer deadlines, kept outside `NeighborRecord` since the deadline is a
/// scheduling concern, not protocol state.
#[derive(Debug, Default)]
struct Timers {
    retransmit_due: HashMap<u32, Instant>,
    holddown_due: HashMap<u32, Instant>,
    active_since: HashMap<(std::net::Ipv4Addr, u8), Instant>,
    hello_due: HashMap<u32, Instant>,
}

pub struct Scheduler<S: RouteSink> {
    process: Process<S>,
    socket: Socket,
    poll: Poll,
    timers: Timers,
    async_runtime: tokio::runtime::Runtime,
}

impl<S: RouteSink> Scheduler<S> {
    /// `async_runtime` is driven by this scheduler's own `block_on` calls between ticks (§5:
    /// no suspension points inside packet-handling callbacks) — callers that already entered it to
    /// construct an async `RouteSink` (e.g. `NetlinkRouteSink::new`) should hand that same runtime
    /// in here rather than build a second one, since a connection-driver task spawned on it needs
    /// to keep being polled to make progress.
    pub fn new(process: Process<S>, async_runtime: tokio::runtime::Runtime) -> io::Result<Self> {
        let socket = open_raw_socket()?;
        let poll = Poll::new()?;
        poll.registry().register(&mut SourceFd(&socket.as_raw_fd()), SOCKET_TOKEN, Interest::READABLE)?;
        Ok(Self { process, socket, poll, timers: Timers::default(), async_runtime })
    }

    /// Runs until `should_stop` returns true; split out of `run` purely for testability.
    pub fn run_until(&mut self, mut should_stop: impl FnMut() -> bool) -> io::Result<()> {
        let mut events = Events::with_capacity(128);
        while !should_stop() {
            self.poll.poll(&mut events, Some(TICK))?;
            for event in events.iter() {
                if event.token() == SOCKET_TOKEN {
                    self.drain_socket();
                }
            }
            self.sweep_timers();
            self.drain_dual_actions();
            self.drain_outbound();
            self.drain_fib_actions();
        }
        Ok(())
    }

    fn drain_socket(&mut self) {
        use std::io::Read;
        let mut buffer = [0u8; 1500];
        loop {
            match self.socket.read(&mut buffer) {
                Ok(0) => break,
                Ok(len) => self.handle_datagram(&buffer[..len]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("raw socket read error: {e}");
                    break;
                }
            }
        }
    }

    /// §6: "incoming packets have IP header stripped only after validation and length
    /// reconciliation against `ip_len`." `ihl` reads the IHL nibble of the first byte; bytes
    /// 12..16 of a (non-optioned or optioned, IHL handles both) IPv4 header are the source
    /// address, which is how a neighbor is identified on a shared raw socket. The interface is
    /// resolved before parsing so authentication (§4.A) can be checked against the right
    /// interface's keychain before any handler sees the packet.
    fn handle_datagram(&mut self, datagram: &[u8]) {
        let Some(&version_ihl) = datagram.first() else { return };
        let ihl = ((version_ihl & 0x0F) as usize) * 4;
        if ihl < 20 || datagram.len() < ihl + eigrp_packet::header::HEADER_LEN {
            warn!("malformed packet: shorter than IP header + EIGRP header");
            return;
        }
        let src = Ipv4Addr::new(datagram[12], datagram[13], datagram[14], datagram[15]);
        let body = &datagram[ihl..];

        let Some(interface_id) = self.process.interfaces.iter().find(|(_, iface)| iface.contains(src)).map(|(id, _)| *id) else {
            warn!("packet from {src} matches no configured interface, dropping");
            return;
        };

        match self.authenticate_for_receive(interface_id, src, body) {
            Ok(packet) => self.handle_packet(interface_id, src, packet),
            Err(e) => warn!("{e}"),
        }
    }

    /// Verifies a received packet's checksum and, on an interface with authentication configured,
    /// its AUTH TLV digest and replay sequence (§4.A), before any handler sees it. A preliminary
    /// unauthenticated parse is needed to read the claimed `key_id` out of the AUTH TLV, since
    /// which key to check the digest against depends on what the packet itself says.
    fn authenticate_for_receive(&mut self, interface_id: u32, src: Ipv4Addr, body: &[u8]) -> Result<EigrpPacket, EigrpError> {
        let Some(iface) = self.process.interfaces.get(&interface_id) else {
            return Err(EigrpError::MalformedPacket { src, reason: "interface vanished mid-receive".into() });
        };

        let key = match &iface.config.authentication {
            AuthConfig::None => None,
            AuthConfig::Md5 { keychain } | AuthConfig::Sha256 { keychain } => {
                let (_, peek) = EigrpPacket::unpack(body).map_err(|e| EigrpError::MalformedPacket { src, reason: e.to_string() })?;
                let key_id = peek
                    .auth_tlv()
                    .map(|auth| auth.key_id)
                    .ok_or_else(|| EigrpError::AuthFailure { src, reason: "no AUTH TLV on an authenticated interface".into() })?;
                let secret = self
                    .process
                    .resolve_accept_key(keychain, key_id)
                    .ok_or_else(|| EigrpError::AuthFailure { src, reason: format!("no active accept key for key id {key_id}") })?;
                Some(secret)
            }
        };

        let last_accepted = self.process.neighbors.values().find(|slot| slot.record.address == src).and_then(|slot| slot.record.last_accepted_key_sequence);

        let packet = EigrpPacket::verify_authenticated(body, key.as_deref(), last_accepted)
            .map_err(|e| EigrpError::AuthFailure { src, reason: format!("{e:?}") })?;

        if let Some(auth) = packet.auth_tlv() {
            if let Some(slot) = self.process.neighbors.values_mut().find(|slot| slot.record.address == src) {
                slot.record.last_accepted_key_sequence = Some(auth.key_sequence);
            }
        }

        Ok(packet)
    }

    /// Opcode dispatch (§4.C/§4.E/§9): Hello drives the neighbor FSM, Update/Query TLVs feed
    /// DUAL through `Process::apply_neighbor_update`/`apply_query`, Reply/SIA-Reply feed
    /// `Process::apply_reply`, the header's `ack` field (piggybacked on every opcode, not just a
    /// standalone ACK packet) reconciles the sender's retransmit FIFO, and every reliable opcode
    /// gets its own ack piggybacked back (§4.B: every Update/Query/Reply the peer sent reliably
    /// must be acked, whether or not it changed anything).
    fn handle_packet(&mut self, interface_id: u32, src: Ipv4Addr, packet: EigrpPacket) {
        let Some(neighbor_id) = self.process.admit_neighbor(interface_id, src) else {
            warn!("packet from {src} rejected: outside interface network");
            return;
        };

        match packet.header.opcode {
            Opcode::Hello => self.handle_hello(neighbor_id, src, &packet),
            Opcode::Update => self.handle_update(neighbor_id, src, &packet),
            Opcode::Query | Opcode::SiaQuery => self.handle_query(neighbor_id, src, &packet),
            Opcode::Reply | Opcode::SiaReply => self.handle_reply(neighbor_id, &packet),
            Opcode::Ack | Opcode::Request | Opcode::Probe | Opcode::Unknown(_) => {}
        }

        if packet.header.ack != 0 {
            self.handle_ack(src, packet.header.ack);
        }

        if Self::expects_ack(packet.header.opcode) && packet.header.sequence != 0 {
            self.send_ack(neighbor_id, packet.header.sequence);
        }
    }

    /// Which opcodes carry a sequence number that must be acked (§4.B); Hello is sent
    /// unreliably and an ACK for it would just be more traffic to ack in turn.
    fn expects_ack(opcode: Opcode) -> bool {
        matches!(opcode, Opcode::Update | Opcode::Query | Opcode::SiaQuery | Opcode::Reply | Opcode::SiaReply)
    }

    fn handle_hello(&mut self, neighbor_id: NeighborId, src: Ipv4Addr, packet: &EigrpPacket) {
        let peer_k = packet.tlvs.iter().find_map(|tlv| if let Tlv::Parameters(p) = tlv { Some(p.k_values) } else { None }).unwrap_or(self.process.config.k_values);

        let Some(slot) = self.process.neighbors.get_mut(&neighbor_id) else { return };
        let was_down = slot.record.state == NeighborState::Down;
        let result = if was_down {
            slot.record.on_first_hello(peer_k, self.process.config.k_values)
        } else {
            slot.record.on_hello(peer_k)
        };
        let established = result.is_ok();
        match result {
            Ok(()) => {
                self.timers.holddown_due.insert(neighbor_id, Instant::now() + slot.record.hold_time);
            }
            Err(mismatch) => {
                warn!("neighbor {src}: {mismatch}");
                self.timers.holddown_due.remove(&neighbor_id);
            }
        }

        if was_down && established {
            self.send_init_update(neighbor_id);
        }
    }

    /// Builds a reliably-delivered packet: assigns a fresh sequence number, enqueues it on the
    /// neighbor's retransmit FIFO, and — if it becomes the new FIFO head — arms the retransmit
    /// timer and pushes it onto the wire (§4.B). Shared by the INIT/full-Update senders and by
    /// Query/Reply, which differ only in opcode, flags, and TLV payload.
    fn enqueue_reliable(&mut self, neighbor_id: NeighborId, opcode: Opcode, flags: eigrp_packet::HeaderFlags, tlvs: Vec<Tlv>) -> u32 {
        let sequence = self.process.sequence.next();
        let packet = EigrpPacket::new(
            eigrp_packet::header::EigrpHeader {
                version: eigrp_packet::header::EIGRP_VERSION,
                opcode,
                checksum: 0,
                flags,
                sequence,
                ack: 0,
                virtual_router_id: 0,
                as_number: self.process.config.as_number,
            },
            tlvs,
        );
        let Some(slot) = self.process.neighbors.get_mut(&neighbor_id) else { return sequence };
        let becomes_head = slot.retrans.enqueue(packet.clone());
        if becomes_head {
            self.timers.retransmit_due.insert(neighbor_id, Instant::now() + slot.retrans.retransmit_interval());
            self.enqueue_outbound(neighbor_id, packet);
        }
        sequence
    }

    /// The INIT-flagged Update that opens the handshake (§4.C PENDING): carries no route TLVs,
    /// just the flag, mirroring the donor's own empty INIT-Update. The neighbor's full route set
    /// follows once this is acknowledged, from `handle_ack`.
    fn send_init_update(&mut self, neighbor_id: u32) {
        let sequence = self.enqueue_reliable(neighbor_id, Opcode::Update, eigrp_packet::HeaderFlags::INIT, Vec::new());
        if let Some(slot) = self.process.neighbors.get_mut(&neighbor_id) {
            slot.record.init_update_sequence = Some(sequence);
        }
    }

    /// The neighbor's own locally-originated routes, sent as a regular (non-INIT) Update once the
    /// INIT-Update is acknowledged (§4.C PENDING→UP, §4.D "local distance = reported distance for
    /// self-originated routes").
    fn send_full_update(&mut self, neighbor_id: u32) {
        let Some(slot) = self.process.neighbors.get(&neighbor_id) else { return };
        let interface_id = slot.record.interface_id;
        let Some(iface) = self.process.interfaces.get(&interface_id) else { return };
        let own_prefix = eigrp_common::Ipv4Prefix::new(iface.config.address, iface.config.prefix_len).ok();
        let link_metric = iface.link_metric();

        let tlvs = own_prefix
            .filter(|prefix| iface.permit_outbound(*prefix))
            .map(|prefix| Tlv::Ipv4Internal(crate::process::originate_tlv(prefix, link_metric)))
            .into_iter()
            .collect();

        self.enqueue_reliable(neighbor_id, Opcode::Update, eigrp_packet::HeaderFlags::empty(), tlvs);
    }

    fn handle_update(&mut self, neighbor_id: NeighborId, src: Ipv4Addr, packet: &EigrpPacket) {
        // §4.C / §8 scenario 6 variant: a peer that was already UP re-sending INIT means it
        // restarted and forgot the adjacency. Reset to PENDING and re-open the handshake rather
        // than folding its (now stale) retransmit FIFO and sequence state into the old one.
        if packet.header.flags.contains(eigrp_packet::HeaderFlags::INIT) {
            let was_up = self.process.neighbors.get(&neighbor_id).is_some_and(|slot| slot.record.state == NeighborState::Up);
            if was_up {
                info!("neighbor {src} sent INIT while UP, peer restarted: resetting adjacency");
                if let Some(slot) = self.process.neighbors.get_mut(&neighbor_id) {
                    slot.record.state = NeighborState::Pending;
                    slot.retrans = RetransQueue::new();
                }
                self.timers.retransmit_due.remove(&neighbor_id);
                self.send_init_update(neighbor_id);
            }
        }

        if packet.header.flags.contains(eigrp_packet::HeaderFlags::RS) {
            if let Some(slot) = self.process.neighbors.get_mut(&neighbor_id) {
                let known = self.process.topology.prefixes_from(neighbor_id);
                slot.record.begin_restart_resync(&known);
            }
        }

        for tlv in &packet.tlvs {
            if let Tlv::Ipv4Internal(route) = tlv {
                if let Some(slot) = self.process.neighbors.get_mut(&neighbor_id) {
                    slot.record.mark_resync_prefix_seen(route.prefix);
                }
                if let Err(e) = self.process.apply_neighbor_update(route.prefix, neighbor_id, route) {
                    warn!("update from {src}: {e}");
                }
            }
        }

        if packet.header.flags.contains(eigrp_packet::HeaderFlags::EOT) {
            let stale = self.process.neighbors.get_mut(&neighbor_id).map(|slot| slot.record.end_restart_resync()).unwrap_or_default();
            if !stale.is_empty() {
                debug!("neighbor {src} graceful-restart EOT: {} prefixes never re-advertised, poisoning", stale.len());
                self.process.withdraw_stale_prefixes(neighbor_id, &stale);
            }
        }
    }

    /// §4.E: a Query's TLVs report the same distance vector an Update's would, so they drive
    /// DUAL the same way on the receiving end; `Process::apply_query` additionally remembers
    /// `neighbor_id` as owed a Reply once the prefix next resolves, which `drain_dual_actions`
    /// acts on once DUAL says so.
    fn handle_query(&mut self, neighbor_id: NeighborId, src: Ipv4Addr, packet: &EigrpPacket) {
        for tlv in &packet.tlvs {
            if let Tlv::Ipv4Internal(route) = tlv {
                if let Err(e) = self.process.apply_query(route.prefix, neighbor_id, route) {
                    warn!("query from {src}: {e}");
                }
            }
        }
    }

    fn handle_reply(&mut self, neighbor_id: NeighborId, packet: &EigrpPacket) {
        for tlv in &packet.tlvs {
            if let Tlv::Ipv4Internal(route) = tlv {
                self.process.apply_reply(route.prefix, neighbor_id);
            }
        }
    }

    /// Reconciles `ack` against the neighbor's retransmit FIFO (§4.B), rearming the
    /// retransmit timer for whatever is now at the head, and completing the INIT handshake if the
    /// acknowledged packet was the INIT-Update (§4.C PENDING → UP).
    fn handle_ack(&mut self, src: Ipv4Addr, ack: u32) {
        let Some((&neighbor_id, slot)) = self.process.neighbors.iter_mut().find(|(_, slot)| slot.record.address == src) else { return };
        let action = slot.retrans.acknowledge(ack, slot.record.init_update_sequence);
        if action.was_init_update {
            slot.record.on_init_update_acked();
        }
        match action.retransmit {
            Some(packet) => {
                self.timers.retransmit_due.insert(neighbor_id, Instant::now() + slot.retrans.retransmit_interval());
                self.enqueue_outbound(neighbor_id, packet);
            }
            None => {
                self.timers.retransmit_due.remove(&neighbor_id);
            }
        }
        if action.was_init_update {
            self.send_full_update(neighbor_id);
        }
    }

    /// Acknowledges a received reliable packet by piggybacking `ack` on an otherwise-empty
    /// Update (§4.B): the ack itself doesn't need reliable delivery, so this bypasses
    /// `enqueue_reliable` and goes straight to the wire.
    fn send_ack(&mut self, neighbor_id: NeighborId, sequence: u32) {
        let packet = EigrpPacket::new(
            eigrp_packet::header::EigrpHeader {
                version: eigrp_packet::header::EIGRP_VERSION,
                opcode: Opcode::Update,
                checksum: 0,
                flags: eigrp_packet::HeaderFlags::empty(),
                sequence: 0,
                ack: sequence,
                virtual_router_id: 0,
                as_number: self.process.config.as_number,
            },
            Vec::new(),
        );
        self.enqueue_outbound(neighbor_id, packet);
    }

    fn sweep_timers(&mut self) {
        let now = Instant::now();
        let expired_holddowns: Vec<u32> =
            self.timers.holddown_due.iter().filter(|(_, due)| **due <= now).map(|(id, _)| *id).collect();
        for neighbor_id in expired_holddowns {
            self.timers.holddown_due.remove(&neighbor_id);
            if let Some(slot) = self.process.neighbors.get_mut(&neighbor_id) {
                if slot.record.state != NeighborState::Down {
                    info!("neighbor {} holddown expired", slot.record.address);
                    self.process.withdraw_neighbor(neighbor_id);
                }
            }
        }

        let expired_retransmits: Vec<u32> =
            self.timers.retransmit_due.iter().filter(|(_, due)| **due <= now).map(|(id, _)| *id).collect();
        for neighbor_id in expired_retransmits {
            let Some(slot) = self.process.neighbors.get_mut(&neighbor_id) else { continue };
            let action = slot.retrans.on_retransmit_timer();
            if action.exhausted {
                self.timers.retransmit_due.remove(&neighbor_id);
                let err = EigrpError::RetransmitExhausted { src: slot.record.address };
                error!("{err}");
                self.process.withdraw_neighbor(neighbor_id);
            } else if let Some(packet) = action.retransmit {
                self.timers.retransmit_due.insert(neighbor_id, now + slot.retrans.retransmit_interval());
                self.enqueue_outbound(neighbor_id, packet);
            }
        }

        self.sweep_sia_watchdog(now);
        self.sweep_hellos(now);
    }

    /// §4.E / §8 scenario: a prefix stuck ACTIVE past `active_time` is torn down the same way
    /// as retransmit exhaustion (§7 `SIAStuck`).
    fn sweep_sia_watchdog(&mut self, now: Instant) {
        let active_time = self.process.config.active_time;
        for entry in self.process.topology.active_prefixes() {
            self.timers.active_since.entry((entry.prefix.address, entry.prefix.prefix_len)).or_insert(now);
        }
        self.timers.active_since.retain(|key, _| self.process.topology.lookup(eigrp_common::Ipv4Prefix::new(key.0, key.1).expect("stored prefix was valid")).is_some_and(|entry| entry.is_active()));

        let stuck: Vec<_> = self
            .timers
            .active_since
            .iter()
            .filter(|(_, since)| matches!(crate::dual::sia_status(now.saturating_duration_since(**since), active_time), crate::dual::SiaStatus::Stuck))
            .map(|(key, _)| *key)
            .collect();

        for (address, prefix_len) in stuck {
            self.timers.active_since.remove(&(address, prefix_len));
            let prefix = eigrp_common::Ipv4Prefix::new(address, prefix_len).expect("stored prefix was valid");
            error!("prefix {prefix} stuck-in-active, withdrawing");
            if self.process.topology.delete(prefix).is_some() {
                self.process.pending_fib_actions.push(FibAction::Withdraw(prefix));
            }
        }
    }

    /// §4.C: each interface sends a Hello every `hello_interval` to every neighbor it already
    /// knows about, carrying the PARAMETERS TLV (K-values + this interface's hold-time) peers use
    /// to detect a K-value mismatch and to arm their own holddown timer. Sent unreliably, the same
    /// way the donor's own keepalive traffic bypasses message-level retry.
    fn sweep_hellos(&mut self, now: Instant) {
        let ifindices: Vec<u32> = self.process.interfaces.keys().copied().collect();
        for ifindex in ifindices {
            let due = *self.timers.hello_due.entry(ifindex).or_insert(now);
            if now < due {
                continue;
            }
            let Some(iface) = self.process.interfaces.get(&ifindex) else { continue };
            self.timers.hello_due.insert(ifindex, now + iface.config.hello_interval);
            let hold_time = iface.config.hold_time.as_secs().min(u16::MAX as u64) as u16;

            let packet = EigrpPacket::new(
                eigrp_packet::header::EigrpHeader {
                    version: eigrp_packet::header::EIGRP_VERSION,
                    opcode: Opcode::Hello,
                    checksum: 0,
                    flags: eigrp_packet::HeaderFlags::empty(),
                    sequence: 0,
                    ack: 0,
                    virtual_router_id: 0,
                    as_number: self.process.config.as_number,
                },
                vec![Tlv::Parameters(ParametersTlv { k_values: self.process.config.k_values, hold_time })],
            );

            let neighbor_ids: Vec<NeighborId> = self
                .process
                .neighbors
                .iter()
                .filter(|(_, slot)| slot.record.interface_id == ifindex && slot.record.state != NeighborState::Down)
                .map(|(id, _)| *id)
                .collect();
            for neighbor_id in neighbor_ids {
                self.enqueue_outbound(neighbor_id, packet.clone());
            }
        }
    }

    /// Builds and enqueues the outbound Query/Reply packets DUAL asked for this tick (§4.E),
    /// ahead of `drain_outbound` so anything queued here goes out on this same tick's socket
    /// write rather than waiting for the next one.
    fn drain_dual_actions(&mut self) {
        for action in self.process.take_pending_dual_actions() {
            match action {
                DualPacketAction::QueryAllNeighbors { prefix } => self.send_query(prefix),
                DualPacketAction::ReplyToQueriers { prefix, queriers } => self.send_reply(prefix, queriers),
            }
        }
    }

    /// A Query fires when this process just lost its own route for `prefix` (§4.E
    /// NoFeasibleSuccessor/LossOfFs), so it always carries the infinite-metric TLV: "I no longer
    /// have a route, does anyone else?" Sent to every currently-up neighbor, per
    /// `DualAction::query_all_neighbors`.
    fn send_query(&mut self, prefix: eigrp_common::Ipv4Prefix) {
        let tlv = crate::process::infinite_route_tlv(prefix);
        let neighbor_ids: Vec<NeighborId> = self.process.neighbors.iter().filter(|(_, slot)| slot.record.is_up()).map(|(id, _)| *id).collect();
        for neighbor_id in neighbor_ids {
            self.enqueue_reliable(neighbor_id, Opcode::Query, eigrp_packet::HeaderFlags::empty(), vec![Tlv::Ipv4Internal(tlv.clone())]);
        }
    }

    /// Replies to every neighbor that queried `prefix` while it was or became ACTIVE, once DUAL
    /// has resolved it back to PASSIVE (§4.E). Carries the resolved successor's vector, or the
    /// infinite-metric TLV if DUAL still has no route.
    fn send_reply(&mut self, prefix: eigrp_common::Ipv4Prefix, queriers: Vec<NeighborId>) {
        let tlv = match self.process.topology.lookup(prefix).and_then(|entry| entry.successor()) {
            Some(successor) => crate::process::route_tlv(prefix, successor.vector, successor.hop_count),
            None => crate::process::infinite_route_tlv(prefix),
        };
        for neighbor_id in queriers {
            self.enqueue_reliable(neighbor_id, Opcode::Reply, eigrp_packet::HeaderFlags::empty(), vec![Tlv::Ipv4Internal(tlv.clone())]);
        }
    }

    fn enqueue_outbound(&mut self, neighbor_id: u32, packet: EigrpPacket) {
        let Some(slot) = self.process.neighbors.get(&neighbor_id) else { return };
        let dst = slot.record.address;
        if let Some(iface) = self.process.interfaces.get_mut(&slot.record.interface_id) {
            iface.enqueue(dst, crate::transport::PacketBuffer::new(packet));
        }
    }

    /// Writes every interface's queued packets to the raw socket (§4.G/§5 "writable"
    /// readiness). Reliable multicast is already modeled as a per-neighbor unicast clone (see
    /// `transport.rs`), so every queued buffer addresses exactly one neighbor and this never needs
    /// to build a multicast IP destination. Authentication (§4.A) is attached per packet here,
    /// since only here is the owning interface's config and the real send key both in scope.
    fn drain_outbound(&mut self) {
        let ifindices: Vec<u32> = self.process.interfaces.iter().filter(|(_, iface)| iface.dirty).map(|(id, _)| *id).collect();
        for ifindex in ifindices {
            let (src_addr, queued) = {
                let Some(iface) = self.process.interfaces.get_mut(&ifindex) else { continue };
                let queued: Vec<_> = iface.outbound_queue.drain(..).collect();
                iface.dirty = false;
                (iface.config.address, queued)
            };
            for (dst, buffer) in queued {
                let Some(body) = self.authenticate_for_send(ifindex, buffer.packet) else { continue };
                let mut datagram = build_ip_header(src_addr, dst, body.len()).to_vec();
                datagram.extend_from_slice(&body);
                let dest = socket2::SockAddr::from(std::net::SocketAddr::new(std::net::IpAddr::V4(dst), 0));
                if let Err(e) = self.socket.send_to(&datagram, &dest) {
                    warn!("send to {dst} failed: {e}");
                }
            }
        }
    }

    /// Attaches a real AUTH TLV when `interface_id` has authentication configured (resolving the
    /// active send key and bumping the interface's outgoing key-sequence counter, §4.A), then
    /// packs the packet for the wire. Falls back to sending unauthenticated, logged, if
    /// authentication is configured but no key is currently active — the alternative is dropping
    /// the packet outright, which would also stall the retransmit FIFO behind it.
    fn authenticate_for_send(&mut self, interface_id: u32, packet: EigrpPacket) -> Option<Vec<u8>> {
        let iface = self.process.interfaces.get(&interface_id)?;
        let (algorithm, keychain) = match &iface.config.authentication {
            AuthConfig::None => return Some(packet.pack_authenticated(&[], DigestMode::Basic)),
            AuthConfig::Md5 { keychain } => (AuthAlgorithm::Md5, keychain.clone()),
            AuthConfig::Sha256 { keychain } => (AuthAlgorithm::Sha256, keychain.clone()),
        };

        let Some(send_key) = self.process.resolve_send_key(&keychain) else {
            warn!("interface {interface_id} has authentication configured but no active send key, sending unauthenticated");
            return Some(packet.pack_authenticated(&[], DigestMode::Basic));
        };

        let digest_mode = if packet.header.flags.contains(eigrp_packet::HeaderFlags::INIT) && matches!(packet.header.opcode, Opcode::Update) {
            DigestMode::UpdateInit
        } else {
            DigestMode::Basic
        };

        let iface = self.process.interfaces.get_mut(&interface_id)?;
        iface.auth_send_sequence += 1;
        let key_sequence = iface.auth_send_sequence;

        let packet = packet.with_auth(algorithm, send_key.key_id, key_sequence);
        Some(packet.pack_authenticated(&send_key.secret, digest_mode))
    }

    /// Applies the FIB actions DUAL queued this tick on the scheduler's throwaway async runtime
    /// (§5: FIB calls are async, but never awaited from inside a packet-handling callback).
    fn drain_fib_actions(&mut self) {
        for action in self.process.take_pending_fib_actions() {
            let result = match action {
                FibAction::Install(route) => self.async_runtime.block_on(self.process.route_sink.install(route)),
                FibAction::Withdraw(prefix) => self.async_runtime.block_on(self.process.route_sink.withdraw(prefix)),
            };
            if let Err(source) = result {
                warn!("FIB action failed: {source}");
            }
        }
    }
}
