//! The error kinds §7 enumerates, and their disposition. Most are not fatal: the event loop
//! logs and moves on. Only invariant violations (§3 I1-I6) and a handful of impossible
//! states abort the process, matching §7's "Fatal" list.

use eigrp_common::Ipv4Prefix;
use std::net::Ipv4Addr;
use thiserror::Error;

/// A non-fatal protocol error. The caller decides disposition (drop, counter increment, teardown)
/// per §7; this type only classifies what went wrong.
#[derive(Debug, Error)]
pub enum EigrpError {
    #[error("malformed packet from {src}: {reason}")]
    MalformedPacket { src: Ipv4Addr, reason: String },

    #[error("authentication failure from {src}: {reason}")]
    AuthFailure { src: Ipv4Addr, reason: String },

    #[error("{src} is outside the configured network for this interface")]
    NetworkMismatch { src: Ipv4Addr },

    #[error("K-value mismatch from {src}")]
    KMismatch { src: Ipv4Addr },

    #[error("unexpected ack {ack} from {src}, ignoring")]
    SequenceGap { src: Ipv4Addr, ack: u32 },

    #[error("retransmission exhausted for neighbor {src}")]
    RetransmitExhausted { src: Ipv4Addr },

    #[error("prefix {prefix} stuck-in-active on neighbor {src}")]
    SiaStuck { src: Ipv4Addr, prefix: Ipv4Prefix },

    #[error("socket error sending to {dst:?}: {source}")]
    SocketSend { dst: Option<Ipv4Addr>, #[source] source: std::io::Error },

    #[error("FIB install failed for {prefix}: {source}")]
    FibInstallFailed { prefix: Ipv4Prefix, #[source] source: eigrp_route::RouteError },
}

/// An invariant violation (§3 I1-I6) or another condition §7 calls out as fatal. The
/// process aborts rather than continuing in a state it cannot reason about.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("invariant I1 violated: neighbor {src} not indexed under its own interface")]
    NeighborNotIndexed { src: Ipv4Addr },

    #[error("invariant I2 violated: successor for {prefix} does not have the minimum distance")]
    SuccessorNotMinimal { prefix: Ipv4Prefix },

    #[error("invariant I3 violated: {prefix} is PASSIVE but FD does not equal the successor's distance")]
    PassiveFdMismatch { prefix: Ipv4Prefix },

    #[error("invariant I4 violated: {prefix} is ACTIVE with an empty reply-status bitmap")]
    ActiveWithNoPendingReplies { prefix: Ipv4Prefix },

    #[error("checksum function returned an unexpected length")]
    ChecksumLengthMismatch,

    #[error("keychain returned a malformed secret for key {key_id}")]
    MalformedKeychainSecret { key_id: u32 },
}
