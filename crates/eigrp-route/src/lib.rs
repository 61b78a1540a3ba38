//! Bridges the DUAL engine's successor decisions to the host's forwarding table, and declares the
//! trait boundaries for the three collaborators §6 says are external to the protocol core:
//! the FIB itself, redistribution sources, and prefix filters. Keychain storage (also external)
//! lives here too since it is consumed on the same send/receive path as authentication.

use eigrp_common::Ipv4Prefix;
use std::{
    future::Future,
    net::Ipv4Addr,
};
use thiserror::Error;

#[cfg(target_os = "linux")]
pub mod linux;
pub mod null;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("IO error => {0}")]
    Io(#[from] std::io::Error),

    #[cfg(target_os = "linux")]
    #[error("netlink error => {0}")]
    Netlink(#[from] rtnetlink::Error),
}

/// A single FIB entry as the route sink sees it: a destination, the next hop chosen as successor,
/// and the composite metric DUAL computed for it (§4.D/§4.F).
#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash)]
pub struct FibRoute {
    pub prefix: Ipv4Prefix,
    pub next_hop: Ipv4Addr,
    pub metric: u32,
}

/// Converts successor changes into install/withdraw calls on the host forwarding table (spec
/// §4.F). Implementations must make `install` idempotent: installing the same `(prefix, next_hop,
/// metric)` twice in a row is a no-op, matching the invariant §8 tests for.
pub trait RouteSink: Send + Sync {
    fn install(&self, route: FibRoute) -> impl Future<Output = Result<(), RouteError>> + Send;
    fn withdraw(&self, prefix: Ipv4Prefix) -> impl Future<Output = Result<(), RouteError>> + Send;
}

/// Which routing source a redistributed route came from (§6's
/// `redistribute_subscribe(kind)`).
#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash)]
pub enum RedistributeKind {
    Connected,
    Static,
    Ospf,
    Bgp,
}

/// A single redistributed route as handed to the core by the (out-of-scope) redistribution
/// bridge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RedistributedRoute {
    pub prefix: Ipv4Prefix,
    pub metric: u32,
    pub next_hop: Ipv4Addr,
}

/// The shape external code plugs a redistribution feed into; §1 lists the redistribution
/// bridge itself as deliberately out of scope, so only the trait boundary is declared here.
pub trait RedistributeSource {
    type Stream: futures_core::Stream<Item = RedistributedRoute> + Send;

    fn subscribe(&self, kind: RedistributeKind) -> Self::Stream;
}

#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash)]
pub enum FilterDirection {
    In,
    Out,
}

#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash)]
pub enum FilterScope<'a> {
    Process,
    Interface(&'a str),
}

/// Access-list/prefix-list evaluation (§6). The core consumes only this boolean predicate;
/// list syntax and configuration parsing are out of scope (§1).
pub trait PrefixFilter: Send + Sync {
    fn permit(&self, prefix: Ipv4Prefix, direction: FilterDirection, scope: FilterScope<'_>) -> bool;
}

/// A filter that permits everything; the default when no filter is configured on an interface or
/// process.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermitAll;

impl PrefixFilter for PermitAll {
    fn permit(&self, _prefix: Ipv4Prefix, _direction: FilterDirection, _scope: FilterScope<'_>) -> bool {
        true
    }
}

/// A resolved authentication key, as handed to the packet authenticator.
#[derive(Debug, Clone)]
pub struct AuthKey {
    pub key_id: u32,
    pub secret: Vec<u8>,
}

/// One keychain's time-windowed key set (§6). Implementations decide which key is active for
/// sending "now", and which key id(s) are acceptable for receiving.
pub trait Keychain: Send + Sync {
    fn active_send_key(&self, now_unix: u64) -> Option<AuthKey>;
    fn accept_key(&self, key_id: u32, now_unix: u64) -> Option<Vec<u8>>;
}

/// Looks a keychain up by the name an interface's authentication descriptor references. Keychain
/// storage itself (reading key strings off disk, rotation policy) is out of scope (§1); only
/// this lookup interface is specified.
pub trait KeychainSource: Send + Sync {
    fn lookup(&self, name: &str) -> Option<&dyn Keychain>;
}
