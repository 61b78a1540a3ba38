//! The per-link interface record (§3): static link properties, the authentication
//! descriptor, filter predicates, and the neighbor table keyed by source address.

use crate::{
    config::InterfaceConfig,
    metric::LinkMetric,
    transport::PacketBuffer,
};
use eigrp_route::{
    FilterDirection,
    FilterScope,
    PermitAll,
    PrefixFilter,
};
use std::{
    net::Ipv4Addr,
    sync::Arc,
};

/// A live interface: the static configuration plus the runtime state that comes into existence
/// when the OS reports the link up with an address in a configured network, and goes away on
/// down (§3's interface-record lifecycle). The neighbor table itself lives on `Process`,
/// keyed by `NeighborId` rather than here, so a neighbor's identity survives interface churn.
pub struct Interface {
    pub config: InterfaceConfig,
    pub outbound_queue: Vec<(Ipv4Addr, PacketBuffer)>,
    pub dirty: bool,
    pub filter: Arc<dyn PrefixFilter>,
    /// This interface's own outgoing AUTH TLV `key_sequence` counter (§4.A), incremented once per
    /// authenticated packet sent. Distinct from the neighbor-side replay guard, which tracks the
    /// highest sequence *accepted from* each peer.
    pub auth_send_sequence: u32,
}

impl Interface {
    pub fn new(config: InterfaceConfig) -> Self {
        Self { config, outbound_queue: Vec::new(), dirty: false, filter: Arc::new(PermitAll), auth_send_sequence: 0 }
    }

    pub fn link_metric(&self) -> LinkMetric {
        LinkMetric {
            bandwidth_kbps: self.config.bandwidth_kbps,
            delay_10us: self.config.delay_10us,
            reliability: 255,
            load: 1,
        }
    }

    /// Whether `address` is within this interface's configured network (§7's
    /// `NetworkMismatch` error kind).
    pub fn contains(&self, address: Ipv4Addr) -> bool {
        eigrp_common::Ipv4Prefix::new(self.config.address, self.config.prefix_len).map(|prefix| prefix.contains(address)).unwrap_or(false)
    }

    pub fn permit_outbound(&self, prefix: eigrp_common::Ipv4Prefix) -> bool {
        self.filter.permit(prefix, FilterDirection::Out, FilterScope::Interface(&self.config.name))
    }

    pub fn permit_inbound(&self, prefix: eigrp_common::Ipv4Prefix) -> bool {
        self.filter.permit(prefix, FilterDirection::In, FilterScope::Interface(&self.config.name))
    }

    pub fn enqueue(&mut self, dst: Ipv4Addr, packet: PacketBuffer) {
        self.outbound_queue.push((dst, packet));
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AuthConfig,
        DEFAULT_HELLO_INTERVAL,
        DEFAULT_HOLD_TIME,
    };

    fn interface() -> Interface {
        Interface::new(InterfaceConfig {
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
        })
    }

    #[test]
    fn contains_checks_the_configured_network() {
        let iface = interface();
        assert!(iface.contains(Ipv4Addr::new(10, 0, 0, 2)));
        assert!(!iface.contains(Ipv4Addr::new(10, 0, 0, 5)));
    }

    #[test]
    fn default_filter_permits_everything() {
        let iface = interface();
        let prefix = eigrp_common::Ipv4Prefix::new(Ipv4Addr::new(192, 168, 0, 0), 24).unwrap();
        assert!(iface.permit_outbound(prefix));
        assert!(iface.permit_inbound(prefix));
    }
}
