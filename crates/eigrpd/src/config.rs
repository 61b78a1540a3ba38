//! A hardcoded-in-process configuration structure, deliberately not backed by a file parser: spec
//! §1 lists the operator CLI/config parser as an external collaborator. The donor's `main.rs`
//! hardcodes `sqlite://database.db` the same way; this hardcodes a `ProcessConfig` built by the
//! caller instead of reading one off disk.

use eigrp_packet::tlv::KValues;
use std::{
    net::Ipv4Addr,
    time::Duration,
};

pub const EIGRP_PACKET_RETRANS_TIME: Duration = Duration::from_secs(2);
pub const EIGRP_PACKET_RETRANS_MAX: u32 = 16;
pub const DEFAULT_ACTIVE_TIME: Duration = Duration::from_secs(180);
pub const DEFAULT_HELLO_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_HOLD_TIME: Duration = Duration::from_secs(15);
pub const DEFAULT_VARIANCE: u32 = 1;

/// How an interface authenticates its outbound packets (§3's interface record).
#[derive(Debug, Clone)]
pub enum AuthConfig {
    None,
    Md5 { keychain: String },
    Sha256 { keychain: String },
}

/// Per-interface configuration: everything §3's interface record needs that isn't runtime
/// state (neighbor table, FIFOs) set up when the interface comes up.
#[derive(Debug, Clone)]
pub struct InterfaceConfig {
    pub name: String,
    pub ifindex: u32,
    pub address: Ipv4Addr,
    pub prefix_len: u8,
    pub bandwidth_kbps: u32,
    pub delay_10us: u32,
    pub mtu: u32,
    pub hello_interval: Duration,
    pub hold_time: Duration,
    pub authentication: AuthConfig,
}

/// The AS-wide configuration §3 calls the "Autonomous System instance" before any runtime
/// state (topology table, sequence number, socket handle) is attached.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub router_id: Ipv4Addr,
    pub as_number: u16,
    pub k_values: KValues,
    pub variance: u32,
    pub active_time: Duration,
    pub interfaces: Vec<InterfaceConfig>,
}

impl ProcessConfig {
    pub fn new(router_id: Ipv4Addr, as_number: u16) -> Self {
        Self {
            router_id,
            as_number,
            k_values: KValues::DEFAULT,
            variance: DEFAULT_VARIANCE,
            active_time: DEFAULT_ACTIVE_TIME,
            interfaces: Vec::new(),
        }
    }

    pub fn with_interface(mut self, interface: InterfaceConfig) -> Self {
        self.interfaces.push(interface);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_interfaces() {
        let config = ProcessConfig::new(Ipv4Addr::new(1, 1, 1, 1), 100).with_interface(InterfaceConfig {
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
        assert_eq!(config.interfaces.len(), 1);
        assert_eq!(config.k_values, KValues::DEFAULT);
    }
}
