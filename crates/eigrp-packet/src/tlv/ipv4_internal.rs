//! IPv4_INTERNAL TLV (0x0102): the workhorse TLV carrying one internal IPv4 route's reachability
//! metric and prefix. Update/Query/Reply/SIA packets are streams of these.

use crate::EigrpElement;
use alloc::vec::Vec;
use core::net::Ipv4Addr;
use eigrp_common::Ipv4Prefix;
use nom::{
    bytes::complete::take,
    number::complete::{
        be_u32,
        be_u8,
    },
    IResult,
};

pub const TLV_TYPE: u16 = 0x0102;

/// The metric fields a neighbor reports for a route, before any composition with the receiving
/// interface (§4.D draws the composite-metric/local-distance distinction; this struct is
/// the wire-level "what the neighbor said").
#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash)]
pub struct ReportedMetric {
    pub delay: u32,
    pub bandwidth: u32,
    pub mtu: [u8; 3],
    pub hop_count: u8,
    pub reliability: u8,
    pub load: u8,
    pub tag: u8,
    pub flags: u8,
}

impl ReportedMetric {
    pub const INFINITE_DELAY: u32 = 0xFFFF_FFFF;
    pub const INFINITE_BANDWIDTH: u32 = 0xFFFF_FFFF;

    /// A poison (infinite-metric) route, used to withdraw a prefix via DUAL rather than through
    /// an explicit withdrawn-routes list (§4.C graceful restart, §4.E filter-denial).
    pub fn infinite() -> Self {
        Self {
            delay: Self::INFINITE_DELAY,
            bandwidth: Self::INFINITE_BANDWIDTH,
            mtu: [0; 3],
            hop_count: 0,
            reliability: 0,
            load: 0,
            tag: 0,
            flags: 0,
        }
    }

    pub fn is_infinite(&self) -> bool {
        self.delay == Self::INFINITE_DELAY || self.bandwidth == Self::INFINITE_BANDWIDTH
    }

    fn mtu24(&self) -> u32 {
        u32::from_be_bytes([0, self.mtu[0], self.mtu[1], self.mtu[2]])
    }
}

#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash)]
pub struct Ipv4InternalTlv {
    /// `None` means "0 ⇒ sender": the originating neighbor's own address is the next hop.
    pub next_hop: Option<Ipv4Addr>,
    pub metric: ReportedMetric,
    pub prefix: Ipv4Prefix,
}

impl EigrpElement for Ipv4InternalTlv {
    fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, next_hop_raw) = be_u32(input)?;
        let (input, delay) = be_u32(input)?;
        let (input, bandwidth) = be_u32(input)?;
        let (input, mtu) = take(3usize)(input)?;
        let (input, hop_count) = be_u8(input)?;
        let (input, reliability) = be_u8(input)?;
        let (input, load) = be_u8(input)?;
        let (input, tag) = be_u8(input)?;
        let (input, flags) = be_u8(input)?;
        let (input, prefix_length) = be_u8(input)?;
        let octets = ((prefix_length as usize) + 7) / 8;
        let (input, prefix_bytes) = take(octets)(input)?;

        let mut address_octets = [0u8; 4];
        address_octets[..prefix_bytes.len()].copy_from_slice(prefix_bytes);

        Ok((
            input,
            Self {
                next_hop: if next_hop_raw == 0 { None } else { Some(Ipv4Addr::from(next_hop_raw)) },
                metric: ReportedMetric {
                    delay,
                    bandwidth,
                    mtu: [mtu[0], mtu[1], mtu[2]],
                    hop_count,
                    reliability,
                    load,
                    tag,
                    flags,
                },
                prefix: Ipv4Prefix {
                    address: Ipv4Addr::from(address_octets),
                    prefix_len: prefix_length,
                },
            },
        ))
    }

    fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(25);
        buffer.extend_from_slice(&self.next_hop.map(u32::from).unwrap_or(0).to_be_bytes());
        buffer.extend_from_slice(&self.metric.delay.to_be_bytes());
        buffer.extend_from_slice(&self.metric.bandwidth.to_be_bytes());
        buffer.extend_from_slice(&self.metric.mtu);
        buffer.extend_from_slice(&[
            self.metric.hop_count,
            self.metric.reliability,
            self.metric.load,
            self.metric.tag,
            self.metric.flags,
            self.prefix.prefix_len,
        ]);
        let octets = self.prefix.wire_octets();
        buffer.extend_from_slice(&self.prefix.address.octets()[..octets]);
        buffer
    }
}

impl ReportedMetric {
    /// Exposes the 24-bit MTU as a plain integer for metric composition in the topology table.
    pub fn mtu_value(&self) -> u32 {
        self.mtu24()
    }
}

#[cfg(all(feature = "std", test))]
mod tests {
    use super::*;
    use nom::Parser;

    #[test]
    fn round_trips_a_24_bit_prefix() {
        let tlv = Ipv4InternalTlv {
            next_hop: None,
            metric: ReportedMetric {
                delay: 10,
                bandwidth: 100_000,
                mtu: [0x05, 0xDC, 0x00],
                hop_count: 1,
                reliability: 255,
                load: 1,
                tag: 0,
                flags: 0,
            },
            prefix: Ipv4Prefix::new(Ipv4Addr::new(10, 0, 0, 0), 24).unwrap(),
        };
        let packed = tlv.pack();
        let (rest, decoded) = Ipv4InternalTlv::unpack.parse(&packed).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, tlv);
        assert_eq!(decoded.metric.mtu_value(), 0x05DC00);
    }

    #[test]
    fn default_route_has_zero_prefix_octets() {
        let tlv = Ipv4InternalTlv {
            next_hop: Some(Ipv4Addr::new(192, 168, 1, 1)),
            metric: ReportedMetric::infinite(),
            prefix: Ipv4Prefix::DEFAULT_ROUTE,
        };
        let packed = tlv.pack();
        assert_eq!(packed.len(), 4 + 4 + 4 + 3 + 5 + 1);
        let (_, decoded) = Ipv4InternalTlv::unpack.parse(&packed).unwrap();
        assert_eq!(decoded, tlv);
        assert!(decoded.metric.is_infinite());
    }

    #[test]
    fn host_route_carries_full_four_octets() {
        let tlv = Ipv4InternalTlv {
            next_hop: None,
            metric: ReportedMetric {
                delay: 1,
                bandwidth: 1,
                mtu: [0, 0, 0],
                hop_count: 0,
                reliability: 0,
                load: 0,
                tag: 0,
                flags: 0,
            },
            prefix: Ipv4Prefix::new(Ipv4Addr::new(172, 16, 5, 9), 32).unwrap(),
        };
        let packed = tlv.pack();
        let (_, decoded) = Ipv4InternalTlv::unpack.parse(&packed).unwrap();
        assert_eq!(decoded.prefix.address, Ipv4Addr::new(172, 16, 5, 9));
    }
}
