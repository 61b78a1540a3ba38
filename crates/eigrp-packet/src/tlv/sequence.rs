//! SEQUENCE TLV (0x0003): the conditional-receive list. Addresses listed here must treat the
//! multicast packet that follows as if it had been sent to them by unicast (they're too far
//! behind on ACKs to safely receive another multicast reliably).

use crate::EigrpElement;
use alloc::vec::Vec;
use core::net::Ipv4Addr;
use nom::{
    bytes::complete::take,
    multi::many0,
    number::complete::be_u8,
    IResult,
    Parser,
};

pub const TLV_TYPE: u16 = 0x0003;

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct SequenceTlv {
    pub addresses: Vec<Ipv4Addr>,
}

impl EigrpElement for SequenceTlv {
    fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        fn entry(input: &[u8]) -> IResult<&[u8], Ipv4Addr> {
            let (input, length) = be_u8(input)?;
            let (input, bytes) = take(length)(input)?;
            let mut octets = [0u8; 4];
            let copy_len = core::cmp::min(bytes.len(), 4);
            octets[..copy_len].copy_from_slice(&bytes[..copy_len]);
            Ok((input, Ipv4Addr::from(octets)))
        }

        let (input, addresses) = many0(entry).parse(input)?;
        Ok((input, Self { addresses }))
    }

    fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        for address in &self.addresses {
            buffer.extend_from_slice(&4u8.to_be_bytes());
            buffer.extend_from_slice(&address.octets());
        }
        buffer
    }
}

#[cfg(all(feature = "std", test))]
mod tests {
    use super::*;

    #[test]
    fn round_trips_address_list() {
        let tlv = SequenceTlv {
            addresses: alloc::vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)],
        };
        let packed = tlv.pack();
        let (rest, decoded) = SequenceTlv::unpack.parse(&packed).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, tlv);
    }
}
