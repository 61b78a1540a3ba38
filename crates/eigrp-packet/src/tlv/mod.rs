//! The TLV stream carried in an EIGRP packet's body: `type(2) length(2) value(length-4)`, with
//! `length` counting the TLV header itself.

pub mod auth_tlv;
pub mod ipv4_internal;
pub mod next_mcast_seq;
pub mod parameters;
pub mod sequence;
pub mod stub;
pub mod sw_version;
pub mod termination;

use crate::EigrpElement;
use alloc::vec::Vec;
use nom::{
    bytes::complete::take,
    number::complete::be_u16,
    IResult,
};

pub use auth_tlv::AuthTlv;
pub use ipv4_internal::{
    Ipv4InternalTlv,
    ReportedMetric,
};
pub use next_mcast_seq::NextMulticastSeqTlv;
pub use parameters::{
    KValues,
    ParametersTlv,
};
pub use sequence::SequenceTlv;
pub use stub::StubTlv;
pub use sw_version::SwVersionTlv;
pub use termination::PeerTerminationTlv;

const TLV_HEADER_LEN: u16 = 4;

/// One decoded TLV. `Unknown` absorbs any type this implementation doesn't recognize, so an
/// unrecognized optional TLV from a newer peer never fails the whole packet to parse.
#[derive(Debug, Eq, PartialEq, Clone)]
pub enum Tlv {
    Parameters(ParametersTlv),
    Auth(AuthTlv),
    Sequence(SequenceTlv),
    SwVersion(SwVersionTlv),
    NextMulticastSeq(NextMulticastSeqTlv),
    PeerTermination(PeerTerminationTlv),
    Stub(StubTlv),
    Ipv4Internal(Ipv4InternalTlv),
    Unknown { kind: u16, data: Vec<u8> },
}

impl Tlv {
    pub fn kind(&self) -> u16 {
        match self {
            Self::Parameters(_) => parameters::TLV_TYPE,
            Self::Auth(_) => auth_tlv::TLV_TYPE,
            Self::Sequence(_) => sequence::TLV_TYPE,
            Self::SwVersion(_) => sw_version::TLV_TYPE,
            Self::NextMulticastSeq(_) => next_mcast_seq::TLV_TYPE,
            Self::PeerTermination(_) => termination::TLV_TYPE,
            Self::Stub(_) => stub::TLV_TYPE,
            Self::Ipv4Internal(_) => ipv4_internal::TLV_TYPE,
            Self::Unknown { kind, .. } => *kind,
        }
    }
}

impl EigrpElement for Tlv {
    fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, kind) = be_u16(input)?;
        let (input, length) = be_u16(input)?;
        let value_len = (length.max(TLV_HEADER_LEN) - TLV_HEADER_LEN) as usize;
        let (input, value) = take(value_len)(input)?;

        let tlv = match kind {
            parameters::TLV_TYPE => Self::Parameters(ParametersTlv::unpack(value)?.1),
            auth_tlv::TLV_TYPE => Self::Auth(AuthTlv::unpack(value)?.1),
            sequence::TLV_TYPE => Self::Sequence(SequenceTlv::unpack(value)?.1),
            sw_version::TLV_TYPE => Self::SwVersion(SwVersionTlv::unpack(value)?.1),
            next_mcast_seq::TLV_TYPE => Self::NextMulticastSeq(NextMulticastSeqTlv::unpack(value)?.1),
            termination::TLV_TYPE => Self::PeerTermination(PeerTerminationTlv::unpack(value)?.1),
            stub::TLV_TYPE => Self::Stub(StubTlv::unpack(value)?.1),
            ipv4_internal::TLV_TYPE => Self::Ipv4Internal(Ipv4InternalTlv::unpack(value)?.1),
            _ => Self::Unknown { kind, data: value.to_vec() },
        };
        Ok((input, tlv))
    }

    fn pack(&self) -> Vec<u8> {
        let value = match self {
            Self::Parameters(tlv) => tlv.pack(),
            Self::Auth(tlv) => tlv.pack(),
            Self::Sequence(tlv) => tlv.pack(),
            Self::SwVersion(tlv) => tlv.pack(),
            Self::NextMulticastSeq(tlv) => tlv.pack(),
            Self::PeerTermination(tlv) => tlv.pack(),
            Self::Stub(tlv) => tlv.pack(),
            Self::Ipv4Internal(tlv) => tlv.pack(),
            Self::Unknown { data, .. } => data.clone(),
        };

        let mut buffer = Vec::with_capacity(value.len() + TLV_HEADER_LEN as usize);
        buffer.extend_from_slice(&self.kind().to_be_bytes());
        buffer.extend_from_slice(&((value.len() as u16) + TLV_HEADER_LEN).to_be_bytes());
        buffer.extend(value);
        buffer
    }
}

#[cfg(all(feature = "std", test))]
mod tests {
    use super::*;
    use nom::Parser;

    #[test]
    fn unknown_tlv_round_trips_opaque_bytes() {
        let tlv = Tlv::Unknown { kind: 0x00FF, data: alloc::vec![1, 2, 3] };
        let packed = tlv.pack();
        let (rest, decoded) = Tlv::unpack.parse(&packed).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, tlv);
    }

    #[test]
    fn parameters_tlv_round_trips_through_wrapper() {
        let tlv = Tlv::Parameters(ParametersTlv { k_values: KValues::DEFAULT, hold_time: 15 });
        let packed = tlv.pack();
        assert_eq!(packed.len(), TLV_HEADER_LEN as usize + 8);
        let (rest, decoded) = Tlv::unpack.parse(&packed).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, tlv);
    }
}
