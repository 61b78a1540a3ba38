//! SW_VERSION TLV (0x0004): the peer's IOS and EIGRP-TLV version quad, recorded on the neighbor
//! record purely for display (`show neighbors detail` in the original daemon).

use crate::EigrpElement;
use alloc::vec::Vec;
use nom::{
    number::complete::be_u8,
    IResult,
};

pub const TLV_TYPE: u16 = 0x0004;

#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash)]
pub struct SwVersionTlv {
    pub ios_major: u8,
    pub ios_minor: u8,
    pub tlv_major: u8,
    pub tlv_minor: u8,
}

impl EigrpElement for SwVersionTlv {
    fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, ios_major) = be_u8(input)?;
        let (input, ios_minor) = be_u8(input)?;
        let (input, tlv_major) = be_u8(input)?;
        let (input, tlv_minor) = be_u8(input)?;
        Ok((
            input,
            Self {
                ios_major,
                ios_minor,
                tlv_major,
                tlv_minor,
            },
        ))
    }

    fn pack(&self) -> Vec<u8> {
        alloc::vec![self.ios_major, self.ios_minor, self.tlv_major, self.tlv_minor]
    }
}
