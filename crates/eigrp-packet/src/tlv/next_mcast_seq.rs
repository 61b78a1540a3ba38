//! NEXT_MULTICAST_SEQ TLV (0x0005): announces the sequence number the next multicast packet
//! will carry, so a newly-joined neighbor can tell whether it missed anything.

use crate::EigrpElement;
use alloc::vec::Vec;
use nom::{
    number::complete::be_u32,
    IResult,
};

pub const TLV_TYPE: u16 = 0x0005;

#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash)]
pub struct NextMulticastSeqTlv {
    pub next_sequence: u32,
}

impl EigrpElement for NextMulticastSeqTlv {
    fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, next_sequence) = be_u32(input)?;
        Ok((input, Self { next_sequence }))
    }

    fn pack(&self) -> Vec<u8> {
        self.next_sequence.to_be_bytes().to_vec()
    }
}
