//! STUB TLV (0x0006): not named in the distilled spec, present in the original Quagga/FRR source
//! (`eigrp_packet.c`). A peer uses it to declare which route categories it will never advertise
//! (connected, static, summary, redistributed, other routing protocols). We decode it onto the
//! neighbor record for display/future filtering; nothing downstream acts on it yet, matching the
//! original daemon, where this TLV is parsed but not consulted either.

use crate::EigrpElement;
use alloc::vec::Vec;
use bitflags::bitflags;
use nom::{
    number::complete::be_u16,
    IResult,
};

pub const TLV_TYPE: u16 = 0x0006;

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
    pub struct StubFlags: u16 {
        const CONNECTED    = 0x0001;
        const STATIC       = 0x0002;
        const SUMMARY      = 0x0004;
        const REDISTRIBUTED = 0x0008;
        const RECEIVE_ONLY = 0x0010;
        const LEAK_MAP     = 0x0020;
    }
}

#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash)]
pub struct StubTlv {
    pub flags: StubFlags,
}

impl EigrpElement for StubTlv {
    fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, flags) = be_u16(input)?;
        Ok((
            input,
            Self {
                flags: StubFlags::from_bits_truncate(flags),
            },
        ))
    }

    fn pack(&self) -> Vec<u8> {
        self.flags.bits().to_be_bytes().to_vec()
    }
}
