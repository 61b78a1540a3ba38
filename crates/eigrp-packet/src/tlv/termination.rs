//! PEER_TERMINATION TLV (0x0007): carries no fields; its presence alone announces that the
//! sender is shutting the adjacency down gracefully rather than simply going silent.

use crate::EigrpElement;
use alloc::vec::Vec;
use nom::IResult;

pub const TLV_TYPE: u16 = 0x0007;

#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash, Default)]
pub struct PeerTerminationTlv;

impl EigrpElement for PeerTerminationTlv {
    fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        Ok((input, Self))
    }

    fn pack(&self) -> Vec<u8> {
        Vec::new()
    }
}
