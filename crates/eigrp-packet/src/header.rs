//! The fixed 20-byte EIGRP header that precedes every packet's TLV stream.

use crate::EigrpElement;
use alloc::vec::Vec;
use bitflags::bitflags;
use eigrp_common::type_enum;
use nom::{
    number::complete::{
        be_u16,
        be_u32,
        be_u8,
    },
    IResult,
};

pub const EIGRP_VERSION: u8 = 2;
pub const HEADER_LEN: usize = 20;

type_enum! {
    /// The operation this packet carries out, carried in the header's `kind` byte.
    #[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
    pub enum Opcode: be_u8(u8) {
        Update = 1,
        Request = 2,
        Query = 3,
        Reply = 4,
        Hello = 5,
        Probe = 7,
        Ack = 8,
        SiaQuery = 10,
        SiaReply = 11
    }
}

bitflags! {
    /// Per-packet flags. `INIT` marks the INIT handshake Update, `CR` (conditional-receive)
    /// marks a packet only some neighbors should treat as unicast-equivalent, `RS`/`EOT` frame a
    /// graceful-restart resync.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
    pub struct HeaderFlags: u32 {
        const INIT = 0x01;
        const CR   = 0x02;
        const RS   = 0x04;
        const EOT  = 0x08;
    }
}

/// The 20-byte EIGRP header. All multi-byte fields are network byte order on the wire.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct EigrpHeader {
    pub version: u8,
    pub opcode: Opcode,
    pub checksum: u16,
    pub flags: HeaderFlags,
    pub sequence: u32,
    pub ack: u32,
    pub virtual_router_id: u16,
    pub as_number: u16,
}

impl EigrpElement for EigrpHeader {
    fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, version) = be_u8(input)?;
        let (input, opcode) = Opcode::unpack(input)?;
        let (input, checksum) = be_u16(input)?;
        let (input, flags) = be_u32(input)?;
        let (input, sequence) = be_u32(input)?;
        let (input, ack) = be_u32(input)?;
        let (input, virtual_router_id) = be_u16(input)?;
        let (input, as_number) = be_u16(input)?;
        Ok((
            input,
            Self {
                version,
                opcode,
                checksum,
                flags: HeaderFlags::from_bits_truncate(flags),
                sequence,
                ack,
                virtual_router_id,
                as_number,
            },
        ))
    }

    fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(HEADER_LEN);
        buffer.extend_from_slice(&self.version.to_be_bytes());
        buffer.extend(self.opcode.pack());
        buffer.extend_from_slice(&self.checksum.to_be_bytes());
        buffer.extend_from_slice(&self.flags.bits().to_be_bytes());
        buffer.extend_from_slice(&self.sequence.to_be_bytes());
        buffer.extend_from_slice(&self.ack.to_be_bytes());
        buffer.extend_from_slice(&self.virtual_router_id.to_be_bytes());
        buffer.extend_from_slice(&self.as_number.to_be_bytes());
        buffer
    }
}
