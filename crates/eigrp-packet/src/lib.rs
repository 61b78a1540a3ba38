//! Serialization and deserialization of Enhanced Interior Gateway Routing Protocol (EIGRP)
//! packets: the fixed header, the TLV stream carried in the body, the Internet checksum, and the
//! MD5/HMAC-SHA256 packet authenticator.
//!
//! This crate has no knowledge of sockets, neighbors, or the DUAL algorithm — it is a pure
//! function from bytes to typed packets and back, the way a protocol's wire format should be
//! kept separate from the state machine that drives it.

#![no_std]
extern crate alloc;

pub mod auth;
pub mod checksum;
pub mod header;
pub mod message;
pub mod tlv;

use alloc::vec::Vec;
use nom::IResult;

/// A wire element that can be parsed from and serialized back to bytes without any external
/// context (contrast [`ParameterizedEigrpElement`], which needs one).
pub trait EigrpElement {
    fn unpack(input: &[u8]) -> IResult<&[u8], Self>
    where
        Self: Sized;
    fn pack(&self) -> Vec<u8>;
}

/// A wire element whose decoding depends on context the bare bytes don't carry — e.g. a prefix's
/// byte width depends on the address family of the enclosing message.
pub trait ParameterizedEigrpElement {
    type Parameter;

    fn unpack(input: &[u8], parameter: Self::Parameter) -> IResult<&[u8], Self>
    where
        Self: Sized;

    fn pack(&self) -> Vec<u8>;
}

pub use header::{
    EigrpHeader,
    HeaderFlags,
    Opcode,
};
pub use message::EigrpPacket;
