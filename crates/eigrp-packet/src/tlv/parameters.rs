//! PARAMETERS TLV (0x0001): the composite-metric K-value vector and hold-time, exchanged in
//! every Hello so peers can detect a K-value mismatch before ever forming an adjacency.

use crate::EigrpElement;
use alloc::vec::Vec;
use nom::{
    number::complete::{
        be_u16,
        be_u8,
    },
    IResult,
};

pub const TLV_TYPE: u16 = 0x0001;

/// The composite-metric weight vector. `K5 == 0` is the common case and disables the
/// reliability term entirely (§4.D's metric formula).
#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash)]
pub struct KValues {
    pub k1: u8,
    pub k2: u8,
    pub k3: u8,
    pub k4: u8,
    pub k5: u8,
}

impl KValues {
    /// The conventional Cisco default: bandwidth and delay only.
    pub const DEFAULT: KValues = KValues { k1: 1, k2: 0, k3: 1, k4: 0, k5: 0 };
}

#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash)]
pub struct ParametersTlv {
    pub k_values: KValues,
    pub hold_time: u16,
}

impl EigrpElement for ParametersTlv {
    fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, k1) = be_u8(input)?;
        let (input, k2) = be_u8(input)?;
        let (input, k3) = be_u8(input)?;
        let (input, k4) = be_u8(input)?;
        let (input, k5) = be_u8(input)?;
        let (input, _reserved) = be_u8(input)?;
        let (input, hold_time) = be_u16(input)?;
        Ok((
            input,
            Self {
                k_values: KValues { k1, k2, k3, k4, k5 },
                hold_time,
            },
        ))
    }

    fn pack(&self) -> Vec<u8> {
        let k = &self.k_values;
        let mut buffer = Vec::with_capacity(8);
        buffer.extend_from_slice(&[k.k1, k.k2, k.k3, k.k4, k.k5, 0]);
        buffer.extend_from_slice(&self.hold_time.to_be_bytes());
        buffer
    }
}
