#![no_std]
extern crate alloc;

pub mod macros;

use alloc::string::{
    String,
    ToString,
};
use core::{
    fmt::{
        Debug,
        Display,
        Formatter,
    },
    net::{
        AddrParseError,
        Ipv4Addr,
    },
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("expected format <address>/<mask> (e.g. 10.0.0.0/24), got '{0}'")]
    InvalidPrefixFormat(String),
    #[error("unable to parse address => '{0}'")]
    IpAddrParse(#[from] AddrParseError),
    #[error("unable to parse int => '{0}'")]
    IntParse(#[from] ParseIntError),
    #[error("prefix length {0} is not valid for IPv4 (must be 0..=32)")]
    InvalidPrefixLength(u8),
}

/// An IPv4 network prefix: an address together with the number of significant leading bits.
/// EIGRP carries no IPv6 address family (spec non-goal), so unlike a general-purpose prefix
/// type this one is IPv4-only.
#[derive(Ord, PartialOrd, Eq, PartialEq, Hash, Clone, Copy)]
pub struct Ipv4Prefix {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

impl Ipv4Prefix {
    pub const DEFAULT_ROUTE: Ipv4Prefix = Ipv4Prefix {
        address: Ipv4Addr::new(0, 0, 0, 0),
        prefix_len: 0,
    };

    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self, CommonError> {
        if prefix_len > 32 {
            return Err(CommonError::InvalidPrefixLength(prefix_len));
        }
        Ok(Self { address, prefix_len })
    }

    /// Number of bytes a variable-length wire encoding of this prefix occupies: `ceil(prefix_len / 8)`.
    pub fn wire_octets(&self) -> usize {
        ((self.prefix_len as usize) + 7) / 8
    }

    /// Whether `address` falls within this prefix's network.
    pub fn contains(&self, address: Ipv4Addr) -> bool {
        if self.prefix_len == 0 {
            return true;
        }
        let mask = u32::MAX.checked_shl(32 - self.prefix_len as u32).unwrap_or(0);
        (u32::from(address) & mask) == (u32::from(self.address) & mask)
    }
}

impl FromStr for Ipv4Prefix {
    type Err = CommonError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let (addr, mask) = string.split_once('/').ok_or_else(|| CommonError::InvalidPrefixFormat(string.to_string()))?;
        Self::new(addr.parse()?, mask.parse()?)
    }
}

impl Debug for Ipv4Prefix {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> core::fmt::Result {
        write!(formatter, "{}/{}", self.address, self.prefix_len)
    }
}

impl Display for Ipv4Prefix {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> core::fmt::Result {
        write!(formatter, "{}/{}", self.address, self.prefix_len)
    }
}
