//! AUTH TLV (0x0002): the packet authenticator, carried immediately after the header on every
//! outbound packet when the interface's authentication mode is MD5 or SHA-256.

use crate::{
    auth::{
        AuthAlgorithm,
        MD5_DIGEST_LEN,
        SHA256_DIGEST_LEN,
    },
    EigrpElement,
};
use alloc::{
    vec,
    vec::Vec,
};
use nom::{
    bytes::complete::take,
    number::complete::{
        be_u16,
        be_u32,
    },
    IResult,
};

pub const TLV_TYPE: u16 = 0x0002;

const AUTH_TYPE_MD5: u16 = 2;
const AUTH_TYPE_SHA256: u16 = 3;
const NULL_PAD_LEN: usize = 12;

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct AuthTlv {
    pub algorithm: AuthAlgorithm,
    pub key_id: u32,
    pub key_sequence: u32,
    pub digest: Vec<u8>,
}

impl AuthTlv {
    /// Builds an AUTH TLV with the digest field zeroed, ready to be packed for the
    /// digest-computation pass (the digest itself is never part of its own input).
    pub fn zeroed(algorithm: AuthAlgorithm, key_id: u32, key_sequence: u32) -> Self {
        let digest_len = match algorithm {
            AuthAlgorithm::Md5 => MD5_DIGEST_LEN,
            AuthAlgorithm::Sha256 => SHA256_DIGEST_LEN,
        };
        Self {
            algorithm,
            key_id,
            key_sequence,
            digest: vec![0u8; digest_len],
        }
    }

    pub fn with_digest(mut self, digest: Vec<u8>) -> Self {
        self.digest = digest;
        self
    }
}

impl EigrpElement for AuthTlv {
    fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, auth_type) = be_u16(input)?;
        let (input, auth_length) = be_u16(input)?;
        let (input, key_id) = be_u32(input)?;
        let (input, key_sequence) = be_u32(input)?;
        let (input, _null_pad) = take(NULL_PAD_LEN)(input)?;

        let digest_len = (auth_length as usize).saturating_sub(2 + 2 + 4 + 4 + NULL_PAD_LEN);
        let (input, digest) = take(digest_len)(input)?;
        let algorithm = match auth_type {
            AUTH_TYPE_SHA256 => AuthAlgorithm::Sha256,
            _ => AuthAlgorithm::Md5,
        };
        Ok((
            input,
            Self {
                algorithm,
                key_id,
                key_sequence,
                digest: digest.to_vec(),
            },
        ))
    }

    fn pack(&self) -> Vec<u8> {
        let auth_type: u16 = match self.algorithm {
            AuthAlgorithm::Md5 => AUTH_TYPE_MD5,
            AuthAlgorithm::Sha256 => AUTH_TYPE_SHA256,
        };
        let auth_length = (2 + 2 + 4 + 4 + NULL_PAD_LEN + self.digest.len()) as u16;

        let mut buffer = Vec::with_capacity(auth_length as usize);
        buffer.extend_from_slice(&auth_type.to_be_bytes());
        buffer.extend_from_slice(&auth_length.to_be_bytes());
        buffer.extend_from_slice(&self.key_id.to_be_bytes());
        buffer.extend_from_slice(&self.key_sequence.to_be_bytes());
        buffer.extend_from_slice(&[0u8; NULL_PAD_LEN]);
        buffer.extend_from_slice(&self.digest);
        buffer
    }
}
