//! Packet authentication: MD5 and HMAC-SHA256 digests over the wire bytes, and the replay guard
//! carried in the AUTH TLV's `key_sequence` field.
//!
//! The digest only ever sees byte ranges the caller assembles (header, the AUTH TLV with its
//! digest field zeroed, and whatever body bytes follow it); this module has no notion of
//! sockets, neighbors, or TLV parsing beyond that.

use alloc::vec::Vec;
use hmac::{
    Hmac,
    Mac,
};
use md5::{
    Digest,
    Md5,
};
use sha2::Sha256;

pub const MD5_DIGEST_LEN: usize = 16;
pub const SHA256_DIGEST_LEN: usize = 32;

/// Which digest algorithm the interface's authentication descriptor selects.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum AuthAlgorithm {
    Md5,
    Sha256,
}

/// Whether the peer has already seen our keys (`Basic`) or this is the very first INIT Update,
/// sent before the peer can possibly have verified a key (`UpdateInit`). The original Quagga
/// source names these `EIGRP_AUTH_BASIC_HELLO_FLAG` / `EIGRP_AUTH_UPDATE_INIT_FLAG`.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum DigestMode {
    Basic,
    UpdateInit,
}

/// Computes the MD5 digest per §4.A: for [`DigestMode::Basic`], MD5 over
/// `header_and_zeroed_auth_tlv || key || zero-pad-to-16 || rest_of_body`; for
/// [`DigestMode::UpdateInit`], MD5 over `header_and_zeroed_auth_tlv` alone (the peer cannot yet
/// verify keys, so none are mixed in).
pub fn md5_digest(header_and_zeroed_auth_tlv: &[u8], key: &[u8], rest_of_body: &[u8], mode: DigestMode) -> [u8; MD5_DIGEST_LEN] {
    let mut hasher = Md5::new();
    hasher.update(header_and_zeroed_auth_tlv);
    if mode == DigestMode::Basic {
        hasher.update(key);
        if key.len() < 16 {
            let mut pad = [0u8; 16];
            let pad_len = 16 - key.len();
            hasher.update(&pad[..pad_len]);
            pad.fill(0);
        }
        hasher.update(rest_of_body);
    }
    hasher.finalize().into()
}

/// HMAC-SHA256 over the same byte ranges the MD5 authenticator covers, keyed by the raw secret
/// (per the Open Question resolution in DESIGN.md — the original source mixes the key pointer
/// rather than its bytes, which is not interoperable and not what we implement).
pub fn sha256_digest(header_and_zeroed_auth_tlv: &[u8], key: &[u8], rest_of_body: &[u8], mode: DigestMode) -> [u8; SHA256_DIGEST_LEN] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).unwrap_or_else(|_| Hmac::<Sha256>::new_from_slice(&[]).expect("empty key is always valid"));
    mac.update(header_and_zeroed_auth_tlv);
    if mode == DigestMode::Basic {
        mac.update(rest_of_body);
    }
    mac.finalize().into_bytes().into()
}

/// Constant-time comparison so a timing side channel can't leak how many leading digest bytes
/// matched.
pub fn digest_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Computes a digest of the given algorithm, returning it as a `Vec` sized to the algorithm's
/// digest length.
pub fn digest(algorithm: AuthAlgorithm, header_and_zeroed_auth_tlv: &[u8], key: &[u8], rest_of_body: &[u8], mode: DigestMode) -> Vec<u8> {
    match algorithm {
        AuthAlgorithm::Md5 => md5_digest(header_and_zeroed_auth_tlv, key, rest_of_body, mode).to_vec(),
        AuthAlgorithm::Sha256 => sha256_digest(header_and_zeroed_auth_tlv, key, rest_of_body, mode).to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_basic_and_update_init_differ() {
        let header = [0u8; 24];
        let basic = md5_digest(&header, b"secret", b"body", DigestMode::Basic);
        let init = md5_digest(&header, b"secret", b"body", DigestMode::UpdateInit);
        assert_ne!(basic, init);
    }

    #[test]
    fn md5_is_deterministic() {
        let header = [1u8, 2, 3, 4];
        let a = md5_digest(&header, b"key", b"rest", DigestMode::Basic);
        let b = md5_digest(&header, b"key", b"rest", DigestMode::Basic);
        assert_eq!(a, b);
    }

    #[test]
    fn sha256_basic_and_update_init_differ() {
        let header = [0u8; 24];
        let basic = sha256_digest(&header, b"secret", b"body", DigestMode::Basic);
        let init = sha256_digest(&header, b"secret", b"body", DigestMode::UpdateInit);
        assert_ne!(basic, init);
    }

    #[test]
    fn digest_eq_detects_mismatch() {
        assert!(digest_eq(&[1, 2, 3], &[1, 2, 3]));
        assert!(!digest_eq(&[1, 2, 3], &[1, 2, 4]));
        assert!(!digest_eq(&[1, 2, 3], &[1, 2]));
    }
}
