//! Assembles a full EIGRP packet (header + TLV stream) and provides the checksum/authentication
//! glue the transport layer needs without reaching into TLV internals itself.

use crate::{
    auth::{
        self,
        AuthAlgorithm,
        DigestMode,
    },
    checksum,
    header::{
        EigrpHeader,
        HEADER_LEN,
    },
    tlv::{
        AuthTlv,
        Tlv,
    },
    EigrpElement,
};
use alloc::vec::Vec;
use nom::{
    multi::many0,
    IResult,
    Parser,
};

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct EigrpPacket {
    pub header: EigrpHeader,
    pub tlvs: Vec<Tlv>,
}

impl EigrpPacket {
    pub fn new(header: EigrpHeader, tlvs: Vec<Tlv>) -> Self {
        Self { header, tlvs }
    }

    /// The AUTH TLV, if this packet carries one. By convention (and per the original source) it
    /// is always the first TLV when present.
    pub fn auth_tlv(&self) -> Option<&AuthTlv> {
        self.tlvs.iter().find_map(|tlv| if let Tlv::Auth(auth) = tlv { Some(auth) } else { None })
    }

    /// Stamps a fresh (digest-zeroed) AUTH TLV at the front of the TLV stream, replacing any
    /// existing one. `pack_authenticated` fills in the real digest once this packet is otherwise
    /// final; called by the transport layer, never by a handler assembling route TLVs.
    pub fn with_auth(mut self, algorithm: AuthAlgorithm, key_id: u32, key_sequence: u32) -> Self {
        self.tlvs.retain(|tlv| !matches!(tlv, Tlv::Auth(_)));
        self.tlvs.insert(0, Tlv::Auth(AuthTlv::zeroed(algorithm, key_id, key_sequence)));
        self
    }

    /// Serializes the packet with the header checksum computed and, if an AUTH TLV is present,
    /// its digest filled in. `key` is the active send key for this packet's destination
    /// neighbor/interface; digest_mode distinguishes the INIT-Update case from everything else.
    pub fn pack_authenticated(&self, key: &[u8], digest_mode: DigestMode) -> Vec<u8> {
        let mut packet = self.clone();
        packet.header.checksum = 0;

        if let Some(auth) = packet.auth_tlv().cloned() {
            let zeroed = AuthTlv::zeroed(auth.algorithm, auth.key_id, auth.key_sequence);
            let bytes_with_zeroed_auth = packet.pack_with_auth_override(Some(zeroed.clone()));

            let auth_tlv_wire_len = TLV_HEADER_LEN + zeroed.pack().len();
            let header_and_zeroed_auth = &bytes_with_zeroed_auth[..HEADER_LEN + auth_tlv_wire_len];
            let rest_of_body = &bytes_with_zeroed_auth[HEADER_LEN + auth_tlv_wire_len..];

            let digest = auth::digest(auth.algorithm, header_and_zeroed_auth, key, rest_of_body, digest_mode);
            packet = packet.replace_auth_tlv(auth.clone().with_digest(digest));
        }

        let mut buffer = packet.pack();
        let checksum = checksum::internet_checksum(&buffer);
        buffer[2] = (checksum >> 8) as u8;
        buffer[3] = (checksum & 0xFF) as u8;
        buffer
    }

    /// Verifies a received packet's checksum and, if it carries an AUTH TLV, its digest, against
    /// `key` and the neighbor's replay guard `last_key_sequence`. Returns `Ok(())` only if both
    /// pass (or no authentication is configured, signaled by `key: None`).
    pub fn verify_authenticated(raw: &[u8], key: Option<&[u8]>, last_key_sequence: Option<u32>) -> Result<Self, AuthVerifyError> {
        let mut zeroed_checksum_buf = raw.to_vec();
        if zeroed_checksum_buf.len() < 4 {
            return Err(AuthVerifyError::Malformed);
        }
        let received_checksum = u16::from_be_bytes([raw[2], raw[3]]);
        zeroed_checksum_buf[2] = 0;
        zeroed_checksum_buf[3] = 0;
        if !checksum::verify(&zeroed_checksum_buf, received_checksum) {
            return Err(AuthVerifyError::ChecksumMismatch);
        }

        let (_, mut packet) = Self::unpack(raw).map_err(|_| AuthVerifyError::Malformed)?;
        packet.header.checksum = 0;

        match (packet.auth_tlv(), key) {
            (None, None) => Ok(packet),
            (None, Some(_)) => Err(AuthVerifyError::MissingAuth),
            (Some(_), None) => Err(AuthVerifyError::UnexpectedAuth),
            (Some(auth), Some(key)) => {
                if let Some(last) = last_key_sequence {
                    if auth.key_sequence <= last {
                        return Err(AuthVerifyError::Replay);
                    }
                }

                let zeroed = AuthTlv::zeroed(auth.algorithm, auth.key_id, auth.key_sequence);
                let bytes_with_zeroed_auth = packet.pack_with_auth_override(Some(zeroed.clone()));
                let auth_tlv_wire_len = TLV_HEADER_LEN + zeroed.pack().len();
                let header_and_zeroed_auth = &bytes_with_zeroed_auth[..HEADER_LEN + auth_tlv_wire_len];
                let rest_of_body = &bytes_with_zeroed_auth[HEADER_LEN + auth_tlv_wire_len..];

                let mode = if packet.header.flags.contains(crate::HeaderFlags::INIT) && matches!(packet.header.opcode, crate::Opcode::Update) {
                    DigestMode::UpdateInit
                } else {
                    DigestMode::Basic
                };

                let expected = auth::digest(auth.algorithm, header_and_zeroed_auth, key, rest_of_body, mode);
                if auth::digest_eq(&expected, &auth.digest) {
                    Ok(packet)
                } else {
                    Err(AuthVerifyError::DigestMismatch)
                }
            }
        }
    }

    fn replace_auth_tlv(&self, new_auth: AuthTlv) -> Self {
        let tlvs = self
            .tlvs
            .iter()
            .map(|tlv| if let Tlv::Auth(_) = tlv { Tlv::Auth(new_auth.clone()) } else { tlv.clone() })
            .collect();
        Self { header: self.header, tlvs }
    }

    fn pack_with_auth_override(&self, override_auth: Option<AuthTlv>) -> Vec<u8> {
        let mut buffer = self.header.pack();
        for tlv in &self.tlvs {
            match (tlv, &override_auth) {
                (Tlv::Auth(_), Some(replacement)) => buffer.extend(Tlv::Auth(replacement.clone()).pack()),
                _ => buffer.extend(tlv.pack()),
            }
        }
        buffer
    }
}

const TLV_HEADER_LEN: usize = 4;

impl EigrpElement for EigrpPacket {
    fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, header) = EigrpHeader::unpack(input)?;
        let (input, tlvs) = many0(Tlv::unpack).parse(input)?;
        Ok((input, Self { header, tlvs }))
    }

    fn pack(&self) -> Vec<u8> {
        self.pack_with_auth_override(None)
    }
}

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum AuthVerifyError {
    Malformed,
    ChecksumMismatch,
    MissingAuth,
    UnexpectedAuth,
    Replay,
    DigestMismatch,
}

#[cfg(all(feature = "std", test))]
mod tests {
    use super::*;
    use crate::{
        auth::AuthAlgorithm,
        header::HeaderFlags,
        tlv::ParametersTlv,
        Opcode,
    };

    fn sample_header(opcode: Opcode, flags: HeaderFlags) -> EigrpHeader {
        EigrpHeader {
            version: crate::header::EIGRP_VERSION,
            opcode,
            checksum: 0,
            flags,
            sequence: 1,
            ack: 0,
            virtual_router_id: 0,
            as_number: 100,
        }
    }

    #[test]
    fn unauthenticated_round_trip() {
        let packet = EigrpPacket::new(
            sample_header(Opcode::Hello, HeaderFlags::empty()),
            alloc::vec![Tlv::Parameters(ParametersTlv { k_values: crate::tlv::KValues::DEFAULT, hold_time: 15 })],
        );
        let bytes = packet.pack_authenticated(&[], DigestMode::Basic);
        let decoded = EigrpPacket::verify_authenticated(&bytes, None, None).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn authenticated_round_trip_with_md5() {
        let auth = AuthTlv::zeroed(AuthAlgorithm::Md5, 1, 1);
        let packet = EigrpPacket::new(sample_header(Opcode::Update, HeaderFlags::empty()), alloc::vec![Tlv::Auth(auth)]);
        let bytes = packet.pack_authenticated(b"secret", DigestMode::Basic);
        let decoded = EigrpPacket::verify_authenticated(&bytes, Some(b"secret"), Some(0)).unwrap();
        if let Some(auth) = decoded.auth_tlv() {
            assert_ne!(auth.digest, alloc::vec![0u8; auth::MD5_DIGEST_LEN]);
        } else {
            panic!("expected AUTH TLV");
        }
    }

    #[test]
    fn wrong_key_fails_verification() {
        let auth = AuthTlv::zeroed(AuthAlgorithm::Md5, 1, 1);
        let packet = EigrpPacket::new(sample_header(Opcode::Update, HeaderFlags::empty()), alloc::vec![Tlv::Auth(auth)]);
        let bytes = packet.pack_authenticated(b"secret", DigestMode::Basic);
        let result = EigrpPacket::verify_authenticated(&bytes, Some(b"wrong"), Some(0));
        assert_eq!(result, Err(AuthVerifyError::DigestMismatch));
    }

    #[test]
    fn replayed_key_sequence_is_rejected() {
        let auth = AuthTlv::zeroed(AuthAlgorithm::Md5, 1, 5);
        let packet = EigrpPacket::new(sample_header(Opcode::Update, HeaderFlags::empty()), alloc::vec![Tlv::Auth(auth)]);
        let bytes = packet.pack_authenticated(b"secret", DigestMode::Basic);
        let result = EigrpPacket::verify_authenticated(&bytes, Some(b"secret"), Some(5));
        assert_eq!(result, Err(AuthVerifyError::Replay));
    }

    #[test]
    fn init_update_digest_mode_is_used_for_init_updates() {
        let auth = AuthTlv::zeroed(AuthAlgorithm::Md5, 1, 1);
        let packet = EigrpPacket::new(sample_header(Opcode::Update, HeaderFlags::INIT), alloc::vec![Tlv::Auth(auth)]);
        let bytes = packet.pack_authenticated(b"secret", DigestMode::UpdateInit);
        let decoded = EigrpPacket::verify_authenticated(&bytes, Some(b"secret"), Some(0));
        assert!(decoded.is_ok());
    }
}
