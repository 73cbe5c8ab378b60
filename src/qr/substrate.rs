//! Substrate QR messages
//!
//! The chain byte doubles as the signature scheme (0x00 ed25519, 0x01
//! sr25519, 0x02 ecdsa), matching the substrate signer convention.
//!
//! Sign requests carry the signing payload as the plan and append the
//! merkleized metadata proof, so the device can decode the call without
//! holding full runtime metadata:
//!
//! ```text
//! [prelude: 3 bytes]
//! [account_index: 4 bytes LE]
//! [payload_hash: 32 bytes]            - blake2b-256 of the signing payload
//! [payload_len: 4 bytes LE][payload]
//! [summary_len: 2 bytes LE][summary]
//! [proof_len: 4 bytes LE][proof]
//! ```

use serde::{Deserialize, Serialize};

use super::sign_request::hex_vec;
use super::{
    finish_payload, read_label, read_signatures, registry, write_label, write_signatures,
    ChainFamily, FixedBytes, MessageKind, SignRequest, Signature64, CHAIN_SUBSTRATE_ECDSA,
    CHAIN_SUBSTRATE_ED25519, CHAIN_SUBSTRATE_SR25519, PROTOCOL_MARKER, TYPE_FVK_EXPORT,
    TYPE_SIGNATURES, TYPE_SIGN_REQUEST,
};
use crate::codec::{Reader, Writer};
use crate::error::QrError;

/// SS58 prefixes are 14-bit.
pub const MAX_SS58_PREFIX: u16 = 16383;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubstrateCrypto {
    Ed25519,
    Sr25519,
    Ecdsa,
}

impl SubstrateCrypto {
    pub fn chain_byte(&self) -> u8 {
        match self {
            Self::Ed25519 => CHAIN_SUBSTRATE_ED25519,
            Self::Sr25519 => CHAIN_SUBSTRATE_SR25519,
            Self::Ecdsa => CHAIN_SUBSTRATE_ECDSA,
        }
    }

    pub fn from_chain_byte(byte: u8) -> Option<Self> {
        match byte {
            CHAIN_SUBSTRATE_ED25519 => Some(Self::Ed25519),
            CHAIN_SUBSTRATE_SR25519 => Some(Self::Sr25519),
            CHAIN_SUBSTRATE_ECDSA => Some(Self::Ecdsa),
            _ => None,
        }
    }

    /// MultiSignature variant index.
    pub fn multi_signature_index(&self) -> u8 {
        match self {
            Self::Ed25519 => 0,
            Self::Sr25519 => 1,
            Self::Ecdsa => 2,
        }
    }
}

fn crypto_of(data: &[u8]) -> Result<SubstrateCrypto, QrError> {
    data.get(1)
        .copied()
        .and_then(SubstrateCrypto::from_chain_byte)
        .ok_or_else(|| QrError::BadPrelude("not a substrate chain byte".into()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstrateFvkExport {
    pub crypto: SubstrateCrypto,
    pub account_index: u32,
    pub label: Option<String>,
    pub public_key: FixedBytes<32>,
    pub ss58_prefix: u16,
    pub genesis_hash: FixedBytes<32>,
}

impl SubstrateFvkExport {
    pub fn encode_qr(&self) -> Result<Vec<u8>, QrError> {
        let mut w =
            Writer::with_prelude([PROTOCOL_MARKER, self.crypto.chain_byte(), TYPE_FVK_EXPORT]);
        if self.ss58_prefix > MAX_SS58_PREFIX {
            return Err(QrError::invalid_field(
                "ss58 prefix",
                format!("{} exceeds 14 bits", self.ss58_prefix),
            ));
        }
        w.u32_le(self.account_index);
        write_label(&mut w, &self.label)?;
        w.bytes(self.public_key.as_bytes());
        w.u16_le(self.ss58_prefix);
        w.bytes(self.genesis_hash.as_bytes());
        Ok(finish_payload(w, "substrate fvk export"))
    }

    pub fn decode_qr(data: &[u8]) -> Result<Self, QrError> {
        registry::expect(data, ChainFamily::Substrate, MessageKind::FvkExport)?;
        let crypto = crypto_of(data)?;
        let mut r = Reader::at(data, 3);
        let account_index = r.u32_le()?;
        let label = read_label(&mut r)?;
        let public_key = FixedBytes(r.array::<32>()?);
        let ss58_prefix = r.u16_le()?;
        if ss58_prefix > MAX_SS58_PREFIX {
            return Err(QrError::invalid_field(
                "ss58 prefix",
                format!("{} exceeds 14 bits", ss58_prefix),
            ));
        }
        let genesis_hash = FixedBytes(r.array::<32>()?);
        r.finish()?;
        Ok(Self {
            crypto,
            account_index,
            label,
            public_key,
            ss58_prefix,
            genesis_hash,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstrateSignRequest {
    pub crypto: SubstrateCrypto,
    pub request: SignRequest<32>,
    #[serde(with = "hex_vec")]
    pub metadata_proof: Vec<u8>,
}

impl SubstrateSignRequest {
    pub fn encode_qr(&self) -> Result<Vec<u8>, QrError> {
        let mut w =
            Writer::with_prelude([PROTOCOL_MARKER, self.crypto.chain_byte(), TYPE_SIGN_REQUEST]);
        self.request.write_body(&mut w)?;
        w.prefixed_u32(&self.metadata_proof)?;
        Ok(finish_payload(w, "substrate sign request"))
    }

    pub fn decode_qr(data: &[u8]) -> Result<Self, QrError> {
        registry::expect(data, ChainFamily::Substrate, MessageKind::SignRequest)?;
        let crypto = crypto_of(data)?;
        let mut r = Reader::at(data, 3);
        let request = SignRequest::read_body(&mut r)?;
        let metadata_proof = r.prefixed_u32()?.to_vec();
        r.finish()?;
        Ok(Self {
            crypto,
            request,
            metadata_proof,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstrateSignatures {
    pub crypto: SubstrateCrypto,
    pub payload_hash: FixedBytes<32>,
    pub signatures: Vec<Signature64>,
}

impl SubstrateSignatures {
    pub fn encode_qr(&self) -> Result<Vec<u8>, QrError> {
        let mut w =
            Writer::with_prelude([PROTOCOL_MARKER, self.crypto.chain_byte(), TYPE_SIGNATURES]);
        w.bytes(self.payload_hash.as_bytes());
        write_signatures(&mut w, &self.signatures)?;
        Ok(finish_payload(w, "substrate signatures"))
    }

    pub fn decode_qr(data: &[u8]) -> Result<Self, QrError> {
        registry::expect(data, ChainFamily::Substrate, MessageKind::Signatures)?;
        let crypto = crypto_of(data)?;
        let mut r = Reader::at(data, 3);
        let payload_hash = FixedBytes(r.array::<32>()?);
        let signatures = read_signatures(&mut r)?;
        r.finish()?;
        Ok(Self {
            crypto,
            payload_hash,
            signatures,
        })
    }
}
