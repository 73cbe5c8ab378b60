//! QR message framing
//!
//! Every payload starts with a three byte prelude:
//!
//! ```text
//! [0x53]        - protocol marker (substrate-compatible 'S')
//! [chain]       - 0x00/0x01/0x02 substrate (ed25519/sr25519/ecdsa),
//!                 0x03 penumbra, 0x04 zcash, 0x05 cosmos
//! [type]        - 0x01 fvk export, 0x02 sign request, 0x03 signatures,
//!                 0x04 schema digest, 0x05 schema update (penumbra only)
//! ```
//!
//! Dispatch goes through the single table in [`registry`]; the family
//! modules own the field layouts that follow the prelude.

pub mod cosmos;
pub mod penumbra;
pub mod registry;
pub mod schema;
pub mod sign_request;
pub mod substrate;
pub mod zcash;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::codec::{self, Reader, Writer};
use crate::error::QrError;

pub use registry::{decode_qr, decode_qr_hex, detect_chain, detect_message_type, MESSAGE_TABLE};
pub use sign_request::SignRequest;

/// Protocol marker shared by every payload.
pub const PROTOCOL_MARKER: u8 = 0x53;

/// Practical binary capacity of a single QR frame (version 40, level L).
pub const QR_FRAME_CAPACITY: usize = 2953;

pub const CHAIN_SUBSTRATE_ED25519: u8 = 0x00;
pub const CHAIN_SUBSTRATE_SR25519: u8 = 0x01;
pub const CHAIN_SUBSTRATE_ECDSA: u8 = 0x02;
pub const CHAIN_PENUMBRA: u8 = 0x03;
pub const CHAIN_ZCASH: u8 = 0x04;
pub const CHAIN_COSMOS: u8 = 0x05;

pub const TYPE_FVK_EXPORT: u8 = 0x01;
pub const TYPE_SIGN_REQUEST: u8 = 0x02;
pub const TYPE_SIGNATURES: u8 = 0x03;
pub const TYPE_SCHEMA_DIGEST: u8 = 0x04;
pub const TYPE_SCHEMA_UPDATE: u8 = 0x05;

/// Chain family a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Substrate,
    Penumbra,
    Zcash,
    Cosmos,
}

impl ChainFamily {
    pub fn from_chain_byte(byte: u8) -> Option<Self> {
        match byte {
            CHAIN_SUBSTRATE_ED25519 | CHAIN_SUBSTRATE_SR25519 | CHAIN_SUBSTRATE_ECDSA => {
                Some(Self::Substrate)
            }
            CHAIN_PENUMBRA => Some(Self::Penumbra),
            CHAIN_ZCASH => Some(Self::Zcash),
            CHAIN_COSMOS => Some(Self::Cosmos),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Substrate => "substrate",
            Self::Penumbra => "penumbra",
            Self::Zcash => "zcash",
            Self::Cosmos => "cosmos",
        }
    }
}

/// Message type carried in the third prelude byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    FvkExport,
    SignRequest,
    Signatures,
    SchemaDigest,
    SchemaUpdate,
}

impl MessageKind {
    pub fn from_type_byte(byte: u8) -> Option<Self> {
        match byte {
            TYPE_FVK_EXPORT => Some(Self::FvkExport),
            TYPE_SIGN_REQUEST => Some(Self::SignRequest),
            TYPE_SIGNATURES => Some(Self::Signatures),
            TYPE_SCHEMA_DIGEST => Some(Self::SchemaDigest),
            TYPE_SCHEMA_UPDATE => Some(Self::SchemaUpdate),
            _ => None,
        }
    }

    pub fn type_byte(&self) -> u8 {
        match self {
            Self::FvkExport => TYPE_FVK_EXPORT,
            Self::SignRequest => TYPE_SIGN_REQUEST,
            Self::Signatures => TYPE_SIGNATURES,
            Self::SchemaDigest => TYPE_SCHEMA_DIGEST,
            Self::SchemaUpdate => TYPE_SCHEMA_UPDATE,
        }
    }
}

/// Every decodable payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum QrMessage {
    PenumbraFvkExport(penumbra::PenumbraFvkExport),
    PenumbraSignRequest(SignRequest<64>),
    PenumbraSignatures(penumbra::PenumbraSignatures),
    PenumbraSchemaDigest(schema::SchemaDigest),
    PenumbraSchemaUpdate(schema::SchemaUpdate),
    ZcashFvkExport(zcash::ZcashFvkExport),
    ZcashSignRequest(SignRequest<32>),
    ZcashSignatures(zcash::ZcashSignatures),
    CosmosFvkExport(cosmos::CosmosFvkExport),
    CosmosSignRequest(SignRequest<32>),
    CosmosSignatures(SignatureList),
    SubstrateFvkExport(substrate::SubstrateFvkExport),
    SubstrateSignRequest(substrate::SubstrateSignRequest),
    SubstrateSignatures(substrate::SubstrateSignatures),
}

impl QrMessage {
    pub fn family(&self) -> ChainFamily {
        match self {
            Self::PenumbraFvkExport(_)
            | Self::PenumbraSignRequest(_)
            | Self::PenumbraSignatures(_)
            | Self::PenumbraSchemaDigest(_)
            | Self::PenumbraSchemaUpdate(_) => ChainFamily::Penumbra,
            Self::ZcashFvkExport(_) | Self::ZcashSignRequest(_) | Self::ZcashSignatures(_) => {
                ChainFamily::Zcash
            }
            Self::CosmosFvkExport(_) | Self::CosmosSignRequest(_) | Self::CosmosSignatures(_) => {
                ChainFamily::Cosmos
            }
            Self::SubstrateFvkExport(_)
            | Self::SubstrateSignRequest(_)
            | Self::SubstrateSignatures(_) => ChainFamily::Substrate,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::PenumbraFvkExport(_)
            | Self::ZcashFvkExport(_)
            | Self::CosmosFvkExport(_)
            | Self::SubstrateFvkExport(_) => MessageKind::FvkExport,
            Self::PenumbraSignRequest(_)
            | Self::ZcashSignRequest(_)
            | Self::CosmosSignRequest(_)
            | Self::SubstrateSignRequest(_) => MessageKind::SignRequest,
            Self::PenumbraSignatures(_)
            | Self::ZcashSignatures(_)
            | Self::CosmosSignatures(_)
            | Self::SubstrateSignatures(_) => MessageKind::Signatures,
            Self::PenumbraSchemaDigest(_) => MessageKind::SchemaDigest,
            Self::PenumbraSchemaUpdate(_) => MessageKind::SchemaUpdate,
        }
    }

    /// Digest a sign request asks for or a signature response answers.
    pub fn digest(&self) -> Option<&[u8]> {
        match self {
            Self::PenumbraSignRequest(r) => Some(r.digest.as_bytes()),
            Self::PenumbraSignatures(s) => Some(s.effect_hash.as_bytes()),
            Self::ZcashSignRequest(r) | Self::CosmosSignRequest(r) => Some(r.digest.as_bytes()),
            Self::ZcashSignatures(s) => Some(s.sighash.as_bytes()),
            Self::CosmosSignatures(s) => Some(s.digest.as_bytes()),
            Self::SubstrateSignRequest(r) => Some(r.request.digest.as_bytes()),
            Self::SubstrateSignatures(s) => Some(s.payload_hash.as_bytes()),
            _ => None,
        }
    }
}

/// Fixed-size byte array, serialized as hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedBytes<const N: usize>(pub [u8; N]);

impl<const N: usize> FixedBytes<N> {
    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        codec::bytes_to_hex(&self.0)
    }
}

impl<const N: usize> From<[u8; N]> for FixedBytes<N> {
    fn from(bytes: [u8; N]) -> Self {
        Self(bytes)
    }
}

impl<const N: usize> std::fmt::Debug for FixedBytes<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl<const N: usize> Serialize for FixedBytes<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de, const N: usize> Deserialize<'de> for FixedBytes<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let raw = codec::hex_to_bytes(&s).map_err(serde::de::Error::custom)?;
        let arr: [u8; N] = raw
            .try_into()
            .map_err(|v: Vec<u8>| serde::de::Error::invalid_length(v.len(), &"fixed-size hex"))?;
        Ok(Self(arr))
    }
}

pub type Signature64 = FixedBytes<64>;

/// Digest plus a u16-counted list of 64-byte signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureList {
    pub digest: FixedBytes<32>,
    pub signatures: Vec<Signature64>,
}

impl SignatureList {
    pub fn encode_qr(&self) -> Result<Vec<u8>, QrError> {
        let mut w = Writer::with_prelude([PROTOCOL_MARKER, CHAIN_COSMOS, TYPE_SIGNATURES]);
        w.bytes(self.digest.as_bytes());
        write_signatures(&mut w, &self.signatures)?;
        Ok(finish_payload(w, "cosmos signatures"))
    }

    pub fn decode_qr(data: &[u8]) -> Result<Self, QrError> {
        registry::expect(data, ChainFamily::Cosmos, MessageKind::Signatures)?;
        let mut r = Reader::at(data, 3);
        let digest = FixedBytes(r.array::<32>()?);
        let signatures = read_signatures(&mut r)?;
        r.finish()?;
        Ok(Self { digest, signatures })
    }
}

pub(crate) fn write_signatures(w: &mut Writer, sigs: &[Signature64]) -> Result<(), QrError> {
    let count = u16::try_from(sigs.len())
        .map_err(|_| QrError::invalid_field("signatures", "more than 65535 signatures"))?;
    w.u16_le(count);
    for sig in sigs {
        w.bytes(sig.as_bytes());
    }
    Ok(())
}

pub(crate) fn read_signatures(r: &mut Reader<'_>) -> Result<Vec<Signature64>, QrError> {
    let count = r.u16_le()? as usize;
    // reject counts the buffer cannot hold before allocating
    if count * 64 > r.remaining() {
        return Err(crate::error::CodecError::Truncated {
            offset: r.offset(),
            needed: count * 64,
            available: r.remaining(),
        }
        .into());
    }
    (0..count)
        .map(|_| Ok(FixedBytes(r.array::<64>()?)))
        .collect()
}

/// Optional label: a zero-length field means "no label", so `Some("")` has
/// no encoding and is rejected.
pub(crate) fn write_label(w: &mut Writer, label: &Option<String>) -> Result<(), QrError> {
    match label {
        Some(l) if l.is_empty() => {
            return Err(QrError::invalid_field("label", "empty; use no label instead"));
        }
        Some(l) => {
            w.prefixed_u8(l.as_bytes())
                .map_err(|_| QrError::invalid_field("label", "longer than 255 bytes"))?;
        }
        None => {
            w.u8(0);
        }
    }
    Ok(())
}

pub(crate) fn read_label(r: &mut Reader<'_>) -> Result<Option<String>, QrError> {
    let label = r.string_u8()?;
    Ok(if label.is_empty() { None } else { Some(label) })
}

/// Finalize an encoded payload, warning when it will not fit one QR frame.
pub(crate) fn finish_payload(w: Writer, what: &str) -> Vec<u8> {
    let bytes = w.into_bytes();
    if bytes.len() > QR_FRAME_CAPACITY {
        log::warn!(
            "{} payload is {} bytes, exceeds single QR frame capacity of {} bytes",
            what,
            bytes.len(),
            QR_FRAME_CAPACITY
        );
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_field() {
        let mut w = Writer::new();
        write_label(&mut w, &Some("savings".into())).unwrap();
        write_label(&mut w, &None).unwrap();
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(read_label(&mut r).unwrap(), Some("savings".to_string()));
        assert_eq!(read_label(&mut r).unwrap(), None);

        let mut w = Writer::new();
        assert!(matches!(
            write_label(&mut w, &Some(String::new())),
            Err(QrError::InvalidField { field: "label", .. })
        ));
        assert!(matches!(
            write_label(&mut w, &Some("x".repeat(256))),
            Err(QrError::InvalidField { field: "label", .. })
        ));
    }

    #[test]
    fn test_fixed_bytes_serde_hex() {
        let fb = FixedBytes([0xabu8; 4]);
        let json = serde_json::to_string(&fb).unwrap();
        assert_eq!(json, "\"abababab\"");
        let back: FixedBytes<4> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fb);
        assert!(serde_json::from_str::<FixedBytes<4>>("\"abab\"").is_err());
    }

    #[test]
    fn test_cosmos_signature_list() {
        let list = SignatureList {
            digest: FixedBytes([7u8; 32]),
            signatures: vec![FixedBytes([1u8; 64])],
        };
        let encoded = list.encode_qr().unwrap();
        assert_eq!(&encoded[..3], &[0x53, 0x05, 0x03]);
        assert_eq!(SignatureList::decode_qr(&encoded).unwrap(), list);
    }

    #[test]
    fn test_signature_count_exceeding_payload() {
        let mut data = vec![0x53, 0x05, 0x03];
        data.extend_from_slice(&[0u8; 32]);
        data.extend_from_slice(&500u16.to_le_bytes());
        data.extend_from_slice(&[0u8; 64]);
        assert!(SignatureList::decode_qr(&data).is_err());
    }
}
