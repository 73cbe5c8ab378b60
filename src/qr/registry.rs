//! Authoritative (chain byte, type byte) dispatch table
//!
//! Adding a chain or message type is one row here plus the family codec.

use super::{
    cosmos, penumbra, schema, substrate, zcash, ChainFamily, MessageKind, QrMessage,
    SignatureList, CHAIN_COSMOS, CHAIN_PENUMBRA, CHAIN_SUBSTRATE_ECDSA,
    CHAIN_SUBSTRATE_ED25519, CHAIN_SUBSTRATE_SR25519, CHAIN_ZCASH, PROTOCOL_MARKER,
    TYPE_FVK_EXPORT, TYPE_SCHEMA_DIGEST, TYPE_SCHEMA_UPDATE, TYPE_SIGNATURES, TYPE_SIGN_REQUEST,
};
use crate::codec;
use crate::error::QrError;

pub type DecodeFn = fn(&[u8]) -> Result<QrMessage, QrError>;

/// One row of the dispatch table.
#[derive(Debug)]
pub struct MessageSpec {
    pub chain: u8,
    pub message_type: u8,
    pub family: ChainFamily,
    pub kind: MessageKind,
    /// Smallest well-formed payload, prelude included.
    pub min_len: usize,
    pub decode: DecodeFn,
}

const PRELUDE: usize = 3;

pub const MESSAGE_TABLE: &[MessageSpec] = &[
    // penumbra
    MessageSpec {
        chain: CHAIN_PENUMBRA,
        message_type: TYPE_FVK_EXPORT,
        family: ChainFamily::Penumbra,
        kind: MessageKind::FvkExport,
        min_len: PRELUDE + 4 + 1 + 64 + 32,
        decode: |d| penumbra::PenumbraFvkExport::decode_qr(d).map(QrMessage::PenumbraFvkExport),
    },
    MessageSpec {
        chain: CHAIN_PENUMBRA,
        message_type: TYPE_SIGN_REQUEST,
        family: ChainFamily::Penumbra,
        kind: MessageKind::SignRequest,
        min_len: PRELUDE + 4 + 64 + 4 + 2,
        decode: |d| penumbra::decode_sign_request(d).map(QrMessage::PenumbraSignRequest),
    },
    MessageSpec {
        chain: CHAIN_PENUMBRA,
        message_type: TYPE_SIGNATURES,
        family: ChainFamily::Penumbra,
        kind: MessageKind::Signatures,
        min_len: PRELUDE + 64 + 2 + 2 + 2,
        decode: |d| penumbra::PenumbraSignatures::decode_qr(d).map(QrMessage::PenumbraSignatures),
    },
    MessageSpec {
        chain: CHAIN_PENUMBRA,
        message_type: TYPE_SCHEMA_DIGEST,
        family: ChainFamily::Penumbra,
        kind: MessageKind::SchemaDigest,
        min_len: PRELUDE + 2 + 2 + 32 + 32 + 1,
        decode: |d| schema::SchemaDigest::decode_qr(d).map(QrMessage::PenumbraSchemaDigest),
    },
    MessageSpec {
        chain: CHAIN_PENUMBRA,
        message_type: TYPE_SCHEMA_UPDATE,
        family: ChainFamily::Penumbra,
        kind: MessageKind::SchemaUpdate,
        min_len: PRELUDE + 2 + 2,
        decode: |d| schema::SchemaUpdate::decode_qr(d).map(QrMessage::PenumbraSchemaUpdate),
    },
    // zcash
    MessageSpec {
        chain: CHAIN_ZCASH,
        message_type: TYPE_FVK_EXPORT,
        family: ChainFamily::Zcash,
        kind: MessageKind::FvkExport,
        min_len: PRELUDE + 4 + 1 + 1,
        decode: |d| zcash::ZcashFvkExport::decode_qr(d).map(QrMessage::ZcashFvkExport),
    },
    MessageSpec {
        chain: CHAIN_ZCASH,
        message_type: TYPE_SIGN_REQUEST,
        family: ChainFamily::Zcash,
        kind: MessageKind::SignRequest,
        min_len: PRELUDE + 4 + 32 + 4 + 2,
        decode: |d| zcash::decode_sign_request(d).map(QrMessage::ZcashSignRequest),
    },
    MessageSpec {
        chain: CHAIN_ZCASH,
        message_type: TYPE_SIGNATURES,
        family: ChainFamily::Zcash,
        kind: MessageKind::Signatures,
        min_len: PRELUDE + 32 + 2 + 2 + 1,
        decode: |d| zcash::ZcashSignatures::decode_qr(d).map(QrMessage::ZcashSignatures),
    },
    // cosmos
    MessageSpec {
        chain: CHAIN_COSMOS,
        message_type: TYPE_FVK_EXPORT,
        family: ChainFamily::Cosmos,
        kind: MessageKind::FvkExport,
        min_len: PRELUDE + 4 + 1 + 33 + 1,
        decode: |d| cosmos::CosmosFvkExport::decode_qr(d).map(QrMessage::CosmosFvkExport),
    },
    MessageSpec {
        chain: CHAIN_COSMOS,
        message_type: TYPE_SIGN_REQUEST,
        family: ChainFamily::Cosmos,
        kind: MessageKind::SignRequest,
        min_len: PRELUDE + 4 + 32 + 4 + 2,
        decode: |d| cosmos::decode_sign_request(d).map(QrMessage::CosmosSignRequest),
    },
    MessageSpec {
        chain: CHAIN_COSMOS,
        message_type: TYPE_SIGNATURES,
        family: ChainFamily::Cosmos,
        kind: MessageKind::Signatures,
        min_len: PRELUDE + 32 + 2,
        decode: |d| SignatureList::decode_qr(d).map(QrMessage::CosmosSignatures),
    },
    // substrate, one row per signature scheme
    substrate_fvk(CHAIN_SUBSTRATE_ED25519),
    substrate_fvk(CHAIN_SUBSTRATE_SR25519),
    substrate_fvk(CHAIN_SUBSTRATE_ECDSA),
    substrate_sign_request(CHAIN_SUBSTRATE_ED25519),
    substrate_sign_request(CHAIN_SUBSTRATE_SR25519),
    substrate_sign_request(CHAIN_SUBSTRATE_ECDSA),
    substrate_signatures(CHAIN_SUBSTRATE_ED25519),
    substrate_signatures(CHAIN_SUBSTRATE_SR25519),
    substrate_signatures(CHAIN_SUBSTRATE_ECDSA),
];

const fn substrate_fvk(chain: u8) -> MessageSpec {
    MessageSpec {
        chain,
        message_type: TYPE_FVK_EXPORT,
        family: ChainFamily::Substrate,
        kind: MessageKind::FvkExport,
        min_len: PRELUDE + 4 + 1 + 32 + 2 + 32,
        decode: |d| substrate::SubstrateFvkExport::decode_qr(d).map(QrMessage::SubstrateFvkExport),
    }
}

const fn substrate_sign_request(chain: u8) -> MessageSpec {
    MessageSpec {
        chain,
        message_type: TYPE_SIGN_REQUEST,
        family: ChainFamily::Substrate,
        kind: MessageKind::SignRequest,
        min_len: PRELUDE + 4 + 32 + 4 + 2 + 4,
        decode: |d| {
            substrate::SubstrateSignRequest::decode_qr(d).map(QrMessage::SubstrateSignRequest)
        },
    }
}

const fn substrate_signatures(chain: u8) -> MessageSpec {
    MessageSpec {
        chain,
        message_type: TYPE_SIGNATURES,
        family: ChainFamily::Substrate,
        kind: MessageKind::Signatures,
        min_len: PRELUDE + 32 + 2,
        decode: |d| {
            substrate::SubstrateSignatures::decode_qr(d).map(QrMessage::SubstrateSignatures)
        },
    }
}

/// Look up the table row for a payload; `None` for anything that is not a
/// complete, known message. Never panics.
pub fn lookup(data: &[u8]) -> Option<&'static MessageSpec> {
    if data.len() < PRELUDE || data[0] != PROTOCOL_MARKER {
        return None;
    }
    MESSAGE_TABLE
        .iter()
        .find(|spec| spec.chain == data[1] && spec.message_type == data[2])
        .filter(|spec| data.len() >= spec.min_len)
}

/// Decode any known payload.
pub fn decode_qr(data: &[u8]) -> Result<QrMessage, QrError> {
    let spec = validate_prelude(data)?;
    (spec.decode)(data)
}

pub fn decode_qr_hex(hex_str: &str) -> Result<QrMessage, QrError> {
    let data = codec::hex_to_bytes(hex_str)?;
    decode_qr(&data)
}

/// Chain family of a scanned payload, or `None` for anything unrecognised.
pub fn detect_chain(hex_str: &str) -> Option<ChainFamily> {
    let data = codec::hex_to_bytes(hex_str).ok()?;
    lookup(&data).map(|spec| spec.family)
}

/// Message type of a scanned payload, or `None` for anything unrecognised.
pub fn detect_message_type(hex_str: &str) -> Option<MessageKind> {
    let data = codec::hex_to_bytes(hex_str).ok()?;
    lookup(&data).map(|spec| spec.kind)
}

fn validate_prelude(data: &[u8]) -> Result<&'static MessageSpec, QrError> {
    if data.len() < PRELUDE {
        return Err(QrError::BadPrelude(format!(
            "payload is {} bytes, prelude needs {}",
            data.len(),
            PRELUDE
        )));
    }
    if data[0] != PROTOCOL_MARKER {
        return Err(QrError::BadPrelude(format!(
            "protocol marker 0x{:02x}, expected 0x{:02x}",
            data[0], PROTOCOL_MARKER
        )));
    }
    let spec = MESSAGE_TABLE
        .iter()
        .find(|spec| spec.chain == data[1] && spec.message_type == data[2])
        .ok_or(QrError::UnknownMessage {
            chain: data[1],
            message_type: data[2],
        })?;
    if data.len() < spec.min_len {
        return Err(QrError::TooShort {
            kind: spec.kind,
            len: data.len(),
            min: spec.min_len,
        });
    }
    Ok(spec)
}

/// Validate a payload for a specific call site.
///
/// Distinguishes a corrupt payload from one that is valid but meant for a
/// different chain or message type.
pub fn expect(
    data: &[u8],
    family: ChainFamily,
    kind: MessageKind,
) -> Result<&'static MessageSpec, QrError> {
    if data.len() < PRELUDE {
        return Err(QrError::BadPrelude(format!(
            "payload is {} bytes, prelude needs {}",
            data.len(),
            PRELUDE
        )));
    }
    if data[0] != PROTOCOL_MARKER {
        return Err(QrError::BadPrelude(format!(
            "protocol marker 0x{:02x}, expected 0x{:02x}",
            data[0], PROTOCOL_MARKER
        )));
    }
    match ChainFamily::from_chain_byte(data[1]) {
        Some(found) if found != family => {
            return Err(QrError::WrongChain {
                expected: family,
                found,
            })
        }
        None => {
            return Err(QrError::BadPrelude(format!("unknown chain byte 0x{:02x}", data[1])))
        }
        _ => {}
    }
    match MessageKind::from_type_byte(data[2]) {
        Some(found) if found != kind => {
            return Err(QrError::WrongMessageType {
                expected: kind,
                found,
            })
        }
        None => {
            return Err(QrError::BadPrelude(format!(
                "unknown message type byte 0x{:02x}",
                data[2]
            )))
        }
        _ => {}
    }
    validate_prelude(data)
}
