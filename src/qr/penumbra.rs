//! Penumbra QR messages
//!
//! FVK export layout:
//!
//! ```text
//! [0x53][0x03][0x01]           - prelude
//! [account_index: 4 bytes LE]
//! [label_len: 1 byte][label]   - 0 = no label
//! [fvk: 64 bytes]              - ak || nk
//! [wallet_id: 32 bytes]
//! ```

use serde::{Deserialize, Serialize};

use super::{
    finish_payload, read_label, read_signatures, registry, write_label, write_signatures,
    ChainFamily, FixedBytes, MessageKind, SignRequest, Signature64, CHAIN_PENUMBRA,
    PROTOCOL_MARKER, TYPE_FVK_EXPORT, TYPE_SIGNATURES,
};
use crate::codec::{self, Reader, Writer};
use crate::error::QrError;

/// Penumbra effect hashes are 64 bytes.
pub type PenumbraSignRequest = SignRequest<64>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenumbraFvkExport {
    pub account_index: u32,
    pub label: Option<String>,
    pub fvk: FixedBytes<64>,
    pub wallet_id: FixedBytes<32>,
}

impl PenumbraFvkExport {
    pub fn encode_qr(&self) -> Result<Vec<u8>, QrError> {
        let mut w = Writer::with_prelude([PROTOCOL_MARKER, CHAIN_PENUMBRA, TYPE_FVK_EXPORT]);
        w.u32_le(self.account_index);
        write_label(&mut w, &self.label)?;
        w.bytes(self.fvk.as_bytes());
        w.bytes(self.wallet_id.as_bytes());
        Ok(finish_payload(w, "penumbra fvk export"))
    }

    pub fn decode_qr(data: &[u8]) -> Result<Self, QrError> {
        registry::expect(data, ChainFamily::Penumbra, MessageKind::FvkExport)?;
        let mut r = Reader::at(data, 3);
        let account_index = r.u32_le()?;
        let label = read_label(&mut r)?;
        let fvk = FixedBytes(r.array::<64>()?);
        let wallet_id = FixedBytes(r.array::<32>()?);
        r.finish()?;
        Ok(Self {
            account_index,
            label,
            fvk,
            wallet_id,
        })
    }

    pub fn encode_qr_hex(&self) -> Result<String, QrError> {
        Ok(codec::bytes_to_hex(&self.encode_qr()?))
    }

    pub fn decode_qr_hex(hex_str: &str) -> Result<Self, QrError> {
        Self::decode_qr(&codec::hex_to_bytes(hex_str)?)
    }
}

pub fn encode_sign_request(request: &PenumbraSignRequest) -> Result<Vec<u8>, QrError> {
    request.encode_qr(CHAIN_PENUMBRA)
}

pub fn decode_sign_request(data: &[u8]) -> Result<PenumbraSignRequest, QrError> {
    SignRequest::decode_for(data, ChainFamily::Penumbra)
}

/// Authorization data returned by the device.
///
/// ```text
/// [effect_hash: 64 bytes]
/// [spend_auth_count: 2 bytes LE][64 bytes each]
/// [delegator_vote_count: 2 bytes LE][64 bytes each]
/// [lqt_vote_count: 2 bytes LE][64 bytes each]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenumbraSignatures {
    pub effect_hash: FixedBytes<64>,
    pub spend_auths: Vec<Signature64>,
    pub delegator_vote_auths: Vec<Signature64>,
    pub lqt_vote_auths: Vec<Signature64>,
}

impl PenumbraSignatures {
    pub fn new(effect_hash: [u8; 64]) -> Self {
        Self {
            effect_hash: FixedBytes(effect_hash),
            spend_auths: Vec::new(),
            delegator_vote_auths: Vec::new(),
            lqt_vote_auths: Vec::new(),
        }
    }

    pub fn encode_qr(&self) -> Result<Vec<u8>, QrError> {
        let mut w = Writer::with_prelude([PROTOCOL_MARKER, CHAIN_PENUMBRA, TYPE_SIGNATURES]);
        w.bytes(self.effect_hash.as_bytes());
        write_signatures(&mut w, &self.spend_auths)?;
        write_signatures(&mut w, &self.delegator_vote_auths)?;
        write_signatures(&mut w, &self.lqt_vote_auths)?;
        Ok(finish_payload(w, "penumbra signatures"))
    }

    pub fn decode_qr(data: &[u8]) -> Result<Self, QrError> {
        registry::expect(data, ChainFamily::Penumbra, MessageKind::Signatures)?;
        let mut r = Reader::at(data, 3);
        let effect_hash = FixedBytes(r.array::<64>()?);
        let spend_auths = read_signatures(&mut r)?;
        let delegator_vote_auths = read_signatures(&mut r)?;
        let lqt_vote_auths = read_signatures(&mut r)?;
        r.finish()?;
        Ok(Self {
            effect_hash,
            spend_auths,
            delegator_vote_auths,
            lqt_vote_auths,
        })
    }

    pub fn total(&self) -> usize {
        self.spend_auths.len() + self.delegator_vote_auths.len() + self.lqt_vote_auths.len()
    }
}
