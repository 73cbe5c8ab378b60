//! Zcash QR messages
//!
//! FVK export layout:
//!
//! ```text
//! [0x53][0x04][0x01]           - prelude
//! [account_index: 4 bytes LE]
//! [label_len: 1 byte][label]
//! [flags: 1 byte]              - bit0 mainnet, bit1 ufvk, bit2 transparent xpub
//! [ufvk_len: 2 bytes LE][ufvk] - if bit1
//! [xpub_len: 2 bytes LE][xpub] - if bit2
//! ```

use serde::{Deserialize, Serialize};

use super::{
    finish_payload, read_label, read_signatures, registry, write_label, write_signatures,
    ChainFamily, FixedBytes, MessageKind, SignRequest, Signature64, CHAIN_ZCASH,
    PROTOCOL_MARKER, TYPE_FVK_EXPORT, TYPE_SIGNATURES,
};
use crate::codec::{self, Reader, Writer};
use crate::error::QrError;

pub const FLAG_MAINNET: u8 = 0b0000_0001;
pub const FLAG_UFVK: u8 = 0b0000_0010;
pub const FLAG_TRANSPARENT_XPUB: u8 = 0b0000_0100;
const KNOWN_FLAGS: u8 = FLAG_MAINNET | FLAG_UFVK | FLAG_TRANSPARENT_XPUB;

pub type ZcashSignRequest = SignRequest<32>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZcashFvkExport {
    pub account_index: u32,
    pub label: Option<String>,
    pub mainnet: bool,
    /// Unified full viewing key (`uview1...` / `uviewtest1...`).
    pub ufvk: Option<String>,
    /// Transparent account-level extended public key.
    pub transparent_xpub: Option<String>,
}

impl ZcashFvkExport {
    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.mainnet {
            flags |= FLAG_MAINNET;
        }
        if self.ufvk.is_some() {
            flags |= FLAG_UFVK;
        }
        if self.transparent_xpub.is_some() {
            flags |= FLAG_TRANSPARENT_XPUB;
        }
        flags
    }

    pub fn encode_qr(&self) -> Result<Vec<u8>, QrError> {
        let mut w = Writer::with_prelude([PROTOCOL_MARKER, CHAIN_ZCASH, TYPE_FVK_EXPORT]);
        w.u32_le(self.account_index);
        write_label(&mut w, &self.label)?;
        w.u8(self.flags());
        if let Some(ufvk) = &self.ufvk {
            w.prefixed_u16(ufvk.as_bytes())?;
        }
        if let Some(xpub) = &self.transparent_xpub {
            w.prefixed_u16(xpub.as_bytes())?;
        }
        Ok(finish_payload(w, "zcash fvk export"))
    }

    pub fn decode_qr(data: &[u8]) -> Result<Self, QrError> {
        registry::expect(data, ChainFamily::Zcash, MessageKind::FvkExport)?;
        let mut r = Reader::at(data, 3);
        let account_index = r.u32_le()?;
        let label = read_label(&mut r)?;
        let flags = r.u8()?;
        if flags & !KNOWN_FLAGS != 0 {
            return Err(QrError::invalid_field(
                "flags",
                format!("unknown bits set: 0b{:08b}", flags),
            ));
        }
        let ufvk = if flags & FLAG_UFVK != 0 {
            Some(r.string_u16()?)
        } else {
            None
        };
        let transparent_xpub = if flags & FLAG_TRANSPARENT_XPUB != 0 {
            Some(r.string_u16()?)
        } else {
            None
        };
        r.finish()?;
        Ok(Self {
            account_index,
            label,
            mainnet: flags & FLAG_MAINNET != 0,
            ufvk,
            transparent_xpub,
        })
    }

    pub fn decode_qr_hex(hex_str: &str) -> Result<Self, QrError> {
        Self::decode_qr(&codec::hex_to_bytes(hex_str)?)
    }
}

pub fn encode_sign_request(request: &ZcashSignRequest) -> Result<Vec<u8>, QrError> {
    request.encode_qr(CHAIN_ZCASH)
}

pub fn decode_sign_request(data: &[u8]) -> Result<ZcashSignRequest, QrError> {
    SignRequest::decode_for(data, ChainFamily::Zcash)
}

/// Signatures over a zcash sighash.
///
/// ```text
/// [sighash: 32 bytes]
/// [orchard_count: 2 bytes LE][64 bytes each]
/// [transparent_count: 2 bytes LE][64 bytes each]
/// [has_binding: 1 byte][binding_sig: 64 bytes if has_binding]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZcashSignatures {
    pub sighash: FixedBytes<32>,
    pub orchard_spend_auths: Vec<Signature64>,
    pub transparent: Vec<Signature64>,
    pub binding: Option<Signature64>,
}

impl ZcashSignatures {
    pub fn encode_qr(&self) -> Result<Vec<u8>, QrError> {
        let mut w = Writer::with_prelude([PROTOCOL_MARKER, CHAIN_ZCASH, TYPE_SIGNATURES]);
        w.bytes(self.sighash.as_bytes());
        write_signatures(&mut w, &self.orchard_spend_auths)?;
        write_signatures(&mut w, &self.transparent)?;
        match &self.binding {
            Some(sig) => {
                w.u8(1).bytes(sig.as_bytes());
            }
            None => {
                w.u8(0);
            }
        }
        Ok(finish_payload(w, "zcash signatures"))
    }

    pub fn decode_qr(data: &[u8]) -> Result<Self, QrError> {
        registry::expect(data, ChainFamily::Zcash, MessageKind::Signatures)?;
        let mut r = Reader::at(data, 3);
        let sighash = FixedBytes(r.array::<32>()?);
        let orchard_spend_auths = read_signatures(&mut r)?;
        let transparent = read_signatures(&mut r)?;
        let binding = match r.u8()? {
            0 => None,
            1 => Some(FixedBytes(r.array::<64>()?)),
            other => {
                return Err(QrError::invalid_field(
                    "binding flag",
                    format!("expected 0 or 1, got {}", other),
                ))
            }
        };
        r.finish()?;
        Ok(Self {
            sighash,
            orchard_spend_auths,
            transparent,
            binding,
        })
    }
}
