//! Cosmos QR messages
//!
//! ```text
//! [0x53][0x05][0x01]            - prelude
//! [account_index: 4 bytes LE]
//! [label_len: 1 byte][label]
//! [pubkey: 33 bytes]            - compressed secp256k1
//! [address_count: 1 byte]
//! [addr_len: 2 bytes LE][addr]  - bech32, one per chain
//! ```

use serde::{Deserialize, Serialize};

use super::{
    finish_payload, read_label, registry, write_label, ChainFamily, FixedBytes, MessageKind,
    SignRequest, CHAIN_COSMOS, PROTOCOL_MARKER, TYPE_FVK_EXPORT,
};
use crate::codec::{Reader, Writer};
use crate::error::QrError;

pub type CosmosSignRequest = SignRequest<32>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosmosFvkExport {
    pub account_index: u32,
    pub label: Option<String>,
    pub public_key: FixedBytes<33>,
    pub addresses: Vec<String>,
}

impl CosmosFvkExport {
    pub fn encode_qr(&self) -> Result<Vec<u8>, QrError> {
        let count = u8::try_from(self.addresses.len())
            .map_err(|_| QrError::invalid_field("addresses", "more than 255 addresses"))?;
        let mut w = Writer::with_prelude([PROTOCOL_MARKER, CHAIN_COSMOS, TYPE_FVK_EXPORT]);
        w.u32_le(self.account_index);
        write_label(&mut w, &self.label)?;
        w.bytes(self.public_key.as_bytes());
        w.u8(count);
        for address in &self.addresses {
            w.prefixed_u16(address.as_bytes())?;
        }
        Ok(finish_payload(w, "cosmos fvk export"))
    }

    pub fn decode_qr(data: &[u8]) -> Result<Self, QrError> {
        registry::expect(data, ChainFamily::Cosmos, MessageKind::FvkExport)?;
        let mut r = Reader::at(data, 3);
        let account_index = r.u32_le()?;
        let label = read_label(&mut r)?;
        let public_key = FixedBytes(r.array::<33>()?);
        if !matches!(public_key.0[0], 0x02 | 0x03) {
            return Err(QrError::invalid_field(
                "public key",
                format!("not a compressed point (prefix 0x{:02x})", public_key.0[0]),
            ));
        }
        let count = r.u8()? as usize;
        let mut addresses = Vec::with_capacity(count);
        for _ in 0..count {
            addresses.push(r.string_u16()?);
        }
        r.finish()?;
        Ok(Self {
            account_index,
            label,
            public_key,
            addresses,
        })
    }

    /// Address for a given bech32 human readable part.
    pub fn address_for(&self, hrp: &str) -> Option<&str> {
        let prefix = format!("{}1", hrp);
        self.addresses
            .iter()
            .find(|a| a.starts_with(&prefix))
            .map(String::as_str)
    }
}

pub fn encode_sign_request(request: &CosmosSignRequest) -> Result<Vec<u8>, QrError> {
    request.encode_qr(CHAIN_COSMOS)
}

pub fn decode_sign_request(data: &[u8]) -> Result<CosmosSignRequest, QrError> {
    SignRequest::decode_for(data, ChainFamily::Cosmos)
}
