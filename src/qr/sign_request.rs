//! Sign request body shared by the penumbra, zcash and cosmos families
//!
//! ```text
//! [prelude: 3 bytes]
//! [account_index: 4 bytes LE]
//! [digest: D bytes]              - effect hash / sighash the device signs
//! [plan_len: 4 bytes LE][plan]   - opaque transaction plan
//! [summary_len: 2 bytes LE][summary] - utf8, advisory display text only
//! ```
//!
//! The summary is never authoritative: a device must verify the plan against
//! the digest and ignore the summary for anything but display.

use serde::{Deserialize, Serialize};

use super::{finish_payload, registry, ChainFamily, FixedBytes, MessageKind, PROTOCOL_MARKER};
use crate::codec::{self, Reader, Writer};
use crate::error::QrError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRequest<const D: usize> {
    pub account_index: u32,
    pub digest: FixedBytes<D>,
    #[serde(with = "hex_vec")]
    pub plan: Vec<u8>,
    pub summary: String,
}

impl<const D: usize> SignRequest<D> {
    pub(crate) fn write_body(&self, w: &mut Writer) -> Result<(), QrError> {
        w.u32_le(self.account_index);
        w.bytes(self.digest.as_bytes());
        w.prefixed_u32(&self.plan)?;
        w.prefixed_u16(self.summary.as_bytes())
            .map_err(|_| QrError::invalid_field("summary", "longer than 65535 bytes"))?;
        Ok(())
    }

    pub(crate) fn read_body(r: &mut Reader<'_>) -> Result<Self, QrError> {
        let account_index = r.u32_le()?;
        let digest = FixedBytes(r.array::<D>()?);
        let plan = r.prefixed_u32()?.to_vec();
        let summary = r.string_u16()?;
        Ok(Self {
            account_index,
            digest,
            plan,
            summary,
        })
    }

    /// Encode with the given chain byte.
    pub fn encode_qr(&self, chain: u8) -> Result<Vec<u8>, QrError> {
        let mut w = Writer::with_prelude([PROTOCOL_MARKER, chain, super::TYPE_SIGN_REQUEST]);
        self.write_body(&mut w)?;
        Ok(finish_payload(w, "sign request"))
    }

    pub fn encode_qr_hex(&self, chain: u8) -> Result<String, QrError> {
        Ok(codec::bytes_to_hex(&self.encode_qr(chain)?))
    }

    pub(crate) fn decode_for(data: &[u8], family: ChainFamily) -> Result<Self, QrError> {
        registry::expect(data, family, MessageKind::SignRequest)?;
        let mut r = Reader::at(data, 3);
        let request = Self::read_body(&mut r)?;
        r.finish()?;
        Ok(request)
    }
}

pub(crate) mod hex_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        crate::codec::hex_to_bytes(&s).map_err(serde::de::Error::custom)
    }
}
