//! Penumbra action schema exchange
//!
//! The device caches a schema digest. When the wallet's digest differs, it
//! sends the full action table as a schema update; otherwise the digest alone
//! is enough for the device to trust its cached table.
//!
//! ```text
//! digest: [version: u16][action_count: u16][action_root: 32][asset_root: 32]
//!         [chain_id_len: u8][chain_id]
//! update: [version: u16][action_count: u16] then per action
//!         [tag: u8][name_len: u8][name][type_url_len: u16][type_url]
//!         [field_count: u8]([field_len: u8][field])*
//! ```

use serde::{Deserialize, Serialize};

use super::{
    finish_payload, registry, ChainFamily, FixedBytes, MessageKind, CHAIN_PENUMBRA,
    PROTOCOL_MARKER, TYPE_SCHEMA_DIGEST, TYPE_SCHEMA_UPDATE,
};
use crate::codec::{Reader, Writer};
use crate::error::QrError;
use crate::hashing::blake2b_256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub tag: u8,
    pub name: String,
    pub type_url: String,
    pub field_names: Vec<String>,
}

impl ActionDefinition {
    fn write(&self, w: &mut Writer) -> Result<(), QrError> {
        let field_count = u8::try_from(self.field_names.len())
            .map_err(|_| QrError::invalid_field("field names", "more than 255 fields"))?;
        w.u8(self.tag);
        w.prefixed_u8(self.name.as_bytes())?;
        w.prefixed_u16(self.type_url.as_bytes())?;
        w.u8(field_count);
        for field in &self.field_names {
            w.prefixed_u8(field.as_bytes())?;
        }
        Ok(())
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, QrError> {
        let tag = r.u8()?;
        let name = r.string_u8()?;
        let type_url = r.string_u16()?;
        let field_count = r.u8()? as usize;
        let field_names = (0..field_count)
            .map(|_| r.string_u8())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            tag,
            name,
            type_url,
            field_names,
        })
    }

    /// Canonical encoding hashed into the action tree.
    pub fn encode(&self) -> Result<Vec<u8>, QrError> {
        let mut w = Writer::new();
        self.write(&mut w)?;
        Ok(w.into_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaUpdate {
    pub schema_version: u16,
    pub actions: Vec<ActionDefinition>,
}

impl SchemaUpdate {
    pub fn encode_qr(&self) -> Result<Vec<u8>, QrError> {
        let count = u16::try_from(self.actions.len())
            .map_err(|_| QrError::invalid_field("actions", "more than 65535 actions"))?;
        let mut w = Writer::with_prelude([PROTOCOL_MARKER, CHAIN_PENUMBRA, TYPE_SCHEMA_UPDATE]);
        w.u16_le(self.schema_version);
        w.u16_le(count);
        for action in &self.actions {
            action.write(&mut w)?;
        }
        Ok(finish_payload(w, "penumbra schema update"))
    }

    pub fn decode_qr(data: &[u8]) -> Result<Self, QrError> {
        registry::expect(data, ChainFamily::Penumbra, MessageKind::SchemaUpdate)?;
        let mut r = Reader::at(data, 3);
        let schema_version = r.u16_le()?;
        let count = r.u16_le()? as usize;
        let mut actions = Vec::with_capacity(count.min(r.remaining()));
        for _ in 0..count {
            actions.push(ActionDefinition::read(&mut r)?);
        }
        r.finish()?;
        Ok(Self {
            schema_version,
            actions,
        })
    }

    /// Merkle root over the action table, ordered by tag.
    pub fn action_root(&self) -> Result<[u8; 32], QrError> {
        let mut sorted: Vec<&ActionDefinition> = self.actions.iter().collect();
        sorted.sort_by_key(|a| a.tag);
        let leaves = sorted
            .into_iter()
            .map(|a| a.encode().map(|bytes| blake2b_256(&bytes)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(merkle_root(leaves))
    }
}

/// Binary blake2b-256 tree. An odd node is carried up unchanged; the empty
/// tree has an all-zero root.
fn merkle_root(mut level: Vec<[u8; 32]>) -> [u8; 32] {
    if level.is_empty() {
        return [0u8; 32];
    }
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                if let [left, right] = pair {
                    let mut joined = [0u8; 64];
                    joined[..32].copy_from_slice(left);
                    joined[32..].copy_from_slice(right);
                    blake2b_256(&joined)
                } else {
                    pair[0]
                }
            })
            .collect();
    }
    level[0]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDigest {
    pub schema_version: u16,
    pub action_count: u16,
    pub action_root: FixedBytes<32>,
    pub asset_registry_root: FixedBytes<32>,
    pub chain_id: String,
}

impl SchemaDigest {
    /// Digest matching a full update for `chain_id`.
    pub fn from_update(
        update: &SchemaUpdate,
        asset_registry_root: [u8; 32],
        chain_id: impl Into<String>,
    ) -> Result<Self, QrError> {
        let action_count = u16::try_from(update.actions.len())
            .map_err(|_| QrError::invalid_field("actions", "more than 65535 actions"))?;
        Ok(Self {
            schema_version: update.schema_version,
            action_count,
            action_root: FixedBytes(update.action_root()?),
            asset_registry_root: FixedBytes(asset_registry_root),
            chain_id: chain_id.into(),
        })
    }

    /// True when a device holding `cached` needs no schema update.
    pub fn is_current_for(&self, cached: &SchemaDigest) -> bool {
        self == cached
    }

    pub fn encode_qr(&self) -> Result<Vec<u8>, QrError> {
        let mut w = Writer::with_prelude([PROTOCOL_MARKER, CHAIN_PENUMBRA, TYPE_SCHEMA_DIGEST]);
        w.u16_le(self.schema_version);
        w.u16_le(self.action_count);
        w.bytes(self.action_root.as_bytes());
        w.bytes(self.asset_registry_root.as_bytes());
        w.prefixed_u8(self.chain_id.as_bytes())?;
        Ok(finish_payload(w, "penumbra schema digest"))
    }

    pub fn decode_qr(data: &[u8]) -> Result<Self, QrError> {
        registry::expect(data, ChainFamily::Penumbra, MessageKind::SchemaDigest)?;
        let mut r = Reader::at(data, 3);
        let schema_version = r.u16_le()?;
        let action_count = r.u16_le()?;
        let action_root = FixedBytes(r.array::<32>()?);
        let asset_registry_root = FixedBytes(r.array::<32>()?);
        let chain_id = r.string_u8()?;
        r.finish()?;
        Ok(Self {
            schema_version,
            action_count,
            action_root,
            asset_registry_root,
            chain_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_update() -> SchemaUpdate {
        SchemaUpdate {
            schema_version: 2,
            actions: vec![
                ActionDefinition {
                    tag: 1,
                    name: "spend".into(),
                    type_url: "/penumbra.core.component.shielded_pool.v1.Spend".into(),
                    field_names: vec!["note".into(), "amount".into()],
                },
                ActionDefinition {
                    tag: 2,
                    name: "output".into(),
                    type_url: "/penumbra.core.component.shielded_pool.v1.Output".into(),
                    field_names: vec!["address".into()],
                },
                ActionDefinition {
                    tag: 9,
                    name: "delegate".into(),
                    type_url: "/penumbra.core.component.stake.v1.Delegate".into(),
                    field_names: vec![],
                },
            ],
        }
    }

    #[test]
    fn test_update_roundtrip() {
        let update = sample_update();
        let encoded = update.encode_qr().unwrap();
        assert_eq!(&encoded[..3], &[0x53, 0x03, 0x05]);
        assert_eq!(SchemaUpdate::decode_qr(&encoded).unwrap(), update);
    }

    #[test]
    fn test_digest_roundtrip_and_staleness() {
        let update = sample_update();
        let digest = SchemaDigest::from_update(&update, [0x22; 32], "penumbra-1").unwrap();
        assert_eq!(digest.action_count, 3);
        let encoded = digest.encode_qr().unwrap();
        let decoded = SchemaDigest::decode_qr(&encoded).unwrap();
        assert!(decoded.is_current_for(&digest));

        let mut newer = update.clone();
        newer.schema_version = 3;
        newer.actions[2].field_names.push("validator".into());
        let newer_digest = SchemaDigest::from_update(&newer, [0x22; 32], "penumbra-1").unwrap();
        assert_ne!(newer_digest.action_root, digest.action_root);
        assert!(!newer_digest.is_current_for(&digest));
    }

    #[test]
    fn test_action_root_ignores_order() {
        let update = sample_update();
        let mut reversed = update.clone();
        reversed.actions.reverse();
        assert_eq!(update.action_root().unwrap(), reversed.action_root().unwrap());
    }

    #[test]
    fn test_empty_update_has_zero_root() {
        let update = SchemaUpdate {
            schema_version: 1,
            actions: vec![],
        };
        assert_eq!(update.action_root().unwrap(), [0u8; 32]);
        let encoded = update.encode_qr().unwrap();
        assert_eq!(encoded.len(), 7);
        assert_eq!(SchemaUpdate::decode_qr(&encoded).unwrap(), update);
    }

    #[test]
    fn test_update_truncated_action() {
        let mut encoded = sample_update().encode_qr().unwrap();
        encoded.truncate(encoded.len() - 3);
        assert!(SchemaUpdate::decode_qr(&encoded).is_err());
    }
}
