//! Merkleized runtime metadata
//!
//! Raw `state_getMetadata` bytes are decoded into `frame-metadata` types and
//! merkleized following RFC-0078. The resulting metadata hash is what the
//! `CheckMetadataHash` extension puts into the signed data, so it must match
//! the hash the runtime was built with. A proof carries only the types a
//! transaction touches, which lets the device decode the call without the
//! full metadata.

pub mod cache;
pub mod proof;

use frame_metadata::{RuntimeMetadata, RuntimeMetadataPrefixed, META_RESERVED};
use merkleized_metadata::{
    generate_metadata_digest, generate_proof_for_extrinsic_parts, SignedExtrinsicData,
};
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::MetadataError;

pub use cache::MetadataCache;
pub use proof::MetadataProof;

/// Chain parameters committed to by the digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraInfo {
    pub spec_version: u32,
    pub spec_name: String,
    pub base58_prefix: u16,
    pub decimals: u8,
    pub token_symbol: String,
}

impl From<&ExtraInfo> for merkleized_metadata::ExtraInfo {
    fn from(extra: &ExtraInfo) -> Self {
        Self {
            spec_version: extra.spec_version,
            spec_name: extra.spec_name.clone(),
            base58_prefix: extra.base58_prefix,
            decimals: extra.decimals,
            token_symbol: extra.token_symbol.clone(),
        }
    }
}

/// Turns raw metadata bytes into runtime metadata.
pub trait MetadataDecoder: Send + Sync {
    fn decode(&self, raw: &[u8]) -> Result<RuntimeMetadata, MetadataError>;
}

/// Decodes the SCALE `RuntimeMetadataPrefixed` returned by
/// `state_getMetadata`. Accepts V14 and V15.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScaleMetadataDecoder;

impl MetadataDecoder for ScaleMetadataDecoder {
    fn decode(&self, raw: &[u8]) -> Result<RuntimeMetadata, MetadataError> {
        let prefixed = RuntimeMetadataPrefixed::decode(&mut &raw[..])
            .map_err(|e| MetadataError::Decode(e.to_string()))?;
        if prefixed.0 != META_RESERVED {
            return Err(MetadataError::Decode(format!(
                "bad metadata magic {:#010x}",
                prefixed.0
            )));
        }
        signed_extension_ids(&prefixed.1)?;
        Ok(prefixed.1)
    }
}

/// Signed extension identifiers in the order the runtime encodes them.
pub fn signed_extension_ids(metadata: &RuntimeMetadata) -> Result<Vec<String>, MetadataError> {
    match metadata {
        RuntimeMetadata::V14(m) => Ok(m
            .extrinsic
            .signed_extensions
            .iter()
            .map(|e| e.identifier.clone())
            .collect()),
        RuntimeMetadata::V15(m) => Ok(m
            .extrinsic
            .signed_extensions
            .iter()
            .map(|e| e.identifier.clone())
            .collect()),
        other => Err(MetadataError::UnsupportedVersion(other.version())),
    }
}

/// Runtime metadata together with its RFC-0078 digest.
#[derive(Debug)]
pub struct MerkleizedMetadata {
    metadata: RuntimeMetadata,
    extra: ExtraInfo,
    signed_extensions: Vec<String>,
    /// SCALE encoding of `MetadataDigest::V1`.
    digest_encoded: Vec<u8>,
    digest: [u8; 32],
}

impl MerkleizedMetadata {
    /// Merkleize the type registry and compute the metadata hash.
    pub fn build(metadata: RuntimeMetadata, extra: ExtraInfo) -> Result<Self, MetadataError> {
        let signed_extensions = signed_extension_ids(&metadata)?;
        let digest = generate_metadata_digest(&metadata, (&extra).into())
            .map_err(MetadataError::Merkleize)?;
        log::debug!(
            "Merkleized metadata for {} v{}: {} signed extensions",
            extra.spec_name,
            extra.spec_version,
            signed_extensions.len()
        );
        Ok(Self {
            metadata,
            extra,
            signed_extensions,
            digest_encoded: digest.encode(),
            digest: digest.hash(),
        })
    }

    /// Metadata hash, as checked by `CheckMetadataHash`.
    pub fn digest(&self) -> [u8; 32] {
        self.digest
    }

    pub fn spec_version(&self) -> u32 {
        self.extra.spec_version
    }

    pub fn extra(&self) -> &ExtraInfo {
        &self.extra
    }

    pub fn signed_extensions(&self) -> &[String] {
        &self.signed_extensions
    }

    pub fn has_extension(&self, identifier: &str) -> bool {
        self.signed_extensions.iter().any(|e| e == identifier)
    }

    /// Fail with `Stale` unless built for `runtime_spec_version`.
    pub fn ensure_current(&self, runtime_spec_version: u32) -> Result<(), MetadataError> {
        if self.extra.spec_version != runtime_spec_version {
            return Err(MetadataError::Stale {
                cached: self.extra.spec_version,
                current: runtime_spec_version,
            });
        }
        Ok(())
    }

    /// Proof for the types needed to decode `call_data` and the signed
    /// extension bytes.
    pub fn proof_for(
        &self,
        call_data: &[u8],
        signed_ext_included_in_extrinsic: &[u8],
        signed_ext_included_in_signed_data: &[u8],
    ) -> Result<MetadataProof, MetadataError> {
        let proof = generate_proof_for_extrinsic_parts(
            call_data,
            Some(SignedExtrinsicData {
                included_in_extrinsic: signed_ext_included_in_extrinsic,
                included_in_signed_data: signed_ext_included_in_signed_data,
            }),
            &self.metadata,
        )
        .map_err(MetadataError::InvalidProof)?;
        Ok(MetadataProof {
            leaf_count: proof.leaves.len() as u32,
            proof: proof.encode(),
            digest: self.digest_encoded.clone(),
        })
    }
}

#[cfg(test)]
#[allow(dead_code, non_camel_case_types)]
pub(crate) mod tests {
    use super::*;
    use frame_metadata::v15::{
        CustomMetadata, ExtrinsicMetadata, OuterEnums, PalletCallMetadata, PalletMetadata,
        RuntimeMetadataV15, SignedExtensionMetadata,
    };
    use scale_info::{meta_type, TypeInfo};
    use std::collections::BTreeMap;

    #[derive(TypeInfo)]
    enum MultiAddress {
        #[codec(index = 0)]
        Id([u8; 32]),
    }

    #[derive(TypeInfo)]
    enum BalancesCall {
        #[codec(index = 3)]
        transfer_keep_alive {
            dest: MultiAddress,
            #[codec(compact)]
            value: u128,
        },
    }

    #[derive(TypeInfo)]
    enum RuntimeCall {
        #[codec(index = 5)]
        Balances(BalancesCall),
    }

    #[derive(TypeInfo)]
    enum MultiSignature {
        #[codec(index = 0)]
        Ed25519([u8; 64]),
    }

    #[derive(TypeInfo)]
    struct CheckSpecVersion;

    #[derive(TypeInfo)]
    struct CheckTxVersion;

    #[derive(TypeInfo)]
    struct CheckGenesis;

    #[derive(TypeInfo)]
    struct CheckNonce(#[codec(compact)] u32);

    #[derive(TypeInfo)]
    struct ChargeTransactionPayment(#[codec(compact)] u128);

    #[derive(TypeInfo)]
    enum Mode {
        Disabled,
        Enabled,
    }

    #[derive(TypeInfo)]
    struct CheckMetadataHash {
        mode: Mode,
    }

    #[derive(TypeInfo)]
    struct Runtime;

    fn extension<E: TypeInfo + 'static, A: TypeInfo + 'static>(
        identifier: &'static str,
    ) -> SignedExtensionMetadata {
        SignedExtensionMetadata {
            identifier,
            ty: meta_type::<E>(),
            additional_signed: meta_type::<A>(),
        }
    }

    /// V15 runtime with a balances pallet at index 5 whose call 3 is
    /// `transfer_keep_alive`, and the usual relay-chain extensions.
    pub(crate) fn sample_metadata() -> RuntimeMetadata {
        let extrinsic = ExtrinsicMetadata {
            version: 4,
            address_ty: meta_type::<MultiAddress>(),
            call_ty: meta_type::<RuntimeCall>(),
            signature_ty: meta_type::<MultiSignature>(),
            extra_ty: meta_type::<(
                CheckSpecVersion,
                CheckTxVersion,
                CheckGenesis,
                CheckNonce,
                ChargeTransactionPayment,
                CheckMetadataHash,
            )>(),
            signed_extensions: vec![
                extension::<CheckSpecVersion, u32>("CheckSpecVersion"),
                extension::<CheckTxVersion, u32>("CheckTxVersion"),
                extension::<CheckGenesis, [u8; 32]>("CheckGenesis"),
                extension::<CheckNonce, ()>("CheckNonce"),
                extension::<ChargeTransactionPayment, ()>("ChargeTransactionPayment"),
                extension::<CheckMetadataHash, Option<[u8; 32]>>("CheckMetadataHash"),
            ],
        };
        let balances = PalletMetadata {
            name: "Balances",
            storage: None,
            calls: Some(PalletCallMetadata {
                ty: meta_type::<BalancesCall>(),
            }),
            event: None,
            constants: vec![],
            error: None,
            index: 5,
            docs: vec![],
        };
        let v15 = RuntimeMetadataV15::new(
            vec![balances],
            extrinsic,
            meta_type::<Runtime>(),
            vec![],
            OuterEnums {
                call_enum_ty: meta_type::<RuntimeCall>(),
                event_enum_ty: meta_type::<()>(),
                error_enum_ty: meta_type::<()>(),
            },
            CustomMetadata {
                map: BTreeMap::new(),
            },
        );
        RuntimeMetadata::V15(v15)
    }

    /// What `state_getMetadata` returns for [`sample_metadata`].
    pub(crate) fn sample_raw() -> Vec<u8> {
        RuntimeMetadataPrefixed(META_RESERVED, sample_metadata()).encode()
    }

    pub(crate) fn sample_extra(spec_version: u32) -> ExtraInfo {
        ExtraInfo {
            spec_version,
            spec_name: "polkadot".into(),
            base58_prefix: 0,
            decimals: 10,
            token_symbol: "DOT".into(),
        }
    }

    #[test]
    fn test_decoder_reads_state_get_metadata() {
        let metadata = ScaleMetadataDecoder.decode(&sample_raw()).unwrap();
        assert_eq!(
            signed_extension_ids(&metadata).unwrap(),
            vec![
                "CheckSpecVersion",
                "CheckTxVersion",
                "CheckGenesis",
                "CheckNonce",
                "ChargeTransactionPayment",
                "CheckMetadataHash"
            ]
        );
    }

    #[test]
    fn test_decoder_rejects_garbage() {
        assert!(ScaleMetadataDecoder.decode(&[]).is_err());
        assert!(ScaleMetadataDecoder.decode(b"meta").is_err());
        let mut raw = sample_raw();
        raw[0] ^= 0xff;
        assert!(matches!(
            ScaleMetadataDecoder.decode(&raw),
            Err(MetadataError::Decode(_))
        ));
    }

    #[test]
    fn test_digest_is_rfc0078_metadata_hash() {
        let built = MerkleizedMetadata::build(sample_metadata(), sample_extra(1)).unwrap();
        let reference = generate_metadata_digest(&sample_metadata(), (&sample_extra(1)).into())
            .unwrap();
        assert_eq!(built.digest(), reference.hash());

        // blake3 over SCALE(MetadataDigest::V1)
        let encoded = reference.encode();
        assert_eq!(encoded[0], 1);
        assert_eq!(built.digest(), <[u8; 32]>::from(blake3::hash(&encoded)));
    }

    #[test]
    fn test_digest_commits_to_extra_info() {
        let a = MerkleizedMetadata::build(sample_metadata(), sample_extra(1)).unwrap();
        let b = MerkleizedMetadata::build(sample_metadata(), sample_extra(2)).unwrap();
        let mut other_symbol = sample_extra(1);
        other_symbol.token_symbol = "KSM".into();
        let c = MerkleizedMetadata::build(sample_metadata(), other_symbol).unwrap();
        assert_ne!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn test_extension_lookup() {
        let m = MerkleizedMetadata::build(sample_metadata(), sample_extra(1)).unwrap();
        assert!(m.has_extension("CheckMetadataHash"));
        assert!(!m.has_extension("CheckMortality"));
        assert_eq!(m.signed_extensions().len(), 6);
    }

    #[test]
    fn test_ensure_current() {
        let m = MerkleizedMetadata::build(sample_metadata(), sample_extra(4)).unwrap();
        assert!(m.ensure_current(4).is_ok());
        assert_eq!(
            m.ensure_current(5).unwrap_err(),
            MetadataError::Stale { cached: 4, current: 5 }
        );
    }
}
