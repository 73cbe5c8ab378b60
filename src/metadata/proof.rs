/// Metadata proofs
///
/// A proof holds the SCALE-encoded RFC-0078 `Proof` (type leaves plus the
/// sibling hashes needed to recompute the type tree root) together with the
/// encoded `MetadataDigest` it was generated against. The device recomputes
/// the metadata hash from the digest and compares it with the hash the
/// transaction commits to.

use crate::codec::{Reader, Writer};
use crate::error::{CodecError, MetadataError};

/// Offset of `spec_version` in an encoded `MetadataDigest::V1`: version
/// byte, type tree root, extrinsic metadata hash.
const DIGEST_SPEC_VERSION_OFFSET: usize = 1 + 32 + 32;
const DIGEST_V1: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataProof {
    /// Number of type leaves the proof reveals.
    pub leaf_count: u32,
    /// SCALE-encoded `merkleized_metadata::Proof`.
    pub proof: Vec<u8>,
    /// SCALE-encoded `MetadataDigest`.
    pub digest: Vec<u8>,
}

fn decode_err(e: CodecError) -> MetadataError {
    MetadataError::Decode(e.to_string())
}

impl MetadataProof {
    /// Metadata hash this proof was built against.
    pub fn metadata_hash(&self) -> [u8; 32] {
        blake3::hash(&self.digest).into()
    }

    pub fn spec_version(&self) -> Result<u32, MetadataError> {
        let mut r = Reader::at(&self.digest, DIGEST_SPEC_VERSION_OFFSET);
        r.u32_le().map_err(decode_err)
    }

    /// Check the proof against the metadata hash the transaction commits to.
    pub fn verify(&self, expected_hash: &[u8; 32]) -> Result<(), MetadataError> {
        if self.digest.first() != Some(&DIGEST_V1) {
            return Err(MetadataError::InvalidProof("unknown digest version".into()));
        }
        if self.proof.is_empty() || self.leaf_count == 0 {
            return Err(MetadataError::InvalidProof("no leaves".into()));
        }
        if &self.metadata_hash() != expected_hash {
            return Err(MetadataError::InvalidProof("digest mismatch".into()));
        }
        Ok(())
    }

    /// Binary form carried in the substrate sign request.
    pub fn encode(&self) -> Result<Vec<u8>, MetadataError> {
        let mut w = Writer::new();
        w.u32_le(self.leaf_count);
        w.prefixed_u32(&self.proof).map_err(decode_err)?;
        w.prefixed_u16(&self.digest).map_err(decode_err)?;
        Ok(w.into_bytes())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MetadataError> {
        Self::read(&mut Reader::new(bytes)).map_err(decode_err)
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let leaf_count = r.u32_le()?;
        let proof = r.prefixed_u32()?.to_vec();
        let digest = r.prefixed_u16()?.to_vec();
        if r.remaining() != 0 {
            return Err(CodecError::TrailingBytes(r.remaining()));
        }
        Ok(Self {
            leaf_count,
            proof,
            digest,
        })
    }
}
