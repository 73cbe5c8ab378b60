//! SLIP-10 over ed25519 (hardened derivation only)

use ed25519_dalek::SigningKey;
use zeroize::Zeroizing;

use super::bip32::hmac_sha512;
use super::path::{ChildIndex, DerivationPath};
use crate::error::KeyError;

const MASTER_DOMAIN: &[u8] = b"ed25519 seed";

#[derive(Clone)]
pub struct Slip10Key {
    depth: u8,
    chain_code: [u8; 32],
    secret: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for Slip10Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slip10Key")
            .field("depth", &self.depth)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Slip10Key {
    pub fn master(seed: &[u8]) -> Result<Self, KeyError> {
        if !(16..=64).contains(&seed.len()) {
            return Err(KeyError::InvalidSeed(seed.len()));
        }
        let i = hmac_sha512(MASTER_DOMAIN, &[seed])?;
        Ok(Self::from_hmac(0, &i))
    }

    fn from_hmac(depth: u8, i: &[u8; 64]) -> Self {
        let mut secret = Zeroizing::new([0u8; 32]);
        let mut chain_code = [0u8; 32];
        secret.copy_from_slice(&i[..32]);
        chain_code.copy_from_slice(&i[32..]);
        Self {
            depth,
            chain_code,
            secret,
        }
    }

    /// Every ed25519 scalar is valid, so unlike BIP32 there is no retry case.
    pub fn derive_child(&self, index: ChildIndex) -> Result<Self, KeyError> {
        let raw = index.raw();
        if !index.is_hardened() {
            return Err(KeyError::HardenedOnly(raw));
        }
        let i = hmac_sha512(
            &self.chain_code,
            &[&[0u8], self.secret.as_ref(), &raw.to_be_bytes()],
        )?;
        Ok(Self::from_hmac(self.depth.saturating_add(1), &i))
    }

    pub fn derive_path(&self, path: &DerivationPath) -> Result<Self, KeyError> {
        path.segments()
            .iter()
            .try_fold(self.clone(), |key, index| key.derive_child(*index))
    }

    pub fn public_key(&self) -> [u8; 32] {
        SigningKey::from_bytes(&self.secret).verifying_key().to_bytes()
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.secret)
    }
}
