use bip39::{Language, Mnemonic};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::KeyError;

/// BIP39 seed, wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; 64]);

impl Seed {
    pub fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

/// Derive the seed for an English mnemonic and optional passphrase.
pub fn seed_from_phrase(phrase: &str, passphrase: &str) -> Result<Seed, KeyError> {
    let mnemonic = Mnemonic::parse_in(Language::English, phrase)
        .map_err(|e| KeyError::InvalidMnemonic(e.to_string()))?;
    Ok(Seed::new(mnemonic.to_seed(passphrase)))
}

pub fn validate_phrase(phrase: &str) -> bool {
    Mnemonic::parse_in(Language::English, phrase).is_ok()
}
