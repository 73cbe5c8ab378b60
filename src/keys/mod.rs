//! Key derivation engines and address encoding
//!
//! The helpers at this level derive only what a viewing wallet needs. Any
//! private key material created on the way is dropped (and zeroized) before
//! they return.

pub mod address;
pub mod bip32;
pub mod mnemonic;
pub mod path;
pub mod slip10;

use serde::{Deserialize, Serialize};

use crate::error::KeyError;
use bip32::ExtendedPrivateKey;
use slip10::Slip10Key;

pub use mnemonic::{seed_from_phrase, Seed};
pub use path::{ChildIndex, DerivationPath};

/// Main or test network, for address and xpub version bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Main,
    Test,
}

impl std::str::FromStr for NetworkKind {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "main" | "mainnet" => Ok(Self::Main),
            "test" | "testnet" => Ok(Self::Test),
            other => Err(KeyError::InvalidPath(format!("unknown network {:?}", other))),
        }
    }
}

/// Transparent P2PKH address at `m/44'/133'/<account>'/0/<index>`.
pub fn zcash_transparent_address(
    seed: &[u8],
    account: u32,
    index: u32,
    network: NetworkKind,
) -> Result<String, KeyError> {
    let coin = match network {
        NetworkKind::Main => path::COIN_ZCASH,
        NetworkKind::Test => 1,
    };
    let public_key = {
        let key = ExtendedPrivateKey::master(seed)?.derive_path(&path::bip44(coin, account, index))?;
        key.public_key()?
    };
    Ok(address::zcash_t_address(&public_key, network))
}

/// Account-level transparent xpub, the form carried in a zcash FVK export.
pub fn zcash_account_xpub(seed: &[u8], account: u32, network: NetworkKind) -> Result<String, KeyError> {
    let coin = match network {
        NetworkKind::Main => path::COIN_ZCASH,
        NetworkKind::Test => 1,
    };
    let xpub = ExtendedPrivateKey::master(seed)?
        .derive_path(&path::bip44_account(coin, account))?
        .to_extended_public()?;
    Ok(xpub.to_xpub(network))
}

/// Compressed secp256k1 key at `m/44'/118'/<account>'/0/<index>`.
pub fn cosmos_public_key(seed: &[u8], account: u32, index: u32) -> Result<[u8; 33], KeyError> {
    ExtendedPrivateKey::master(seed)?
        .derive_path(&path::bip44(path::COIN_COSMOS, account, index))?
        .public_key()
}

pub fn cosmos_address(seed: &[u8], hrp: &str, account: u32, index: u32) -> Result<String, KeyError> {
    address::cosmos_bech32(hrp, &cosmos_public_key(seed, account, index)?)
}

/// ed25519 key at `m/44'/<coin>'/<account>'/0'/0'`.
pub fn substrate_public_key(seed: &[u8], coin_type: u32, account: u32) -> Result<[u8; 32], KeyError> {
    Ok(Slip10Key::master(seed)?
        .derive_path(&path::slip10_substrate(coin_type, account))?
        .public_key())
}

pub fn substrate_address(
    seed: &[u8],
    coin_type: u32,
    account: u32,
    ss58_prefix: u16,
) -> Result<String, KeyError> {
    address::ss58_encode(&substrate_public_key(seed, coin_type, account)?, ss58_prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_zcash_reference_address() {
        let seed = seed_from_phrase(ABANDON, "").unwrap();
        assert_eq!(
            zcash_transparent_address(seed.as_bytes(), 0, 0, NetworkKind::Main).unwrap(),
            "t1XVXWCvpMgBvUaed4XDqWtgQgJSu1Ghz7F"
        );
    }

    #[test]
    fn test_substrate_address_is_deterministic() {
        let seed = seed_from_phrase(ABANDON, "").unwrap();
        let a = substrate_address(seed.as_bytes(), path::COIN_POLKADOT, 0, 0).unwrap();
        let b = substrate_address(seed.as_bytes(), path::COIN_POLKADOT, 0, 0).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with('1'));
        assert_ne!(a, substrate_address(seed.as_bytes(), path::COIN_POLKADOT, 1, 0).unwrap());
    }

    #[test]
    fn test_network_kind_parse() {
        assert_eq!("Mainnet".parse::<NetworkKind>().unwrap(), NetworkKind::Main);
        assert_eq!("test".parse::<NetworkKind>().unwrap(), NetworkKind::Test);
        assert!("regtest".parse::<NetworkKind>().is_err());
    }
}
