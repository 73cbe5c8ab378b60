//! BIP32 over secp256k1
//!
//! Used for zcash transparent addresses and the cosmos chains. Invalid
//! intermediate scalars surface as `KeyError::InvalidChild` so the caller can
//! move on to the next index instead of producing a degenerate key.

use bitcoin::base58;
use bitcoin::hashes::{hash160, Hash};
use hmac::{Hmac, Mac};
use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use sha2::Sha512;
use zeroize::Zeroizing;

use super::path::{ChildIndex, DerivationPath};
use super::NetworkKind;
use crate::error::KeyError;

type HmacSha512 = Hmac<Sha512>;

const MASTER_DOMAIN: &[u8] = b"Bitcoin seed";

const XPUB_MAINNET: [u8; 4] = [0x04, 0x88, 0xB2, 0x1E];
const XPUB_TESTNET: [u8; 4] = [0x04, 0x35, 0x87, 0xCF];

pub(crate) fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> Result<Zeroizing<[u8; 64]>, KeyError> {
    let mut mac = HmacSha512::new_from_slice(key).map_err(|_| KeyError::InvalidMaster)?;
    for part in parts {
        mac.update(part);
    }
    let mut out = Zeroizing::new([0u8; 64]);
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

fn split(i: &[u8; 64]) -> (Zeroizing<[u8; 32]>, [u8; 32]) {
    let mut il = Zeroizing::new([0u8; 32]);
    let mut ir = [0u8; 32];
    il.copy_from_slice(&i[..32]);
    ir.copy_from_slice(&i[32..]);
    (il, ir)
}

fn fingerprint_of(public_key: &[u8; 33]) -> [u8; 4] {
    let hash = hash160::Hash::hash(public_key).to_byte_array();
    [hash[0], hash[1], hash[2], hash[3]]
}

#[derive(Clone)]
pub struct ExtendedPrivateKey {
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
    chain_code: [u8; 32],
    secret: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for ExtendedPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendedPrivateKey")
            .field("depth", &self.depth)
            .field("child_number", &self.child_number)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl ExtendedPrivateKey {
    pub fn master(seed: &[u8]) -> Result<Self, KeyError> {
        if !(16..=64).contains(&seed.len()) {
            return Err(KeyError::InvalidSeed(seed.len()));
        }
        let i = hmac_sha512(MASTER_DOMAIN, &[seed])?;
        let (il, ir) = split(&i);
        SecretKey::from_slice(il.as_ref()).map_err(|_| KeyError::InvalidMaster)?;
        Ok(Self {
            depth: 0,
            parent_fingerprint: [0; 4],
            child_number: 0,
            chain_code: ir,
            secret: il,
        })
    }

    fn secret_key(&self) -> Result<SecretKey, KeyError> {
        SecretKey::from_slice(self.secret.as_ref()).map_err(|_| KeyError::InvalidMaster)
    }

    pub fn derive_child(&self, index: ChildIndex) -> Result<Self, KeyError> {
        let raw = index.raw();
        let parent_pub = self.public_key()?;
        let i = if index.is_hardened() {
            hmac_sha512(
                &self.chain_code,
                &[&[0u8], self.secret.as_ref(), &raw.to_be_bytes()],
            )?
        } else {
            hmac_sha512(&self.chain_code, &[&parent_pub, &raw.to_be_bytes()])?
        };
        let (il, ir) = split(&i);

        let tweak = Scalar::from_be_bytes(*il).map_err(|_| KeyError::InvalidChild { index: raw })?;
        let child = self
            .secret_key()?
            .add_tweak(&tweak)
            .map_err(|_| KeyError::InvalidChild { index: raw })?;

        Ok(Self {
            depth: self.depth.saturating_add(1),
            parent_fingerprint: fingerprint_of(&parent_pub),
            child_number: raw,
            chain_code: ir,
            secret: Zeroizing::new(child.secret_bytes()),
        })
    }

    pub fn derive_path(&self, path: &DerivationPath) -> Result<Self, KeyError> {
        path.segments()
            .iter()
            .try_fold(self.clone(), |key, index| key.derive_child(*index))
    }

    /// Compressed SEC1 public key.
    pub fn public_key(&self) -> Result<[u8; 33], KeyError> {
        let secp = Secp256k1::signing_only();
        Ok(PublicKey::from_secret_key(&secp, &self.secret_key()?).serialize())
    }

    pub fn fingerprint(&self) -> Result<[u8; 4], KeyError> {
        Ok(fingerprint_of(&self.public_key()?))
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    pub fn to_extended_public(&self) -> Result<ExtendedPublicKey, KeyError> {
        Ok(ExtendedPublicKey {
            depth: self.depth,
            parent_fingerprint: self.parent_fingerprint,
            child_number: self.child_number,
            chain_code: self.chain_code,
            public_key: self.public_key()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedPublicKey {
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
    chain_code: [u8; 32],
    public_key: [u8; 33],
}

impl ExtendedPublicKey {
    /// Non-hardened public child derivation.
    pub fn derive_child(&self, index: ChildIndex) -> Result<Self, KeyError> {
        let raw = index.raw();
        if index.is_hardened() {
            return Err(KeyError::HardenedFromPublic(raw));
        }
        let i = hmac_sha512(&self.chain_code, &[&self.public_key, &raw.to_be_bytes()])?;
        let (il, ir) = split(&i);

        let tweak = Scalar::from_be_bytes(*il).map_err(|_| KeyError::InvalidChild { index: raw })?;
        let parent = PublicKey::from_slice(&self.public_key)
            .map_err(|e| KeyError::InvalidPublicKey(e.to_string()))?;
        let secp = Secp256k1::verification_only();
        let child = parent
            .add_exp_tweak(&secp, &tweak)
            .map_err(|_| KeyError::InvalidChild { index: raw })?;

        Ok(Self {
            depth: self.depth.saturating_add(1),
            parent_fingerprint: fingerprint_of(&self.public_key),
            child_number: raw,
            chain_code: ir,
            public_key: child.serialize(),
        })
    }

    pub fn derive_path(&self, path: &DerivationPath) -> Result<Self, KeyError> {
        path.segments()
            .iter()
            .try_fold(self.clone(), |key, index| key.derive_child(*index))
    }

    pub fn public_key(&self) -> &[u8; 33] {
        &self.public_key
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Base58Check `xpub` / `tpub` serialization.
    pub fn to_xpub(&self, network: NetworkKind) -> String {
        let version = match network {
            NetworkKind::Main => XPUB_MAINNET,
            NetworkKind::Test => XPUB_TESTNET,
        };
        let mut data = Vec::with_capacity(78);
        data.extend_from_slice(&version);
        data.push(self.depth);
        data.extend_from_slice(&self.parent_fingerprint);
        data.extend_from_slice(&self.child_number.to_be_bytes());
        data.extend_from_slice(&self.chain_code);
        data.extend_from_slice(&self.public_key);
        base58::encode_check(&data)
    }

    pub fn from_xpub(encoded: &str) -> Result<(Self, NetworkKind), KeyError> {
        let data = base58::decode_check(encoded.trim())
            .map_err(|e| KeyError::InvalidPublicKey(format!("xpub: {}", e)))?;
        if data.len() != 78 {
            return Err(KeyError::InvalidPublicKey(format!(
                "xpub payload is {} bytes, expected 78",
                data.len()
            )));
        }
        let network = match [data[0], data[1], data[2], data[3]] {
            XPUB_MAINNET => NetworkKind::Main,
            XPUB_TESTNET => NetworkKind::Test,
            other => {
                return Err(KeyError::InvalidPublicKey(format!(
                    "unknown xpub version {}",
                    hex::encode(other)
                )))
            }
        };
        let mut parent_fingerprint = [0u8; 4];
        parent_fingerprint.copy_from_slice(&data[5..9]);
        let mut child = [0u8; 4];
        child.copy_from_slice(&data[9..13]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&data[13..45]);
        let mut public_key = [0u8; 33];
        public_key.copy_from_slice(&data[45..78]);
        PublicKey::from_slice(&public_key).map_err(|e| KeyError::InvalidPublicKey(e.to_string()))?;

        Ok((
            Self {
                depth: data[4],
                parent_fingerprint,
                child_number: u32::from_be_bytes(child),
                chain_code,
                public_key,
            },
            network,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::path::bip44_account;
    use bitcoin::bip32::{Xpriv, Xpub};
    use std::str::FromStr;

    const SEED_HEX: &str = "000102030405060708090a0b0c0d0e0f";

    #[test]
    fn test_bip32_vector1_master() {
        let seed = hex::decode(SEED_HEX).unwrap();
        let master = ExtendedPrivateKey::master(&seed).unwrap();
        assert_eq!(
            master.to_extended_public().unwrap().to_xpub(NetworkKind::Main),
            "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8"
        );
    }

    #[test]
    fn test_matches_bitcoin_crate() {
        let seed = hex::decode(SEED_HEX).unwrap();
        let secp = bitcoin::secp256k1::Secp256k1::new();
        let theirs_master = Xpriv::new_master(bitcoin::Network::Bitcoin, &seed).unwrap();

        let ours_master = ExtendedPrivateKey::master(&seed).unwrap();
        for path in ["m/0'/1", "m/44'/118'/0'/0/0", "m/44'/133'/2'/0/5"] {
            let ours = ours_master.derive_path(&path.parse().unwrap()).unwrap();
            let theirs = theirs_master
                .derive_priv(&secp, &bitcoin::bip32::DerivationPath::from_str(path).unwrap())
                .unwrap();
            assert_eq!(ours.secret_bytes(), &theirs.private_key.secret_bytes(), "{}", path);
            assert_eq!(
                ours.to_extended_public().unwrap().to_xpub(NetworkKind::Main),
                Xpub::from_priv(&secp, &theirs).to_string()
            );
        }
    }

    #[test]
    fn test_public_derivation_matches_private() {
        let seed = [7u8; 32];
        let account = ExtendedPrivateKey::master(&seed)
            .unwrap()
            .derive_path(&bip44_account(133, 0))
            .unwrap();
        let xpub = account.to_extended_public().unwrap();
        let path: DerivationPath = "m/0/3".parse().unwrap();
        assert_eq!(
            xpub.derive_path(&path).unwrap().public_key(),
            &account.derive_path(&path).unwrap().public_key().unwrap()
        );
    }

    #[test]
    fn test_public_rejects_hardened() {
        let xpub = ExtendedPrivateKey::master(&[1u8; 16])
            .unwrap()
            .to_extended_public()
            .unwrap();
        assert_eq!(
            xpub.derive_child(ChildIndex::Hardened(0)),
            Err(KeyError::HardenedFromPublic(0x8000_0000))
        );
    }

    #[test]
    fn test_xpub_string_roundtrip() {
        let xpub = ExtendedPrivateKey::master(&[9u8; 64])
            .unwrap()
            .derive_child(ChildIndex::Hardened(1))
            .unwrap()
            .to_extended_public()
            .unwrap();
        let encoded = xpub.to_xpub(NetworkKind::Test);
        assert!(encoded.starts_with("tpub"));
        let (decoded, network) = ExtendedPublicKey::from_xpub(&encoded).unwrap();
        assert_eq!(decoded, xpub);
        assert_eq!(network, NetworkKind::Test);
    }

    #[test]
    fn test_rejects_bad_seed_length() {
        assert_eq!(
            ExtendedPrivateKey::master(&[0u8; 8]).unwrap_err(),
            KeyError::InvalidSeed(8)
        );
    }
}
