//! Address encodings: Base58Check (zcash transparent), SS58 (substrate) and
//! bech32 (cosmos).

use bech32::{FromBase32, ToBase32, Variant};
use bitcoin::base58;
use bitcoin::hashes::{hash160, Hash};

use super::NetworkKind;
use crate::error::KeyError;
use crate::hashing::blake2b_512;

pub const ZCASH_T_ADDR_MAINNET: [u8; 2] = [0x1C, 0xB8];
pub const ZCASH_T_ADDR_TESTNET: [u8; 2] = [0x1D, 0x25];

const SS58_PREFIX: &[u8] = b"SS58PRE";
const SS58_CHECKSUM_LEN: usize = 2;
pub const SS58_MAX_PREFIX: u16 = 16383;

pub fn hash160(data: &[u8]) -> [u8; 20] {
    hash160::Hash::hash(data).to_byte_array()
}

// ============================================================================
// Base58Check
// ============================================================================

pub fn base58check_encode(version: &[u8], payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(version.len() + payload.len());
    data.extend_from_slice(version);
    data.extend_from_slice(payload);
    base58::encode_check(&data)
}

/// Returns `(version, payload)`.
pub fn base58check_decode(
    encoded: &str,
    version_len: usize,
) -> Result<(Vec<u8>, Vec<u8>), KeyError> {
    let data =
        base58::decode_check(encoded).map_err(|e| KeyError::InvalidAddress(e.to_string()))?;
    if data.len() < version_len {
        return Err(KeyError::InvalidAddress(format!(
            "{} bytes is shorter than the version prefix",
            data.len()
        )));
    }
    let (version, payload) = data.split_at(version_len);
    Ok((version.to_vec(), payload.to_vec()))
}

pub fn zcash_t_address(public_key: &[u8; 33], network: NetworkKind) -> String {
    let version = match network {
        NetworkKind::Main => ZCASH_T_ADDR_MAINNET,
        NetworkKind::Test => ZCASH_T_ADDR_TESTNET,
    };
    base58check_encode(&version, &hash160(public_key))
}

/// Decode a transparent P2PKH address, returning its pubkey hash.
pub fn decode_zcash_t_address(address: &str, network: NetworkKind) -> Result<[u8; 20], KeyError> {
    let (version, payload) = base58check_decode(address, 2)?;
    let expected = match network {
        NetworkKind::Main => ZCASH_T_ADDR_MAINNET,
        NetworkKind::Test => ZCASH_T_ADDR_TESTNET,
    };
    if version != expected {
        return Err(KeyError::InvalidAddress(format!(
            "version {} is not a {:?} transparent address",
            hex::encode(&version),
            network
        )));
    }
    payload
        .try_into()
        .map_err(|_| KeyError::InvalidAddress("pubkey hash must be 20 bytes".into()))
}

// ============================================================================
// SS58
// ============================================================================

fn ss58_checksum(data: &[u8]) -> [u8; SS58_CHECKSUM_LEN] {
    let hash = blake2b_512(&[SS58_PREFIX, data]);
    [hash[0], hash[1]]
}

/// Simple prefixes (`< 64`) take one byte, full prefixes two.
fn ss58_prefix_bytes(prefix: u16) -> Result<Vec<u8>, KeyError> {
    match prefix {
        0..=63 => Ok(vec![prefix as u8]),
        64..=SS58_MAX_PREFIX => {
            let first = (((prefix & 0b0000_0000_1111_1100) >> 2) as u8) | 0b0100_0000;
            let second = ((prefix >> 8) as u8) | (((prefix & 0b0000_0000_0000_0011) as u8) << 6);
            Ok(vec![first, second])
        }
        _ => Err(KeyError::InvalidAddress(format!(
            "ss58 prefix {} exceeds {}",
            prefix, SS58_MAX_PREFIX
        ))),
    }
}

pub fn ss58_encode(public_key: &[u8; 32], prefix: u16) -> Result<String, KeyError> {
    let mut data = ss58_prefix_bytes(prefix)?;
    data.extend_from_slice(public_key);
    let checksum = ss58_checksum(&data);
    data.extend_from_slice(&checksum);
    Ok(base58::encode(&data))
}

/// Returns `(prefix, public_key)`.
pub fn ss58_decode(address: &str) -> Result<(u16, [u8; 32]), KeyError> {
    let data = base58::decode(address).map_err(|e| KeyError::InvalidAddress(e.to_string()))?;
    let (prefix, prefix_len) = match data.first() {
        Some(&b) if b < 64 => (b as u16, 1),
        Some(&b) if b < 128 => {
            let second = *data
                .get(1)
                .ok_or_else(|| KeyError::InvalidAddress("truncated ss58 prefix".into()))?;
            let lower = (b << 2) | (second >> 6);
            let upper = second & 0b0011_1111;
            ((lower as u16) | ((upper as u16) << 8), 2)
        }
        Some(&b) => {
            return Err(KeyError::InvalidAddress(format!(
                "reserved ss58 prefix byte 0x{:02x}",
                b
            )))
        }
        None => return Err(KeyError::InvalidAddress("empty address".into())),
    };

    if data.len() != prefix_len + 32 + SS58_CHECKSUM_LEN {
        return Err(KeyError::InvalidAddress(format!(
            "ss58 address decodes to {} bytes",
            data.len()
        )));
    }
    let body_end = data.len() - SS58_CHECKSUM_LEN;
    if ss58_checksum(&data[..body_end]) != data[body_end..] {
        return Err(KeyError::BadChecksum);
    }
    let mut public_key = [0u8; 32];
    public_key.copy_from_slice(&data[prefix_len..body_end]);
    Ok((prefix, public_key))
}

// ============================================================================
// Bech32
// ============================================================================

/// Cosmos account address: bech32(hrp, ripemd160(sha256(pubkey))).
pub fn cosmos_bech32(hrp: &str, public_key: &[u8; 33]) -> Result<String, KeyError> {
    bech32::encode(hrp, hash160(public_key).to_base32(), Variant::Bech32)
        .map_err(|e| KeyError::InvalidAddress(e.to_string()))
}

/// Decode and check the human readable part, returning the 20-byte account.
pub fn validate_bech32(hrp: &str, address: &str) -> Result<Vec<u8>, KeyError> {
    let (found_hrp, data, variant) =
        bech32::decode(address).map_err(|e| KeyError::InvalidAddress(e.to_string()))?;
    if found_hrp != hrp {
        return Err(KeyError::InvalidAddress(format!(
            "expected prefix {}, found {}",
            hrp, found_hrp
        )));
    }
    if variant != Variant::Bech32 {
        return Err(KeyError::InvalidAddress("bech32m is not used for accounts".into()));
    }
    let bytes = Vec::<u8>::from_base32(&data).map_err(|e| KeyError::InvalidAddress(e.to_string()))?;
    if bytes.len() != 20 && bytes.len() != 32 {
        return Err(KeyError::InvalidAddress(format!(
            "account is {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes)
}
