use serde::{Deserialize, Serialize};

use crate::codec::{self, Reader};
use crate::error::LightClientError;
use crate::hashing::blake2b_128;

/// twox128("System") ++ twox128("Account")
pub const SYSTEM_ACCOUNT_PREFIX: [u8; 32] = [
    0x26, 0xaa, 0x39, 0x4e, 0xea, 0x56, 0x30, 0xe0, 0x7c, 0x48, 0xae, 0x0c, 0x95, 0x58, 0xce, 0xf7,
    0xb9, 0x9d, 0x88, 0x0e, 0xc6, 0x81, 0x79, 0x9c, 0x0c, 0xf3, 0x0e, 0x88, 0x86, 0x37, 0x1d, 0xa9,
];

/// Storage key of `System.Account(account)` (Blake2_128Concat hasher).
pub fn system_account_key(account: &[u8; 32]) -> Vec<u8> {
    let mut key = Vec::with_capacity(32 + 16 + 32);
    key.extend_from_slice(&SYSTEM_ACCOUNT_PREFIX);
    key.extend_from_slice(&blake2b_128(account));
    key.extend_from_slice(account);
    key
}

/// `frame_system::AccountInfo` with the balances pallet's `AccountData`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub nonce: u32,
    pub consumers: u32,
    pub providers: u32,
    pub sufficients: u32,
    pub free: u128,
    pub reserved: u128,
    pub frozen: u128,
}

impl AccountInfo {
    /// Decode SCALE bytes. Trailing fields (the `flags` word, or the legacy
    /// second frozen balance) are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, LightClientError> {
        let mut r = Reader::new(bytes);
        let mut read = || -> Result<Self, crate::error::CodecError> {
            Ok(Self {
                nonce: r.u32_le()?,
                consumers: r.u32_le()?,
                providers: r.u32_le()?,
                sufficients: r.u32_le()?,
                free: u128::from_le_bytes(r.array::<16>()?),
                reserved: u128::from_le_bytes(r.array::<16>()?),
                frozen: u128::from_le_bytes(r.array::<16>()?),
            })
        };
        read().map_err(|e| LightClientError::InvalidResponse(format!("AccountInfo: {}", e)))
    }

    /// Decode the hex value of a `state_getStorage` response; `null` means
    /// the account does not exist.
    pub fn from_storage_value(value: &serde_json::Value) -> Result<Self, LightClientError> {
        match value {
            serde_json::Value::Null => Ok(Self::default()),
            serde_json::Value::String(hex_str) => {
                let bytes = codec::hex_to_bytes(hex_str)
                    .map_err(|e| LightClientError::InvalidResponse(e.to_string()))?;
                Self::decode(&bytes)
            }
            other => Err(LightClientError::InvalidResponse(format!(
                "expected hex storage value, got {}",
                other
            ))),
        }
    }

    pub fn total(&self) -> u128 {
        self.free.saturating_add(self.reserved)
    }

    /// Free balance not locked by freezes beyond what is already reserved.
    pub fn transferable(&self) -> u128 {
        self.free
            .saturating_sub(self.frozen.saturating_sub(self.reserved))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeVersion {
    pub spec_name: String,
    pub spec_version: u32,
    pub transaction_version: u32,
}
