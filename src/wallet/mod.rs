//! Wallet data model
//!
//! A wallet only ever holds viewing material and public addresses. Spending
//! keys stay on the signing device.

pub mod session;
pub mod transaction;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KeyError, WalletError};
use crate::keys::address::{ss58_encode, zcash_t_address};
use crate::keys::bip32::ExtendedPublicKey;
use crate::keys::{DerivationPath, NetworkKind};
use crate::qr::{ChainFamily, QrMessage};

pub use session::{CancelPolicy, SessionHandle, SignatureSession};
pub use transaction::{PendingTransaction, TxStatus};

/// Per-family viewing material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewingMaterial {
    /// Viewing key in the family's native text form (hex for raw keys,
    /// `uview...`/`xpub...` for zcash).
    pub viewing_key: String,
    /// Receive address, when it can be derived without a chain SDK.
    pub default_address: Option<String>,
    /// Every address the device exported, for families with several chains.
    #[serde(default)]
    pub addresses: Vec<String>,
    /// Zcash network or substrate genesis, depending on the family.
    #[serde(default)]
    pub network_hint: Option<String>,
}

impl ViewingMaterial {
    /// Extract viewing material from an FVK export.
    pub fn from_export(message: &QrMessage) -> Result<(u32, Option<String>, Self), WalletError> {
        match message {
            QrMessage::PenumbraFvkExport(export) => Ok((
                export.account_index,
                export.label.clone(),
                Self {
                    viewing_key: export.fvk.to_hex(),
                    default_address: None,
                    addresses: Vec::new(),
                    network_hint: Some(export.wallet_id.to_hex()),
                },
            )),
            QrMessage::ZcashFvkExport(export) => {
                let network = if export.mainnet {
                    NetworkKind::Main
                } else {
                    NetworkKind::Test
                };
                let default_address = match &export.transparent_xpub {
                    Some(xpub) => Some(transparent_receive_address(xpub, network, 0)?),
                    None => None,
                };
                let viewing_key = export
                    .ufvk
                    .clone()
                    .or_else(|| export.transparent_xpub.clone())
                    .ok_or(WalletError::NoViewingKey(ChainFamily::Zcash))?;
                Ok((
                    export.account_index,
                    export.label.clone(),
                    Self {
                        viewing_key,
                        default_address,
                        addresses: Vec::new(),
                        network_hint: Some(
                            if export.mainnet { "mainnet" } else { "testnet" }.to_string(),
                        ),
                    },
                ))
            }
            QrMessage::CosmosFvkExport(export) => Ok((
                export.account_index,
                export.label.clone(),
                Self {
                    viewing_key: export.public_key.to_hex(),
                    default_address: export.addresses.first().cloned(),
                    addresses: export.addresses.clone(),
                    network_hint: None,
                },
            )),
            QrMessage::SubstrateFvkExport(export) => Ok((
                export.account_index,
                export.label.clone(),
                Self {
                    viewing_key: export.public_key.to_hex(),
                    default_address: Some(ss58_encode(
                        export.public_key.as_bytes(),
                        export.ss58_prefix,
                    )?),
                    addresses: Vec::new(),
                    network_hint: Some(export.genesis_hash.to_hex()),
                },
            )),
            other => Err(WalletError::NotAnExport(format!(
                "{} {:?}",
                other.family().name(),
                other.kind()
            ))),
        }
    }
}

/// Transparent address at `<xpub>/0/<index>`.
pub fn transparent_receive_address(
    xpub: &str,
    network: NetworkKind,
    index: u32,
) -> Result<String, KeyError> {
    let (account, _) = ExtendedPublicKey::from_xpub(xpub)?;
    let path: DerivationPath = format!("m/0/{}", index).parse()?;
    let child = account.derive_path(&path)?;
    Ok(zcash_t_address(child.public_key(), network))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRecord {
    pub id: String,
    pub label: String,
    pub account_index: u32,
    pub imported_at: DateTime<Utc>,
    pub keys: BTreeMap<ChainFamily, ViewingMaterial>,
}

impl WalletRecord {
    /// Create a wallet from a scanned FVK export.
    pub fn from_export(message: &QrMessage) -> Result<Self, WalletError> {
        let family = message.family();
        let (account_index, label, material) = ViewingMaterial::from_export(message)?;
        let label = label.unwrap_or_else(|| format!("{} account {}", family.name(), account_index));

        let mut keys = BTreeMap::new();
        keys.insert(family, material);

        let record = Self {
            id: uuid::Uuid::new_v4().to_string(),
            label,
            account_index,
            imported_at: Utc::now(),
            keys,
        };
        log::info!(
            "Imported wallet {} ({}) with {} viewing key",
            record.id,
            record.label,
            family.name()
        );
        Ok(record)
    }

    pub fn from_export_hex(hex_str: &str) -> Result<Self, WalletError> {
        Self::from_export(&crate::qr::decode_qr_hex(hex_str)?)
    }

    pub fn rename(&mut self, label: &str) -> Result<(), WalletError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(WalletError::InvalidLabel("label must not be empty".into()));
        }
        if label.len() > 255 {
            return Err(WalletError::InvalidLabel("label longer than 255 bytes".into()));
        }
        self.label = label.to_string();
        Ok(())
    }

    /// Add another family exported from the same device account.
    pub fn attach(&mut self, message: &QrMessage) -> Result<ChainFamily, WalletError> {
        let family = message.family();
        if self.keys.contains_key(&family) {
            return Err(WalletError::FamilyExists(family));
        }
        let (account_index, _, material) = ViewingMaterial::from_export(message)?;
        if account_index != self.account_index {
            return Err(WalletError::AccountMismatch {
                expected: self.account_index,
                found: account_index,
            });
        }
        self.keys.insert(family, material);
        log::info!("Attached {} viewing key to wallet {}", family.name(), self.id);
        Ok(family)
    }

    pub fn viewing(&self, family: ChainFamily) -> Option<&ViewingMaterial> {
        self.keys.get(&family)
    }

    pub fn families(&self) -> impl Iterator<Item = ChainFamily> + '_ {
        self.keys.keys().copied()
    }
}
