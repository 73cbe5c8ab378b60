//! Network adapters
//!
//! One [`NetworkAdapter`] per [`NetworkId`]. Adapters never sign: building a
//! send produces a sign-request QR, and completing it applies the
//! signatures scanned back from the device and broadcasts.

pub mod cosmos;
pub mod network;
pub mod penumbra;
pub mod registry;
pub mod substrate;
pub mod zcash;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
use crate::qr::ChainFamily;
use crate::wallet::{PendingTransaction, ViewingMaterial, WalletRecord};

pub use network::NetworkId;
pub use registry::{AdapterFactory, AdapterRegistry, DefaultAdapterFactory};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub total: u128,
    pub available: u128,
    pub pending: u128,
    pub denom: String,
    pub decimals: u8,
}

impl Balance {
    pub fn zero(network: NetworkId) -> Self {
        Self::confirmed(network, 0)
    }

    /// Balance with nothing pending.
    pub fn confirmed(network: NetworkId, amount: u128) -> Self {
        Self {
            total: amount,
            available: amount,
            pending: 0,
            denom: network.denom().to_string(),
            decimals: network.decimals(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    Incoming,
    Outgoing,
    SelfTransfer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub hash: String,
    pub height: Option<u64>,
    pub timestamp: Option<i64>,
    pub direction: TransferDirection,
    pub amount: u128,
    pub fee: Option<u128>,
    pub counterparty: Option<String>,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendParams {
    pub to: String,
    /// Amount in base units.
    pub amount: u128,
    #[serde(default)]
    pub memo: Option<String>,
    /// Fee override in base units; adapters pick a default otherwise.
    #[serde(default)]
    pub fee: Option<u128>,
}

/// Spendable and pending amounts reported by a chain backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendBalance {
    pub available: u128,
    pub pending: u128,
}

impl BackendBalance {
    pub fn into_balance(self, network: NetworkId) -> Balance {
        Balance {
            total: self.available.saturating_add(self.pending),
            available: self.available,
            pending: self.pending,
            denom: network.denom().to_string(),
            decimals: network.decimals(),
        }
    }
}

/// Unsigned transaction from a chain backend: the plan the device parses
/// and the digest it signs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTransaction<const D: usize> {
    pub plan: Vec<u8>,
    pub digest: [u8; D],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub current_height: u64,
    pub target_height: u64,
}

impl SyncProgress {
    pub fn percent(&self) -> f64 {
        if self.target_height == 0 {
            return 100.0;
        }
        (self.current_height.min(self.target_height) as f64 / self.target_height as f64) * 100.0
    }

    pub fn is_complete(&self) -> bool {
        self.current_height >= self.target_height
    }
}

/// Uniform lifecycle, balance, send and sync interface over one network.
///
/// Methods take `&self`; adapters keep their connection state behind
/// interior mutability so the registry can hand out shared references.
#[async_trait]
pub trait NetworkAdapter: Send + Sync {
    fn network(&self) -> NetworkId;

    async fn initialize(&self) -> Result<(), AdapterError>;

    /// Release connections and in-memory caches. Safe to call twice.
    async fn shutdown(&self) -> Result<(), AdapterError>;

    fn is_ready(&self) -> bool;

    async fn get_balance(&self, wallet: &WalletRecord) -> Result<Balance, AdapterError>;

    async fn get_transactions(
        &self,
        wallet: &WalletRecord,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TransactionSummary>, AdapterError>;

    /// Build an unsigned transfer and its sign-request QR.
    async fn build_send_transaction(
        &self,
        wallet: &WalletRecord,
        params: SendParams,
    ) -> Result<PendingTransaction, AdapterError>;

    /// Apply the device's signatures and broadcast. Returns the tx hash.
    async fn complete_send_transaction(
        &self,
        pending: &mut PendingTransaction,
        signature_hex: &str,
    ) -> Result<String, AdapterError>;

    fn validate_address(&self, address: &str) -> bool;

    fn format_amount(&self, amount: u128) -> String {
        format_amount(amount, self.network().decimals())
    }

    fn parse_amount(&self, amount: &str) -> Result<u128, AdapterError> {
        parse_amount(amount, self.network().decimals())
    }

    async fn sync(
        &self,
        wallet: &WalletRecord,
        on_progress: &(dyn Fn(SyncProgress) + Send + Sync),
    ) -> Result<(), AdapterError>;
}

/// Base units to a display string, trailing zeros trimmed.
pub fn format_amount(amount: u128, decimals: u8) -> String {
    let scale = 10u128.pow(decimals as u32);
    let whole = amount / scale;
    let frac = amount % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Display string to base units. Rejects more fractional digits than the
/// network supports.
pub fn parse_amount(amount: &str, decimals: u8) -> Result<u128, AdapterError> {
    let amount = amount.trim();
    let invalid = || AdapterError::InvalidAmount(amount.to_string());
    if amount.is_empty() {
        return Err(invalid());
    }
    let (whole, frac) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > decimals as usize {
        return Err(AdapterError::InvalidAmount(format!(
            "{} has more than {} decimal places",
            amount, decimals
        )));
    }

    let scale = 10u128.pow(decimals as u32);
    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let frac: u128 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac, width = decimals as usize);
        padded.parse().map_err(|_| invalid())?
    };
    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(invalid)
}

/// Viewing material for the wallet's entry in `network`'s family.
pub(crate) fn viewing_for<'a>(
    wallet: &'a WalletRecord,
    network: NetworkId,
) -> Result<&'a ViewingMaterial, AdapterError> {
    wallet
        .viewing(network.family())
        .ok_or_else(|| AdapterError::MissingViewingKey {
            wallet: wallet.id.clone(),
            network: network.to_string(),
        })
}

/// Check `signature_hex` answers `pending`'s request and move it to `Signed`.
///
/// A transaction already `Signed` with the same response (by a
/// `SignatureSession`) is accepted as is.
pub(crate) fn accept_signatures(
    pending: &mut PendingTransaction,
    signature_hex: &str,
) -> Result<crate::qr::QrMessage, AdapterError> {
    let request = crate::qr::decode_qr_hex(&pending.sign_request_hex)?;
    crate::wallet::session::check_response(&request, signature_hex)?;
    let response = crate::qr::decode_qr_hex(signature_hex)?;
    let already_signed = pending.status == crate::wallet::TxStatus::Signed
        && pending.signature_hex.as_deref() == Some(signature_hex);
    if !already_signed {
        pending.attach_signature(signature_hex.to_string())?;
    }
    Ok(response)
}

/// Apply a broadcast outcome to the pending transaction.
pub(crate) fn record_broadcast(
    pending: &mut PendingTransaction,
    result: Result<String, AdapterError>,
) -> Result<String, AdapterError> {
    match result {
        Ok(hash) => {
            pending.confirm(hash.clone())?;
            log::info!("Broadcast {} on {}: {}", pending.id, pending.network, hash);
            Ok(hash)
        }
        Err(e) => {
            pending.fail(e.to_string())?;
            Err(e)
        }
    }
}

/// One-line description shown on the device before it signs.
pub(crate) fn send_summary(network: NetworkId, params: &SendParams) -> String {
    format!(
        "Send {} {} to {}",
        format_amount(params.amount, network.decimals()),
        network.denom(),
        params.to
    )
}

pub(crate) fn require_family(network: NetworkId, family: ChainFamily) -> Result<(), AdapterError> {
    if network.family() != family {
        return Err(AdapterError::Backend(format!(
            "{} is not a {} network",
            network,
            family.name()
        )));
    }
    Ok(())
}
