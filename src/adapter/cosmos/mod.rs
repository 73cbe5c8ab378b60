//! Cosmos SDK adapter
//!
//! Builds `MsgSend` transactions in direct sign mode. The sign request plan
//! is the encoded `SignDoc`, so completing a send needs nothing beyond the
//! pending transaction itself: the signer key comes out of the `AuthInfo`
//! and the device signature is checked against it before broadcast.

pub mod proto;
pub mod rest;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use prost::Message;
use secp256k1::{ecdsa, Message as SecpMessage, PublicKey, Secp256k1};

use super::{
    accept_signatures, record_broadcast, require_family, send_summary, viewing_for, Balance,
    NetworkAdapter, NetworkId, SendParams, SyncProgress, TransactionSummary,
};
use crate::codec;
use crate::error::{AdapterError, QrError, TransactionError};
use crate::keys::address::{cosmos_bech32, validate_bech32};
use crate::qr::cosmos::{self as cosmos_qr, CosmosSignRequest};
use crate::qr::{ChainFamily, FixedBytes, QrMessage};
use crate::wallet::{PendingTransaction, ViewingMaterial, WalletRecord};

use proto::{SendDoc, SignDoc};
pub use rest::RestCosmosClient;

pub const DEFAULT_GAS_LIMIT: u64 = 200_000;

/// Flat fee in base units when the caller does not override it.
pub fn default_fee(network: NetworkId) -> u128 {
    match network {
        NetworkId::Noble => 20_000,
        NetworkId::Celestia => 4_000,
        _ => 5_000,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CosmosAccount {
    pub account_number: u64,
    pub sequence: u64,
}

/// Chain access needed by the adapter.
#[async_trait]
pub trait CosmosRpc: Send + Sync {
    async fn account(&self, address: &str) -> Result<CosmosAccount, AdapterError>;

    async fn balance(&self, address: &str, denom: &str) -> Result<u128, AdapterError>;

    async fn transactions(
        &self,
        address: &str,
        denom: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TransactionSummary>, AdapterError>;

    async fn latest_height(&self) -> Result<u64, AdapterError>;

    /// Broadcast encoded `TxRaw` bytes and return the tx hash.
    async fn broadcast(&self, tx_bytes: &[u8]) -> Result<String, AdapterError>;
}

pub struct CosmosAdapter {
    network: NetworkId,
    rpc: Arc<dyn CosmosRpc>,
    ready: AtomicBool,
}

impl CosmosAdapter {
    pub fn new(network: NetworkId, rpc: Arc<dyn CosmosRpc>) -> Result<Self, AdapterError> {
        require_family(network, ChainFamily::Cosmos)?;
        Ok(Self {
            network,
            rpc,
            ready: AtomicBool::new(false),
        })
    }

    fn hrp(&self) -> &'static str {
        self.network.bech32_hrp().unwrap_or("cosmos")
    }

    fn denom(&self) -> &'static str {
        self.network.base_denom().unwrap_or("uatom")
    }

    fn ensure_ready(&self) -> Result<(), AdapterError> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(AdapterError::NotReady(self.network.to_string()));
        }
        Ok(())
    }

    /// The wallet's address on this chain: the exported one if present,
    /// otherwise derived from the public key.
    fn address_of(&self, viewing: &ViewingMaterial) -> Result<String, AdapterError> {
        let prefix = format!("{}1", self.hrp());
        if let Some(address) = viewing.addresses.iter().find(|a| a.starts_with(&prefix)) {
            return Ok(address.clone());
        }
        Ok(cosmos_bech32(self.hrp(), &public_key_of(viewing)?)?)
    }
}

fn public_key_of(viewing: &ViewingMaterial) -> Result<[u8; 33], AdapterError> {
    let bytes = codec::hex_to_bytes(&viewing.viewing_key).map_err(QrError::from)?;
    bytes.try_into().map_err(|v: Vec<u8>| {
        AdapterError::Key(crate::error::KeyError::InvalidPublicKey(format!(
            "expected 33 bytes, got {}",
            v.len()
        )))
    })
}

/// Check a compact secp256k1 signature over `digest`.
fn verify_signature(
    public_key: &[u8; 33],
    digest: &[u8; 32],
    signature: &[u8; 64],
) -> Result<(), TransactionError> {
    let mismatch = |e: secp256k1::Error| TransactionError::SignatureMismatch(e.to_string());
    let secp = Secp256k1::verification_only();
    let key = PublicKey::from_slice(public_key).map_err(mismatch)?;
    let sig = ecdsa::Signature::from_compact(signature).map_err(mismatch)?;
    secp.verify_ecdsa(&SecpMessage::from_digest(*digest), &sig, &key)
        .map_err(mismatch)
}

#[async_trait]
impl NetworkAdapter for CosmosAdapter {
    fn network(&self) -> NetworkId {
        self.network
    }

    async fn initialize(&self) -> Result<(), AdapterError> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }
        let height = self.rpc.latest_height().await?;
        self.ready.store(true, Ordering::Release);
        log::info!("{} adapter ready at height {}", self.network, height);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), AdapterError> {
        if self.ready.swap(false, Ordering::AcqRel) {
            log::info!("{} adapter shut down", self.network);
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn get_balance(&self, wallet: &WalletRecord) -> Result<Balance, AdapterError> {
        self.ensure_ready()?;
        let address = self.address_of(viewing_for(wallet, self.network)?)?;
        let amount = self.rpc.balance(&address, self.denom()).await?;
        Ok(Balance::confirmed(self.network, amount))
    }

    async fn get_transactions(
        &self,
        wallet: &WalletRecord,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TransactionSummary>, AdapterError> {
        self.ensure_ready()?;
        let address = self.address_of(viewing_for(wallet, self.network)?)?;
        self.rpc
            .transactions(&address, self.denom(), limit, offset)
            .await
    }

    async fn build_send_transaction(
        &self,
        wallet: &WalletRecord,
        params: SendParams,
    ) -> Result<PendingTransaction, AdapterError> {
        self.ensure_ready()?;
        if !self.validate_address(&params.to) {
            return Err(AdapterError::InvalidAddress(params.to));
        }
        if params.amount == 0 {
            return Err(AdapterError::InvalidAmount("amount must be positive".into()));
        }
        let viewing = viewing_for(wallet, self.network)?;
        let public_key = public_key_of(viewing)?;
        let from = self.address_of(viewing)?;
        let fee = params.fee.unwrap_or_else(|| default_fee(self.network));

        let available = self.rpc.balance(&from, self.denom()).await?;
        let needed = params.amount.saturating_add(fee);
        if available < needed {
            return Err(AdapterError::InsufficientFunds(format!(
                "need {} {}, have {}",
                self.format_amount(needed),
                self.network.denom(),
                self.format_amount(available)
            )));
        }

        let account = self.rpc.account(&from).await?;
        let chain_id = self.network.cosmos_chain_id().unwrap_or_default();
        let sign_doc = SendDoc {
            chain_id,
            account_number: account.account_number,
            sequence: account.sequence,
            public_key: &public_key,
            from: &from,
            to: &params.to,
            denom: self.denom(),
            amount: params.amount,
            fee,
            gas_limit: DEFAULT_GAS_LIMIT,
            memo: params.memo.as_deref().unwrap_or_default(),
        }
        .to_sign_doc();

        let summary = send_summary(self.network, &params);
        let request = CosmosSignRequest {
            account_index: wallet.account_index,
            digest: FixedBytes(sign_doc.digest()),
            plan: sign_doc.encode_to_vec(),
            summary: summary.clone(),
        };
        let encoded = codec::bytes_to_hex(&cosmos_qr::encode_sign_request(&request)?);

        let mut pending = PendingTransaction::new(self.network, &wallet.id, summary);
        pending.await_signature(encoded)?;
        log::info!(
            "{} send {} built: account {} sequence {}",
            self.network,
            pending.id,
            account.account_number,
            account.sequence
        );
        Ok(pending)
    }

    async fn complete_send_transaction(
        &self,
        pending: &mut PendingTransaction,
        signature_hex: &str,
    ) -> Result<String, AdapterError> {
        self.ensure_ready()?;
        let raw = codec::hex_to_bytes(&pending.sign_request_hex).map_err(QrError::from)?;
        let request = cosmos_qr::decode_sign_request(&raw)?;
        let sign_doc = SignDoc::decode(request.plan.as_slice())
            .map_err(|e| AdapterError::Backend(format!("stored sign doc is corrupt: {}", e)))?;
        if sign_doc.digest() != request.digest.0 {
            return Err(AdapterError::Backend("stored sign doc does not match its digest".into()));
        }
        let signer = sign_doc
            .signer_public_key()
            .ok_or_else(|| AdapterError::Backend("sign doc has no secp256k1 signer".into()))?;

        let signatures = match accept_signatures(pending, signature_hex)? {
            QrMessage::CosmosSignatures(list) => list,
            other => {
                return Err(TransactionError::SignatureMismatch(format!(
                    "expected cosmos signatures, got {:?}",
                    other.kind()
                ))
                .into())
            }
        };
        let checked = match signatures.signatures.first() {
            Some(sig) => verify_signature(&signer, &request.digest.0, &sig.0).map(|_| sig.0),
            None => Err(TransactionError::SignatureMismatch(
                "device returned no signature".into(),
            )),
        };
        let signature = match checked {
            Ok(signature) => signature,
            Err(e) => {
                pending.fail(e.to_string())?;
                return Err(e.into());
            }
        };

        let tx_bytes = sign_doc.into_tx_raw(signature.to_vec()).encode_to_vec();
        pending.mark_broadcasting()?;
        let result = self.rpc.broadcast(&tx_bytes).await;
        record_broadcast(pending, result)
    }

    fn validate_address(&self, address: &str) -> bool {
        validate_bech32(self.hrp(), address).is_ok()
    }

    /// Nothing to scan locally; reports the chain tip once.
    async fn sync(
        &self,
        _wallet: &WalletRecord,
        on_progress: &(dyn Fn(SyncProgress) + Send + Sync),
    ) -> Result<(), AdapterError> {
        self.ensure_ready()?;
        let height = self.rpc.latest_height().await?;
        on_progress(SyncProgress {
            current_height: height,
            target_height: height,
        });
        Ok(())
    }
}
