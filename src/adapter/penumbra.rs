//! Penumbra adapter
//!
//! Balance, history and planning come from a view service holding the
//! full viewing key. The adapter hands the plan to the device as a sign
//! request and passes the returned authorization data back to the service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    accept_signatures, record_broadcast, send_summary, viewing_for, BackendBalance, Balance,
    NetworkAdapter, NetworkId, PlannedTransaction, SendParams, SyncProgress, TransactionSummary,
};
use crate::codec;
use crate::error::{AdapterError, QrError, TransactionError};
use crate::qr::penumbra::{self, PenumbraSignRequest, PenumbraSignatures};
use crate::qr::{FixedBytes, QrMessage};
use crate::wallet::{PendingTransaction, WalletRecord};

/// View service over a penumbra node (the host's wasm or gRPC client).
#[async_trait]
pub trait PenumbraViewService: Send + Sync {
    async fn start(&self) -> Result<(), AdapterError>;

    async fn stop(&self) -> Result<(), AdapterError>;

    async fn balance(&self, fvk: &str) -> Result<BackendBalance, AdapterError>;

    async fn transactions(
        &self,
        fvk: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TransactionSummary>, AdapterError>;

    /// Plan a transfer and compute its effect hash.
    async fn plan_transfer(
        &self,
        fvk: &str,
        params: &SendParams,
    ) -> Result<PlannedTransaction<64>, AdapterError>;

    /// Attach authorization data to the plan, build and broadcast.
    async fn authorize_and_broadcast(
        &self,
        plan: &[u8],
        auth: &PenumbraSignatures,
    ) -> Result<String, AdapterError>;

    /// Start block scanning; progress arrives on the returned channel, which
    /// closes when the scan is caught up or aborted.
    async fn sync_status(&self, fvk: &str) -> Result<mpsc::Receiver<SyncProgress>, AdapterError>;

    fn validate_address(&self, address: &str) -> bool;
}

pub struct PenumbraAdapter {
    service: Arc<dyn PenumbraViewService>,
    ready: AtomicBool,
}

impl PenumbraAdapter {
    pub fn new(service: Arc<dyn PenumbraViewService>) -> Self {
        Self {
            service,
            ready: AtomicBool::new(false),
        }
    }

    fn ensure_ready(&self) -> Result<(), AdapterError> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(AdapterError::NotReady(NetworkId::Penumbra.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkAdapter for PenumbraAdapter {
    fn network(&self) -> NetworkId {
        NetworkId::Penumbra
    }

    async fn initialize(&self) -> Result<(), AdapterError> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }
        self.service.start().await?;
        self.ready.store(true, Ordering::Release);
        log::info!("Penumbra view service started");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), AdapterError> {
        if !self.ready.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.service.stop().await?;
        log::info!("Penumbra view service stopped");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn get_balance(&self, wallet: &WalletRecord) -> Result<Balance, AdapterError> {
        self.ensure_ready()?;
        let viewing = viewing_for(wallet, NetworkId::Penumbra)?;
        let balance = self.service.balance(&viewing.viewing_key).await?;
        Ok(balance.into_balance(NetworkId::Penumbra))
    }

    async fn get_transactions(
        &self,
        wallet: &WalletRecord,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TransactionSummary>, AdapterError> {
        self.ensure_ready()?;
        let viewing = viewing_for(wallet, NetworkId::Penumbra)?;
        self.service
            .transactions(&viewing.viewing_key, limit, offset)
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
        let viewing = viewing_for(wallet, NetworkId::Penumbra)?;

        let planned = self
            .service
            .plan_transfer(&viewing.viewing_key, &params)
            .await?;
        let summary = send_summary(NetworkId::Penumbra, &params);
        let request = PenumbraSignRequest {
            account_index: wallet.account_index,
            digest: FixedBytes(planned.digest),
            plan: planned.plan,
            summary: summary.clone(),
        };
        let encoded = codec::bytes_to_hex(&penumbra::encode_sign_request(&request)?);

        let mut pending = PendingTransaction::new(NetworkId::Penumbra, &wallet.id, summary);
        pending.await_signature(encoded)?;
        log::info!(
            "Penumbra transfer {} planned, effect hash {}",
            pending.id,
            request.digest.to_hex()
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
        let request = penumbra::decode_sign_request(&raw)?;
        let auth = match accept_signatures(pending, signature_hex)? {
            QrMessage::PenumbraSignatures(auth) => auth,
            other => {
                return Err(TransactionError::SignatureMismatch(format!(
                    "expected penumbra signatures, got {:?}",
                    other.kind()
                ))
                .into())
            }
        };
        if auth.spend_auths.is_empty() {
            let reason = "device returned no spend authorizations";
            pending.fail(reason)?;
            return Err(TransactionError::SignatureMismatch(reason.into()).into());
        }

        pending.mark_broadcasting()?;
        let result = self
            .service
            .authorize_and_broadcast(&request.plan, &auth)
            .await;
        record_broadcast(pending, result)
    }

    fn validate_address(&self, address: &str) -> bool {
        self.service.validate_address(address)
    }

    async fn sync(
        &self,
        wallet: &WalletRecord,
        on_progress: &(dyn Fn(SyncProgress) + Send + Sync),
    ) -> Result<(), AdapterError> {
        self.ensure_ready()?;
        let viewing = viewing_for(wallet, NetworkId::Penumbra)?;
        let mut updates = self.service.sync_status(&viewing.viewing_key).await?;
        while let Some(progress) = updates.recv().await {
            on_progress(progress);
        }
        Ok(())
    }
}
