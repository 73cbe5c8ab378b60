//! Zcash adapter
//!
//! Shielded scanning, note selection and proving live in the host's wallet
//! backend. Transparent addresses are checked locally so a typo is caught
//! before the backend is asked to propose anything.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::{
    accept_signatures, record_broadcast, send_summary, viewing_for, BackendBalance, Balance,
    NetworkAdapter, NetworkId, PlannedTransaction, SendParams, SyncProgress, TransactionSummary,
};
use crate::codec;
use crate::error::{AdapterError, QrError, TransactionError};
use crate::keys::address::decode_zcash_t_address;
use crate::keys::NetworkKind;
use crate::qr::zcash::{self, ZcashSignRequest, ZcashSignatures};
use crate::qr::{FixedBytes, QrMessage};
use crate::wallet::{PendingTransaction, WalletRecord};

/// Zcash light wallet (lightwalletd client plus local note store).
#[async_trait]
pub trait ZcashWalletBackend: Send + Sync {
    async fn start(&self, network: NetworkKind) -> Result<(), AdapterError>;

    async fn stop(&self) -> Result<(), AdapterError>;

    async fn balance(&self, viewing_key: &str) -> Result<BackendBalance, AdapterError>;

    async fn transactions(
        &self,
        viewing_key: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TransactionSummary>, AdapterError>;

    /// Select notes and build an unsigned proposal with its sighash.
    async fn propose_transfer(
        &self,
        viewing_key: &str,
        params: &SendParams,
    ) -> Result<PlannedTransaction<32>, AdapterError>;

    /// Apply spend authorizations to the proposal, prove and broadcast.
    async fn apply_signatures_and_broadcast(
        &self,
        plan: &[u8],
        signatures: &ZcashSignatures,
    ) -> Result<String, AdapterError>;

    async fn scan(
        &self,
        viewing_key: &str,
        on_progress: &(dyn Fn(SyncProgress) + Send + Sync),
    ) -> Result<(), AdapterError>;

    /// Unified and sapling addresses; transparent ones never reach here.
    fn validate_shielded_address(&self, address: &str, network: NetworkKind) -> bool;
}

pub struct ZcashAdapter {
    backend: Arc<dyn ZcashWalletBackend>,
    network: NetworkKind,
    ready: AtomicBool,
}

impl ZcashAdapter {
    pub fn new(backend: Arc<dyn ZcashWalletBackend>, network: NetworkKind) -> Self {
        Self {
            backend,
            network,
            ready: AtomicBool::new(false),
        }
    }

    pub fn network_kind(&self) -> NetworkKind {
        self.network
    }

    fn ensure_ready(&self) -> Result<(), AdapterError> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(AdapterError::NotReady(NetworkId::Zcash.to_string()));
        }
        Ok(())
    }
}

fn is_transparent(address: &str) -> bool {
    address.starts_with('t')
}

#[async_trait]
impl NetworkAdapter for ZcashAdapter {
    fn network(&self) -> NetworkId {
        NetworkId::Zcash
    }

    async fn initialize(&self) -> Result<(), AdapterError> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }
        self.backend.start(self.network).await?;
        self.ready.store(true, Ordering::Release);
        log::info!("Zcash backend started ({:?})", self.network);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), AdapterError> {
        if !self.ready.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.backend.stop().await?;
        log::info!("Zcash backend stopped");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn get_balance(&self, wallet: &WalletRecord) -> Result<Balance, AdapterError> {
        self.ensure_ready()?;
        let viewing = viewing_for(wallet, NetworkId::Zcash)?;
        let balance = self.backend.balance(&viewing.viewing_key).await?;
        Ok(balance.into_balance(NetworkId::Zcash))
    }

    async fn get_transactions(
        &self,
        wallet: &WalletRecord,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TransactionSummary>, AdapterError> {
        self.ensure_ready()?;
        let viewing = viewing_for(wallet, NetworkId::Zcash)?;
        self.backend
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
        let viewing = viewing_for(wallet, NetworkId::Zcash)?;
        if let Some(hint) = viewing.network_hint.as_deref() {
            let wallet_network: NetworkKind = hint.parse()?;
            if wallet_network != self.network {
                return Err(AdapterError::Backend(format!(
                    "wallet was exported for {:?}, adapter runs on {:?}",
                    wallet_network, self.network
                )));
            }
        }

        let planned = self
            .backend
            .propose_transfer(&viewing.viewing_key, &params)
            .await?;
        let summary = send_summary(NetworkId::Zcash, &params);
        let request = ZcashSignRequest {
            account_index: wallet.account_index,
            digest: FixedBytes(planned.digest),
            plan: planned.plan,
            summary: summary.clone(),
        };
        let encoded = codec::bytes_to_hex(&zcash::encode_sign_request(&request)?);

        let mut pending = PendingTransaction::new(NetworkId::Zcash, &wallet.id, summary);
        pending.await_signature(encoded)?;
        log::info!(
            "Zcash proposal {} ready, sighash {}",
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
        let request = zcash::decode_sign_request(&raw)?;
        let signatures = match accept_signatures(pending, signature_hex)? {
            QrMessage::ZcashSignatures(signatures) => signatures,
            other => {
                return Err(TransactionError::SignatureMismatch(format!(
                    "expected zcash signatures, got {:?}",
                    other.kind()
                ))
                .into())
            }
        };
        if signatures.orchard_spend_auths.is_empty() && signatures.transparent.is_empty() {
            let reason = "device returned no spend signatures";
            pending.fail(reason)?;
            return Err(TransactionError::SignatureMismatch(reason.into()).into());
        }

        pending.mark_broadcasting()?;
        let result = self
            .backend
            .apply_signatures_and_broadcast(&request.plan, &signatures)
            .await;
        record_broadcast(pending, result)
    }

    fn validate_address(&self, address: &str) -> bool {
        if is_transparent(address) {
            return decode_zcash_t_address(address, self.network).is_ok();
        }
        self.backend.validate_shielded_address(address, self.network)
    }

    async fn sync(
        &self,
        wallet: &WalletRecord,
        on_progress: &(dyn Fn(SyncProgress) + Send + Sync),
    ) -> Result<(), AdapterError> {
        self.ensure_ready()?;
        let viewing = viewing_for(wallet, NetworkId::Zcash)?;
        self.backend.scan(&viewing.viewing_key, on_progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr::zcash::ZcashFvkExport;
    use crate::wallet::TxStatus;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockBackend {
        applied: Mutex<Vec<ZcashSignatures>>,
    }

    #[async_trait]
    impl ZcashWalletBackend for MockBackend {
        async fn start(&self, _network: NetworkKind) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn balance(&self, _viewing_key: &str) -> Result<BackendBalance, AdapterError> {
            Ok(BackendBalance {
                available: 150_000_000,
                pending: 0,
            })
        }

        async fn transactions(
            &self,
            _viewing_key: &str,
            _limit: usize,
            _offset: usize,
        ) -> Result<Vec<TransactionSummary>, AdapterError> {
            Ok(Vec::new())
        }

        async fn propose_transfer(
            &self,
            _viewing_key: &str,
            _params: &SendParams,
        ) -> Result<PlannedTransaction<32>, AdapterError> {
            Ok(PlannedTransaction {
                plan: vec![0x05, 0x00],
                digest: [0x5a; 32],
            })
        }

        async fn apply_signatures_and_broadcast(
            &self,
            _plan: &[u8],
            signatures: &ZcashSignatures,
        ) -> Result<String, AdapterError> {
            self.applied.lock().unwrap().push(signatures.clone());
            Err(AdapterError::Network("lightwalletd unreachable".into()))
        }

        async fn scan(
            &self,
            _viewing_key: &str,
            on_progress: &(dyn Fn(SyncProgress) + Send + Sync),
        ) -> Result<(), AdapterError> {
            on_progress(SyncProgress {
                current_height: 10,
                target_height: 10,
            });
            Ok(())
        }

        fn validate_shielded_address(&self, address: &str, _network: NetworkKind) -> bool {
            address.starts_with("u1")
        }
    }

    fn wallet(mainnet: bool) -> WalletRecord {
        WalletRecord::from_export(&QrMessage::ZcashFvkExport(ZcashFvkExport {
            account_index: 0,
            label: None,
            mainnet,
            ufvk: Some("uview1test".into()),
            transparent_xpub: None,
        }))
        .unwrap()
    }

    fn adapter() -> (Arc<MockBackend>, ZcashAdapter) {
        let backend = Arc::new(MockBackend::default());
        (backend.clone(), ZcashAdapter::new(backend, NetworkKind::Main))
    }

    #[test]
    fn test_validate_address_routes_by_kind() {
        let (_, adapter) = adapter();
        assert!(adapter.validate_address("t1XVXWCvpMgBvUaed4XDqWtgQgJSu1Ghz7F"));
        assert!(!adapter.validate_address("t1XVXWCvpMgBvUaed4XDqWtgQgJSu1Ghz7G"));
        assert!(adapter.validate_address("u1abc"));
        assert!(!adapter.validate_address("zs1abc"));
    }

    #[tokio::test]
    async fn test_rejects_wallet_from_other_network() {
        let (_, adapter) = adapter();
        adapter.initialize().await.unwrap();
        let params = SendParams {
            to: "u1dest".into(),
            amount: 1,
            memo: None,
            fee: None,
        };
        assert!(matches!(
            adapter.build_send_transaction(&wallet(false), params).await,
            Err(AdapterError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_broadcast_failure_marks_failed() {
        let (backend, adapter) = adapter();
        adapter.initialize().await.unwrap();
        let params = SendParams {
            to: "u1dest".into(),
            amount: 50_000,
            memo: Some("thanks".into()),
            fee: None,
        };
        let mut pending = adapter
            .build_send_transaction(&wallet(true), params)
            .await
            .unwrap();

        let signatures = ZcashSignatures {
            sighash: FixedBytes([0x5a; 32]),
            orchard_spend_auths: vec![FixedBytes([9; 64])],
            transparent: vec![],
            binding: None,
        };
        let response = codec::bytes_to_hex(&signatures.encode_qr().unwrap());
        let result = adapter.complete_send_transaction(&mut pending, &response).await;

        assert!(matches!(result, Err(AdapterError::Network(_))));
        assert_eq!(pending.status, TxStatus::Failed);
        assert_eq!(backend.applied.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_sighash_is_rejected_before_broadcast() {
        let (backend, adapter) = adapter();
        adapter.initialize().await.unwrap();
        let params = SendParams {
            to: "u1dest".into(),
            amount: 50_000,
            memo: None,
            fee: None,
        };
        let mut pending = adapter
            .build_send_transaction(&wallet(true), params)
            .await
            .unwrap();
        let signatures = ZcashSignatures {
            sighash: FixedBytes([0x00; 32]),
            orchard_spend_auths: vec![FixedBytes([9; 64])],
            transparent: vec![],
            binding: None,
        };
        let response = codec::bytes_to_hex(&signatures.encode_qr().unwrap());
        assert!(adapter
            .complete_send_transaction(&mut pending, &response)
            .await
            .is_err());
        assert_eq!(pending.status, TxStatus::AwaitingSignature);
        assert!(backend.applied.lock().unwrap().is_empty());
    }
}
