mod common;

use std::sync::{Arc, Mutex};

use airgap_core::adapter::cosmos::proto::TxRaw;
use airgap_core::adapter::cosmos::{CosmosAccount, CosmosRpc};
use airgap_core::error::AdapterError;
use airgap_core::keys::bip32::ExtendedPrivateKey;
use airgap_core::keys::{self, path, seed_from_phrase};
use airgap_core::qr::cosmos::{decode_sign_request, CosmosFvkExport};
use airgap_core::qr::{FixedBytes, SignatureList};
use airgap_core::wallet::{CancelPolicy, SignatureSession};
use airgap_core::{
    AdapterRegistry, CoreConfig, DefaultAdapterFactory, MetadataCache, NetworkId, QrMessage,
    SendParams, TransactionSummary, TxStatus, WalletRecord,
};
use async_trait::async_trait;
use common::{init_logging, light_clients, ABANDON};
use prost::Message;
use secp256k1::{Message as SecpMessage, Secp256k1, SecretKey};

struct LedgerRpc {
    balance: u128,
    broadcasts: Mutex<Vec<Vec<u8>>>,
}

#[async_trait]
impl CosmosRpc for LedgerRpc {
    async fn account(&self, _address: &str) -> Result<CosmosAccount, AdapterError> {
        Ok(CosmosAccount {
            account_number: 12,
            sequence: 0,
        })
    }

    async fn balance(&self, _address: &str, _denom: &str) -> Result<u128, AdapterError> {
        Ok(self.balance)
    }

    async fn transactions(
        &self,
        _address: &str,
        _denom: &str,
        _limit: usize,
        _offset: usize,
    ) -> Result<Vec<TransactionSummary>, AdapterError> {
        Ok(Vec::new())
    }

    async fn latest_height(&self) -> Result<u64, AdapterError> {
        Ok(2_000_000)
    }

    async fn broadcast(&self, tx_bytes: &[u8]) -> Result<String, AdapterError> {
        self.broadcasts.lock().unwrap().push(tx_bytes.to_vec());
        Ok("4F1A".into())
    }
}

struct Device {
    secret: SecretKey,
    public_key: [u8; 33],
}

impl Device {
    fn new() -> Self {
        let seed = seed_from_phrase(ABANDON, "").unwrap();
        let xprv = ExtendedPrivateKey::master(seed.as_bytes())
            .unwrap()
            .derive_path(&path::bip44(path::COIN_COSMOS, 0, 0))
            .unwrap();
        Self {
            secret: SecretKey::from_slice(xprv.secret_bytes()).unwrap(),
            public_key: keys::cosmos_public_key(seed.as_bytes(), 0, 0).unwrap(),
        }
    }

    fn export(&self) -> QrMessage {
        QrMessage::CosmosFvkExport(CosmosFvkExport {
            account_index: 0,
            label: Some("Hub".into()),
            public_key: FixedBytes(self.public_key),
            addresses: vec![],
        })
    }

    /// Scan a sign request and answer with the signature QR.
    fn sign(&self, request_hex: &str) -> String {
        let request = decode_sign_request(&hex::decode(request_hex).unwrap()).unwrap();
        let signature = Secp256k1::signing_only()
            .sign_ecdsa(&SecpMessage::from_digest(request.digest.0), &self.secret)
            .serialize_compact();
        hex::encode(
            SignatureList {
                digest: request.digest,
                signatures: vec![FixedBytes(signature)],
            }
            .encode_qr()
            .unwrap(),
        )
    }
}

fn registry(rpc: Arc<LedgerRpc>) -> AdapterRegistry {
    let (_, light_clients) = light_clients();
    let factory = DefaultAdapterFactory::new(
        CoreConfig::default(),
        light_clients,
        Arc::new(MetadataCache::new()),
    )
    .with_cosmos_rpc(NetworkId::CosmosHub, rpc);
    AdapterRegistry::new(Arc::new(factory))
}

#[tokio::test]
async fn test_send_through_registry_and_session() {
    init_logging();
    let rpc = Arc::new(LedgerRpc {
        balance: 10_000_000,
        broadcasts: Mutex::new(Vec::new()),
    });
    let device = Device::new();
    let wallet = WalletRecord::from_export(&device.export()).unwrap();
    let registry = registry(rpc.clone());

    let adapter = registry.get(NetworkId::CosmosHub).await.unwrap();
    let balance = adapter.get_balance(&wallet).await.unwrap();
    assert_eq!(adapter.format_amount(balance.available), "10");

    let mut pending = adapter
        .build_send_transaction(
            &wallet,
            SendParams {
                to: keys::address::cosmos_bech32("cosmos", &[0x03; 33]).unwrap(),
                amount: adapter.parse_amount("2.5").unwrap(),
                memo: None,
                fee: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(pending.status, TxStatus::AwaitingSignature);

    let (session, handle) = SignatureSession::new();
    let scanned = device.sign(&pending.sign_request_hex);
    let scanner = tokio::spawn({
        let handle = handle.clone();
        let scanned = scanned.clone();
        async move {
            // a stray export scan is skipped
            handle.submit_scan("530501").await;
            handle.submit_scan(scanned).await;
        }
    });
    let signature_hex = session.wait(&mut pending, CancelPolicy::Resume).await.unwrap();
    scanner.await.unwrap();
    assert_eq!(signature_hex, scanned);
    assert_eq!(pending.status, TxStatus::Signed);

    let tx_hash = adapter
        .complete_send_transaction(&mut pending, &signature_hex)
        .await
        .unwrap();

    assert_eq!(tx_hash, "4F1A");
    assert_eq!(pending.status, TxStatus::Confirmed);
    assert_eq!(pending.tx_hash.as_deref(), Some("4F1A"));
    let broadcasts = rpc.broadcasts.lock().unwrap();
    let tx = TxRaw::decode(broadcasts[0].as_slice()).unwrap();
    assert_eq!(tx.signatures.len(), 1);
}

#[tokio::test]
async fn test_cancelled_exchange_can_resume() {
    init_logging();
    let rpc = Arc::new(LedgerRpc {
        balance: 10_000_000,
        broadcasts: Mutex::new(Vec::new()),
    });
    let device = Device::new();
    let wallet = WalletRecord::from_export(&device.export()).unwrap();
    let registry = registry(rpc.clone());
    let adapter = registry.get(NetworkId::CosmosHub).await.unwrap();

    let mut pending = adapter
        .build_send_transaction(
            &wallet,
            SendParams {
                to: keys::address::cosmos_bech32("cosmos", &[0x03; 33]).unwrap(),
                amount: 1_000,
                memo: Some("rent".into()),
                fee: Some(2_500),
            },
        )
        .await
        .unwrap();

    let (session, handle) = SignatureSession::new();
    handle.cancel();
    let err = session.wait(&mut pending, CancelPolicy::Resume).await.unwrap_err();
    assert_eq!(err, airgap_core::TransactionError::Cancelled);
    assert_eq!(pending.status, TxStatus::AwaitingSignature);

    let signature = device.sign(&pending.sign_request_hex);
    let tx_hash = adapter
        .complete_send_transaction(&mut pending, &signature)
        .await
        .unwrap();
    assert_eq!(tx_hash, "4F1A");
    assert!(rpc.broadcasts.lock().unwrap().len() == 1);
}

#[tokio::test]
async fn test_unconfigured_backend_is_reported() {
    init_logging();
    let (_, light_clients) = light_clients();
    let registry = AdapterRegistry::new(Arc::new(DefaultAdapterFactory::new(
        CoreConfig::default(),
        light_clients,
        Arc::new(MetadataCache::new()),
    )));

    let err = registry.get(NetworkId::Penumbra).await.err().unwrap();
    assert!(matches!(err, AdapterError::BackendMissing(_)));
    assert!(registry.loaded(NetworkId::Penumbra).await.is_none());
}
