//! Common test utilities for airgap-core integration tests
//!
//! Provides an in-memory light-client backend, a chain spec store with the
//! built-in substrate networks, and logging setup.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use airgap_core::error::LightClientError;
use airgap_core::lightclient::{BestBlock, BlockSubscription, ChainHandle, ChainSpecStore};
use airgap_core::metadata::{ExtraInfo, MerkleizedMetadata};
use airgap_core::{LightClientBackend, LightClientRegistry};
use async_trait::async_trait;
use frame_metadata::v15::{
    CustomMetadata, ExtrinsicMetadata, OuterEnums, PalletCallMetadata, PalletMetadata,
    RuntimeMetadataV15, SignedExtensionMetadata,
};
use frame_metadata::RuntimeMetadata;
use scale_info::meta_type;
use serde_json::{json, Value};
use tokio::sync::mpsc;

pub const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

pub const POLKADOT_SPEC: &str = r#"{"name":"Polkadot","id":"polkadot","genesis":{"raw":{}}}"#;
pub const KUSAMA_SPEC: &str = r#"{"name":"Kusama","id":"kusama","genesis":{"raw":{}}}"#;
pub const ASSET_HUB_SPEC: &str = r#"{"name":"Polkadot Asset Hub","id":"asset-hub-polkadot","relay_chain":"polkadot","para_id":1000,"genesis":{"raw":{}}}"#;

pub fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

/// In-memory light-client runtime. Every added chain produces one best
/// block right away and keeps its stream open until `close_stream`.
#[derive(Default)]
pub struct MockLightClient {
    next_handle: AtomicU64,
    /// `(spec id, relay handle)` in the order chains were added
    pub added: Mutex<Vec<(String, Option<ChainHandle>)>>,
    pub removed: Mutex<Vec<ChainHandle>>,
    pub failing: Mutex<HashSet<String>>,
    pub free_balance: Mutex<u128>,
    streams: Mutex<HashMap<u64, mpsc::Sender<BestBlock>>>,
    handles: Mutex<HashMap<String, ChainHandle>>,
}

impl MockLightClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_chain(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn set_free_balance(&self, free: u128) {
        *self.free_balance.lock().unwrap() = free;
    }

    pub fn added_ids(&self) -> Vec<String> {
        self.added.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn handle_of(&self, id: &str) -> Option<ChainHandle> {
        self.handles.lock().unwrap().get(id).copied()
    }

    /// End the best-block stream of `id`, as a crashed runtime would.
    pub fn close_stream(&self, id: &str) {
        if let Some(handle) = self.handle_of(id) {
            self.streams.lock().unwrap().remove(&handle.0);
        }
    }
}

fn spec_id(spec: &str) -> String {
    serde_json::from_str::<Value>(spec)
        .ok()
        .and_then(|v| v["id"].as_str().map(str::to_string))
        .unwrap_or_default()
}

fn account_info_hex(free: u128) -> String {
    let mut bytes = vec![0u8; 16];
    bytes.extend_from_slice(&free.to_le_bytes());
    bytes.extend_from_slice(&0u128.to_le_bytes());
    bytes.extend_from_slice(&0u128.to_le_bytes());
    format!("0x{}", hex::encode(bytes))
}

#[async_trait]
impl LightClientBackend for MockLightClient {
    async fn add_chain(
        &self,
        spec: &str,
        relay: Option<ChainHandle>,
    ) -> Result<ChainHandle, LightClientError> {
        let id = spec_id(spec);
        if self.failing.lock().unwrap().contains(&id) {
            return Err(LightClientError::ConnectionFailed(format!("{} unreachable", id)));
        }
        let handle = ChainHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.added.lock().unwrap().push((id.clone(), relay));
        self.handles.lock().unwrap().insert(id, handle);
        Ok(handle)
    }

    async fn remove_chain(&self, chain: ChainHandle) -> Result<(), LightClientError> {
        self.removed.lock().unwrap().push(chain);
        Ok(())
    }

    async fn subscribe_best_blocks(
        &self,
        chain: ChainHandle,
    ) -> Result<BlockSubscription, LightClientError> {
        let (tx, rx) = mpsc::channel(4);
        tx.send(BestBlock {
            number: 1_000,
            hash: "0xbest".into(),
        })
        .await
        .map_err(|e| LightClientError::ConnectionFailed(e.to_string()))?;
        self.streams.lock().unwrap().insert(chain.0, tx);
        Ok(BlockSubscription {
            id: chain.0,
            receiver: rx,
        })
    }

    async fn unsubscribe(&self, chain: ChainHandle, _id: u64) -> Result<(), LightClientError> {
        self.streams.lock().unwrap().remove(&chain.0);
        Ok(())
    }

    async fn request(
        &self,
        _chain: ChainHandle,
        method: &str,
        _params: Value,
    ) -> Result<Value, LightClientError> {
        match method {
            "state_getStorage" => Ok(json!(account_info_hex(*self.free_balance.lock().unwrap()))),
            "system_health" => Ok(json!({"peers": 4, "isSyncing": false})),
            other => Err(LightClientError::Rpc {
                method: other.to_string(),
                reason: "not supported by mock".into(),
            }),
        }
    }
}

pub fn spec_store() -> Arc<ChainSpecStore> {
    Arc::new(
        ChainSpecStore::new(None)
            .with_builtin("polkadot", POLKADOT_SPEC)
            .and_then(|s| s.with_builtin("kusama", KUSAMA_SPEC))
            .and_then(|s| s.with_builtin("asset-hub-polkadot", ASSET_HUB_SPEC))
            .unwrap(),
    )
}

pub fn light_clients() -> (Arc<MockLightClient>, Arc<LightClientRegistry>) {
    let backend = MockLightClient::new();
    let registry = Arc::new(LightClientRegistry::new(backend.clone(), spec_store()));
    (backend, registry)
}

#[derive(scale_info::TypeInfo)]
#[allow(non_camel_case_types)]
enum TinyCall {
    #[codec(index = 3)]
    transfer_keep_alive {
        dest: [u8; 32],
        #[codec(compact)]
        value: u128,
    },
}

#[derive(scale_info::TypeInfo)]
struct CheckMetadataHash {
    enabled: bool,
}

/// V15 runtime with one transfer call at `(5, 3)` and `CheckMetadataHash`
/// as its only signed extension.
pub fn tiny_metadata(spec_version: u32) -> MerkleizedMetadata {
    let extrinsic = ExtrinsicMetadata {
        version: 4,
        address_ty: meta_type::<[u8; 32]>(),
        call_ty: meta_type::<TinyCall>(),
        signature_ty: meta_type::<[u8; 64]>(),
        extra_ty: meta_type::<CheckMetadataHash>(),
        signed_extensions: vec![SignedExtensionMetadata {
            identifier: "CheckMetadataHash",
            ty: meta_type::<CheckMetadataHash>(),
            additional_signed: meta_type::<Option<[u8; 32]>>(),
        }],
    };
    let pallet = PalletMetadata {
        name: "Balances",
        storage: None,
        calls: Some(PalletCallMetadata {
            ty: meta_type::<TinyCall>(),
        }),
        event: None,
        constants: vec![],
        error: None,
        index: 5,
        docs: vec![],
    };
    let runtime = RuntimeMetadataV15::new(
        vec![pallet],
        extrinsic,
        meta_type::<()>(),
        vec![],
        OuterEnums {
            call_enum_ty: meta_type::<TinyCall>(),
            event_enum_ty: meta_type::<()>(),
            error_enum_ty: meta_type::<()>(),
        },
        CustomMetadata {
            map: BTreeMap::new(),
        },
    );
    MerkleizedMetadata::build(
        RuntimeMetadata::V15(runtime),
        ExtraInfo {
            spec_version,
            spec_name: "polkadot".into(),
            base58_prefix: 0,
            decimals: 10,
            token_symbol: "DOT".into(),
        },
    )
    .unwrap()
}
