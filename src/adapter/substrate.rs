//! Substrate adapter over the embedded light client
//!
//! Reads go through the session's [`LightClientRegistry`]. Sends build a
//! `Balances.transfer_keep_alive` call, encode the signed extensions the
//! runtime declares and attach a merkleized metadata proof so the device can
//! decode the call without holding the full metadata.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    accept_signatures, record_broadcast, require_family, send_summary, viewing_for, Balance,
    NetworkAdapter, NetworkId, SendParams, SyncProgress, TransactionSummary,
};
use crate::codec::{self, encode_compact_len, encode_compact_u128};
use crate::error::{AdapterError, LightClientError, MetadataError, QrError, TransactionError};
use crate::hashing::blake2b_256;
use crate::keys::address::{ss58_decode, ss58_encode};
use crate::lightclient::{ConnectionState, LightClientRegistry, RuntimeVersion};
use crate::metadata::{
    ExtraInfo, MerkleizedMetadata, MetadataCache, MetadataDecoder, ScaleMetadataDecoder,
};
use crate::qr::substrate::{SubstrateCrypto, SubstrateSignRequest};
use crate::qr::{ChainFamily, FixedBytes, QrMessage, SignRequest};
use crate::wallet::{PendingTransaction, ViewingMaterial, WalletRecord};

pub const TRANSFER_KEEP_ALIVE: u8 = 3;
/// Payloads longer than this are signed by hash.
pub const MAX_UNHASHED_PAYLOAD: usize = 256;
const EXTRINSIC_VERSION_SIGNED: u8 = 0x84;
const MULTI_ADDRESS_ID: u8 = 0x00;
const IMMORTAL_ERA: u8 = 0x00;
const METADATA_HASH_ENABLED: u8 = 0x01;

/// Index of the balances pallet in each runtime.
pub fn balances_pallet_index(network: NetworkId) -> Option<u8> {
    match network {
        NetworkId::Polkadot => Some(5),
        NetworkId::Kusama => Some(4),
        NetworkId::AssetHubPolkadot => Some(10),
        _ => None,
    }
}

/// `Balances.transfer_keep_alive(MultiAddress::Id(dest), Compact(amount))`.
pub fn transfer_call(pallet_index: u8, dest: &[u8; 32], amount: u128) -> Vec<u8> {
    let mut call = vec![pallet_index, TRANSFER_KEEP_ALIVE, MULTI_ADDRESS_ID];
    call.extend_from_slice(dest);
    encode_compact_u128(amount, &mut call);
    call
}

/// Values the signed extensions draw from.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionParams {
    pub spec_version: u32,
    pub transaction_version: u32,
    pub genesis_hash: [u8; 32],
    pub nonce: u32,
    pub tip: u128,
    pub metadata_digest: [u8; 32],
}

/// Encode the runtime's signed extensions in declaration order.
///
/// Returns `(included in extrinsic, included in signed data)`. The era is
/// always immortal, so the checkpoint block is the genesis.
pub fn encode_extensions(
    signed_extensions: &[String],
    params: &ExtensionParams,
) -> Result<(Vec<u8>, Vec<u8>), MetadataError> {
    if !signed_extensions.iter().any(|e| e == "CheckMetadataHash") {
        return Err(MetadataError::Decode(
            "runtime does not support CheckMetadataHash".into(),
        ));
    }
    let mut extra = Vec::new();
    let mut signed = Vec::new();
    for identifier in signed_extensions {
        match identifier.as_str() {
            "CheckNonZeroSender" | "CheckWeight" | "CheckNonKeylessSender"
            | "PrevalidateAttests" | "StorageWeightReclaim" => {}
            "CheckSpecVersion" => signed.extend_from_slice(&params.spec_version.to_le_bytes()),
            "CheckTxVersion" => {
                signed.extend_from_slice(&params.transaction_version.to_le_bytes())
            }
            "CheckGenesis" => signed.extend_from_slice(&params.genesis_hash),
            "CheckMortality" | "CheckEra" => {
                extra.push(IMMORTAL_ERA);
                signed.extend_from_slice(&params.genesis_hash);
            }
            "CheckNonce" => encode_compact_u128(params.nonce as u128, &mut extra),
            "ChargeTransactionPayment" => encode_compact_u128(params.tip, &mut extra),
            "ChargeAssetTxPayment" => {
                encode_compact_u128(params.tip, &mut extra);
                // fee asset: None (pay in the native token)
                extra.push(0x00);
            }
            "CheckMetadataHash" => {
                extra.push(METADATA_HASH_ENABLED);
                signed.push(0x01);
                signed.extend_from_slice(&params.metadata_digest);
            }
            other => {
                return Err(MetadataError::Decode(format!(
                    "unsupported signed extension {}",
                    other
                )))
            }
        }
    }
    Ok((extra, signed))
}

/// What the device signs for a payload: the payload itself, or its hash
/// when longer than [`MAX_UNHASHED_PAYLOAD`].
pub fn signing_payload(payload: &[u8]) -> Vec<u8> {
    if payload.len() > MAX_UNHASHED_PAYLOAD {
        blake2b_256(payload).to_vec()
    } else {
        payload.to_vec()
    }
}

/// Length-prefixed v4 signed extrinsic.
pub fn signed_extrinsic(
    signer: &[u8; 32],
    crypto: SubstrateCrypto,
    signature: &[u8; 64],
    extra: &[u8],
    call: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(1 + 1 + 32 + 1 + 64 + extra.len() + call.len());
    body.push(EXTRINSIC_VERSION_SIGNED);
    body.push(MULTI_ADDRESS_ID);
    body.extend_from_slice(signer);
    body.push(crypto.multi_signature_index());
    body.extend_from_slice(signature);
    body.extend_from_slice(extra);
    body.extend_from_slice(call);

    let mut out = Vec::with_capacity(body.len() + 4);
    encode_compact_len(body.len(), &mut out);
    out.extend_from_slice(&body);
    out
}

/// Data kept on the pending transaction for assembling the extrinsic.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BuildContext {
    #[serde(with = "crate::qr::sign_request::hex_vec")]
    call: Vec<u8>,
    #[serde(with = "crate::qr::sign_request::hex_vec")]
    extra: Vec<u8>,
    signer: FixedBytes<32>,
}

pub struct SubstrateAdapter {
    network: NetworkId,
    light_clients: Arc<LightClientRegistry>,
    metadata: Arc<MetadataCache>,
    decoder: Arc<dyn MetadataDecoder>,
}

impl SubstrateAdapter {
    pub fn new(
        network: NetworkId,
        light_clients: Arc<LightClientRegistry>,
        metadata: Arc<MetadataCache>,
    ) -> Result<Self, AdapterError> {
        require_family(network, ChainFamily::Substrate)?;
        Ok(Self {
            network,
            light_clients,
            metadata,
            decoder: Arc::new(ScaleMetadataDecoder),
        })
    }

    /// Replace the SCALE decoder used for raw runtime metadata.
    pub fn with_decoder(mut self, decoder: Arc<dyn MetadataDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    fn chain_id(&self) -> &'static str {
        self.network.as_str()
    }

    fn ss58_prefix(&self) -> u16 {
        self.network.ss58_prefix().unwrap_or(42)
    }

    fn ensure_ready(&self) -> Result<(), AdapterError> {
        let state = self.light_clients.status(self.chain_id()).state;
        if state != ConnectionState::Ready {
            return Err(AdapterError::NotReady(format!(
                "{} (light client {})",
                self.network, state
            )));
        }
        Ok(())
    }

    /// Merkleized metadata for the runtime's current spec version, built
    /// and cached on first use.
    async fn merkleized(
        &self,
        version: &RuntimeVersion,
    ) -> Result<Arc<MerkleizedMetadata>, AdapterError> {
        let decoder = self.decoder.clone();
        let chain = self.chain_id();
        let light_clients = self.light_clients.clone();
        let extra = ExtraInfo {
            spec_version: version.spec_version,
            spec_name: version.spec_name.clone(),
            base58_prefix: self.ss58_prefix(),
            decimals: self.network.decimals(),
            token_symbol: self.network.denom().to_string(),
        };
        let metadata = self
            .metadata
            .get_or_build(chain, version.spec_version, move || async move {
                let raw = light_clients.metadata(chain).await?;
                let runtime = decoder.decode(&raw)?;
                Ok::<_, AdapterError>(MerkleizedMetadata::build(runtime, extra)?)
            })
            .await?;
        metadata.ensure_current(version.spec_version)?;
        Ok(metadata)
    }
}

fn public_key_of(viewing: &ViewingMaterial) -> Result<[u8; 32], AdapterError> {
    let bytes = codec::hex_to_bytes(&viewing.viewing_key).map_err(QrError::from)?;
    bytes.try_into().map_err(|v: Vec<u8>| {
        AdapterError::Key(crate::error::KeyError::InvalidPublicKey(format!(
            "expected 32 bytes, got {}",
            v.len()
        )))
    })
}

fn verify_ed25519(
    public_key: &[u8; 32],
    message: &[u8],
    signature: &[u8; 64],
) -> Result<(), TransactionError> {
    let key = ed25519_dalek::VerifyingKey::from_bytes(public_key)
        .map_err(|e| TransactionError::SignatureMismatch(e.to_string()))?;
    key.verify_strict(message, &ed25519_dalek::Signature::from_bytes(signature))
        .map_err(|e| TransactionError::SignatureMismatch(e.to_string()))
}

#[async_trait]
impl NetworkAdapter for SubstrateAdapter {
    fn network(&self) -> NetworkId {
        self.network
    }

    /// Starts the light client (and its relay). Readiness follows the
    /// client reaching `Ready`.
    async fn initialize(&self) -> Result<(), AdapterError> {
        self.light_clients.connect(self.chain_id()).await?;
        log::info!("{} light client connecting", self.network);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), AdapterError> {
        let parachains_live = NetworkId::chains_under(self.network)
            .into_iter()
            .filter(|n| *n != self.network)
            .any(|n| self.light_clients.status(n.as_str()).state != ConnectionState::Disconnected);
        if parachains_live {
            log::info!("{} kept connected for its parachains", self.network);
        } else {
            self.light_clients.disconnect(self.chain_id()).await?;
        }
        self.metadata.evict_chain(self.chain_id());
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.light_clients.status(self.chain_id()).state == ConnectionState::Ready
    }

    async fn get_balance(&self, wallet: &WalletRecord) -> Result<Balance, AdapterError> {
        self.ensure_ready()?;
        let public_key = public_key_of(viewing_for(wallet, self.network)?)?;
        let info = self
            .light_clients
            .account_info(self.chain_id(), &public_key)
            .await?;
        let total = info.total();
        let available = info.transferable();
        Ok(Balance {
            total,
            available,
            pending: 0,
            denom: self.network.denom().to_string(),
            decimals: self.network.decimals(),
        })
    }

    /// Light clients index no history.
    async fn get_transactions(
        &self,
        wallet: &WalletRecord,
        _limit: usize,
        _offset: usize,
    ) -> Result<Vec<TransactionSummary>, AdapterError> {
        self.ensure_ready()?;
        viewing_for(wallet, self.network)?;
        log::debug!("{}: no transaction history over the light client", self.network);
        Ok(Vec::new())
    }

    async fn build_send_transaction(
        &self,
        wallet: &WalletRecord,
        params: SendParams,
    ) -> Result<PendingTransaction, AdapterError> {
        self.ensure_ready()?;
        if params.amount == 0 {
            return Err(AdapterError::InvalidAmount("amount must be positive".into()));
        }
        let (dest_prefix, dest) =
            ss58_decode(&params.to).map_err(|_| AdapterError::InvalidAddress(params.to.clone()))?;
        if dest_prefix != self.ss58_prefix() {
            return Err(AdapterError::InvalidAddress(format!(
                "{} uses prefix {}, {} expects {}",
                params.to,
                dest_prefix,
                self.network,
                self.ss58_prefix()
            )));
        }
        let pallet = balances_pallet_index(self.network)
            .ok_or_else(|| AdapterError::Backend(format!("no balances pallet for {}", self.network)))?;
        let signer = public_key_of(viewing_for(wallet, self.network)?)?;
        let sender = ss58_encode(&signer, self.ss58_prefix())?;
        let chain = self.chain_id();

        let account = self.light_clients.account_info(chain, &signer).await?;
        if account.transferable() < params.amount {
            return Err(AdapterError::InsufficientFunds(format!(
                "{} transferable, {} requested",
                self.format_amount(account.transferable()),
                self.format_amount(params.amount)
            )));
        }

        let version = self.light_clients.runtime_version(chain).await?;
        let genesis_hash = self.light_clients.genesis_hash(chain).await?;
        let nonce = self.light_clients.nonce(chain, &sender).await?;
        let metadata = self.merkleized(&version).await?;

        let call = transfer_call(pallet, &dest, params.amount);
        let (extra, additional) = encode_extensions(
            metadata.signed_extensions(),
            &ExtensionParams {
                spec_version: version.spec_version,
                transaction_version: version.transaction_version,
                genesis_hash,
                nonce,
                tip: params.fee.unwrap_or(0),
                metadata_digest: metadata.digest(),
            },
        )?;
        let proof = metadata.proof_for(&call, &extra, &additional)?;
        proof.verify(&metadata.digest())?;

        let mut payload = Vec::with_capacity(call.len() + extra.len() + additional.len());
        payload.extend_from_slice(&call);
        payload.extend_from_slice(&extra);
        payload.extend_from_slice(&additional);

        let summary = send_summary(self.network, &params);
        let request = SubstrateSignRequest {
            crypto: SubstrateCrypto::Ed25519,
            request: SignRequest {
                account_index: wallet.account_index,
                digest: FixedBytes(blake2b_256(&payload)),
                plan: payload,
                summary: summary.clone(),
            },
            metadata_proof: proof.encode()?,
        };
        let encoded = codec::bytes_to_hex(&request.encode_qr()?);

        let mut pending = PendingTransaction::new(self.network, &wallet.id, summary);
        pending.build_context = serde_json::to_value(BuildContext {
            call,
            extra,
            signer: FixedBytes(signer),
        })
        .map_err(|e| AdapterError::Backend(e.to_string()))?;
        pending.await_signature(encoded)?;
        log::info!(
            "{} transfer {} built: nonce {}, spec {}, {} proof types",
            self.network,
            pending.id,
            nonce,
            version.spec_version,
            proof.leaf_count
        );
        Ok(pending)
    }

    async fn complete_send_transaction(
        &self,
        pending: &mut PendingTransaction,
        signature_hex: &str,
    ) -> Result<String, AdapterError> {
        self.ensure_ready()?;
        let context: BuildContext = serde_json::from_value(pending.build_context.clone())
            .map_err(|e| AdapterError::Backend(format!("missing build context: {}", e)))?;
        let raw = codec::hex_to_bytes(&pending.sign_request_hex).map_err(QrError::from)?;
        let request = SubstrateSignRequest::decode_qr(&raw)?;

        let response = match accept_signatures(pending, signature_hex)? {
            QrMessage::SubstrateSignatures(response) => response,
            other => {
                return Err(TransactionError::SignatureMismatch(format!(
                    "expected substrate signatures, got {:?}",
                    other.kind()
                ))
                .into())
            }
        };
        let checked = match response.signatures.first() {
            Some(_) if response.crypto != request.crypto => Err(TransactionError::SignatureMismatch(
                format!("signed with {:?}, requested {:?}", response.crypto, request.crypto),
            )),
            Some(sig) => verify_ed25519(
                context.signer.as_bytes(),
                &signing_payload(&request.request.plan),
                &sig.0,
            )
            .map(|_| sig.0),
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

        let extrinsic = signed_extrinsic(
            context.signer.as_bytes(),
            request.crypto,
            &signature,
            &context.extra,
            &context.call,
        );
        pending.mark_broadcasting()?;
        let result = self
            .light_clients
            .submit_extrinsic(self.chain_id(), &extrinsic)
            .await
            .map_err(AdapterError::from);
        record_broadcast(pending, result)
    }

    fn validate_address(&self, address: &str) -> bool {
        matches!(ss58_decode(address), Ok((prefix, _)) if prefix == self.ss58_prefix())
    }

    /// Reports synced against best block until the client is `Ready`.
    async fn sync(
        &self,
        _wallet: &WalletRecord,
        on_progress: &(dyn Fn(SyncProgress) + Send + Sync),
    ) -> Result<(), AdapterError> {
        let mut subscription = self.light_clients.subscribe(self.chain_id());
        let mut status = subscription.current();
        loop {
            on_progress(SyncProgress {
                current_height: status.synced_block.unwrap_or(0),
                target_height: status.best_block.unwrap_or(0),
            });
            match status.state {
                ConnectionState::Ready => return Ok(()),
                ConnectionState::Error => {
                    return Err(LightClientError::ConnectionFailed(
                        status.error.unwrap_or_else(|| self.network.to_string()),
                    )
                    .into())
                }
                ConnectionState::Disconnected => {
                    return Err(AdapterError::NotReady(self.network.to_string()))
                }
                ConnectionState::Connecting | ConnectionState::Syncing => {}
            }
            status = subscription
                .changed()
                .await
                .ok_or_else(|| AdapterError::NotReady(self.network.to_string()))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::slip10::Slip10Key;
    use crate::keys::{path, seed_from_phrase};
    use crate::lightclient::{
        BestBlock, BlockSubscription, ChainHandle, ChainSpecStore, LightClientBackend,
    };
    use crate::metadata::tests::{sample_metadata, sample_raw};
    use crate::metadata::MetadataProof;
    use frame_metadata::RuntimeMetadata;
    use crate::qr::substrate::{SubstrateFvkExport, SubstrateSignatures};
    use crate::wallet::TxStatus;
    use ed25519_dalek::Signer;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const POLKADOT_SPEC: &str = r#"{"name":"Polkadot","id":"polkadot","genesis":{"raw":{}}}"#;

    #[derive(Default)]
    struct MockChain {
        next: AtomicU64,
        block_senders: Mutex<Vec<mpsc::Sender<BestBlock>>>,
        submitted: Mutex<Vec<String>>,
    }

    fn account_hex(free: u128) -> String {
        let mut bytes = vec![0u8; 16];
        bytes.extend_from_slice(&free.to_le_bytes());
        bytes.extend_from_slice(&0u128.to_le_bytes());
        bytes.extend_from_slice(&0u128.to_le_bytes());
        format!("0x{}", hex::encode(bytes))
    }

    #[async_trait]
    impl LightClientBackend for MockChain {
        async fn add_chain(
            &self,
            _spec: &str,
            _relay: Option<ChainHandle>,
        ) -> Result<ChainHandle, LightClientError> {
            Ok(ChainHandle(self.next.fetch_add(1, Ordering::SeqCst)))
        }

        async fn remove_chain(&self, _chain: ChainHandle) -> Result<(), LightClientError> {
            Ok(())
        }

        async fn subscribe_best_blocks(
            &self,
            _chain: ChainHandle,
        ) -> Result<BlockSubscription, LightClientError> {
            let (tx, rx) = mpsc::channel(4);
            tx.send(BestBlock {
                number: 100,
                hash: "0x01".into(),
            })
            .await
            .unwrap();
            self.block_senders.lock().unwrap().push(tx);
            Ok(BlockSubscription { id: 1, receiver: rx })
        }

        async fn unsubscribe(&self, _chain: ChainHandle, _id: u64) -> Result<(), LightClientError> {
            Ok(())
        }

        async fn request(
            &self,
            _chain: ChainHandle,
            method: &str,
            params: Value,
        ) -> Result<Value, LightClientError> {
            Ok(match method {
                "state_getStorage" => json!(account_hex(50_000_000_000)),
                "system_accountNextIndex" => json!(5),
                "state_getRuntimeVersion" => json!({
                    "specName": "polkadot",
                    "specVersion": 1_002_000,
                    "transactionVersion": 26
                }),
                "chain_getBlockHash" => json!(format!("0x{}", "91".repeat(32))),
                "state_getMetadata" => json!(format!("0x{}", hex::encode(sample_raw()))),
                "author_submitExtrinsic" => {
                    self.submitted
                        .lock()
                        .unwrap()
                        .push(params[0].as_str().unwrap_or_default().to_string());
                    json!("0xfeed")
                }
                other => {
                    return Err(LightClientError::Rpc {
                        method: other.into(),
                        reason: "unsupported".into(),
                    })
                }
            })
        }
    }

    struct RejectingDecoder;

    impl MetadataDecoder for RejectingDecoder {
        fn decode(&self, _raw: &[u8]) -> Result<RuntimeMetadata, MetadataError> {
            Err(MetadataError::UnsupportedVersion(13))
        }
    }

    fn signer_key() -> Slip10Key {
        let seed = seed_from_phrase(ABANDON, "").unwrap();
        Slip10Key::master(seed.as_bytes())
            .unwrap()
            .derive_path(&path::slip10_substrate(path::COIN_POLKADOT, 0))
            .unwrap()
    }

    fn wallet(public_key: [u8; 32]) -> WalletRecord {
        WalletRecord::from_export(&QrMessage::SubstrateFvkExport(SubstrateFvkExport {
            crypto: SubstrateCrypto::Ed25519,
            account_index: 0,
            label: None,
            public_key: FixedBytes(public_key),
            ss58_prefix: 0,
            genesis_hash: FixedBytes([0x91; 32]),
        }))
        .unwrap()
    }

    async fn ready_adapter() -> (Arc<MockChain>, Arc<MetadataCache>, SubstrateAdapter) {
        ready_adapter_with(|adapter| adapter).await
    }

    async fn ready_adapter_with(
        configure: impl FnOnce(SubstrateAdapter) -> SubstrateAdapter,
    ) -> (Arc<MockChain>, Arc<MetadataCache>, SubstrateAdapter) {
        let chain = Arc::new(MockChain::default());
        let specs = ChainSpecStore::new(None)
            .with_builtin("polkadot", POLKADOT_SPEC)
            .unwrap();
        let registry = Arc::new(LightClientRegistry::new(chain.clone(), Arc::new(specs)));
        let cache = Arc::new(MetadataCache::new());
        let adapter = configure(
            SubstrateAdapter::new(NetworkId::Polkadot, registry.clone(), cache.clone()).unwrap(),
        );
        adapter.initialize().await.unwrap();
        registry
            .subscribe("polkadot")
            .wait_for(ConnectionState::Ready)
            .await
            .unwrap();
        (chain, cache, adapter)
    }

    #[test]
    fn test_transfer_call_layout() {
        let call = transfer_call(5, &[0xaa; 32], 1);
        assert_eq!(&call[..3], &[5, 3, 0]);
        assert_eq!(&call[3..35], &[0xaa; 32]);
        assert_eq!(&call[35..], &[0x04]);
    }

    #[test]
    fn test_signing_payload_hashes_long_payloads() {
        assert_eq!(signing_payload(&[1u8; 256]), vec![1u8; 256]);
        assert_eq!(signing_payload(&[1u8; 257]), blake2b_256(&[1u8; 257]).to_vec());
    }

    #[test]
    fn test_extensions_need_metadata_hash() {
        let mut extensions = crate::metadata::signed_extension_ids(&sample_metadata()).unwrap();
        extensions.retain(|e| e != "CheckMetadataHash");
        let params = ExtensionParams {
            spec_version: 1,
            transaction_version: 1,
            genesis_hash: [0; 32],
            nonce: 0,
            tip: 0,
            metadata_digest: [0; 32],
        };
        assert!(encode_extensions(&extensions, &params).is_err());
    }

    #[test]
    fn test_extensions_follow_declaration_order() {
        let extensions = crate::metadata::signed_extension_ids(&sample_metadata()).unwrap();
        let params = ExtensionParams {
            spec_version: 7,
            transaction_version: 2,
            genesis_hash: [9; 32],
            nonce: 1,
            tip: 0,
            metadata_digest: [4; 32],
        };
        let (extra, signed) = encode_extensions(&extensions, &params).unwrap();
        assert_eq!(extra, vec![0x04, 0x00, METADATA_HASH_ENABLED]);
        assert_eq!(&signed[..4], &7u32.to_le_bytes());
        assert_eq!(&signed[4..8], &2u32.to_le_bytes());
        assert_eq!(&signed[8..40], &[9; 32]);
        assert_eq!(signed[40], 0x01);
        assert_eq!(&signed[41..], &[4; 32]);
    }

    #[test]
    fn test_signed_extrinsic_prefix() {
        let xt = signed_extrinsic(&[1; 32], SubstrateCrypto::Ed25519, &[2; 64], &[0x00], &[5, 3]);
        let body_len = 1 + 1 + 32 + 1 + 64 + 1 + 2;
        let (len, consumed) = codec::decode_compact_u128(&xt).unwrap();
        assert_eq!(len as usize, body_len);
        assert_eq!(xt[consumed], 0x84);
        assert_eq!(xt[consumed + 34], 0x00);
        assert_eq!(xt.len(), consumed + body_len);
    }

    #[tokio::test]
    async fn test_balance_requires_ready_client() {
        let chain = Arc::new(MockChain::default());
        let registry = Arc::new(LightClientRegistry::new(
            chain,
            Arc::new(ChainSpecStore::new(None)),
        ));
        let adapter =
            SubstrateAdapter::new(NetworkId::Kusama, registry, Arc::new(MetadataCache::new()))
                .unwrap();
        assert!(!adapter.is_ready());
        assert!(matches!(
            adapter.get_balance(&wallet([1; 32])).await,
            Err(AdapterError::NotReady(_))
        ));
    }

    #[tokio::test]
    async fn test_balance_reads_system_account() {
        let (_, _, adapter) = ready_adapter().await;
        let balance = adapter.get_balance(&wallet([1; 32])).await.unwrap();
        assert_eq!(balance.total, 50_000_000_000);
        assert_eq!(balance.denom, "DOT");
    }

    #[tokio::test]
    async fn test_send_with_metadata_proof() {
        let (chain, cache, adapter) = ready_adapter().await;
        let key = signer_key();
        let wallet = wallet(key.public_key());
        let to = ss58_encode(&[0x33; 32], 0).unwrap();

        let mut pending = adapter
            .build_send_transaction(
                &wallet,
                SendParams {
                    to,
                    amount: 10_000_000_000,
                    memo: None,
                    fee: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(cache.versions("polkadot"), vec![1_002_000]);

        let request = SubstrateSignRequest::decode_qr(&hex::decode(&pending.sign_request_hex).unwrap())
            .unwrap();
        let metadata = cache.get("polkadot", 1_002_000).unwrap();
        let proof = MetadataProof::decode(&request.metadata_proof).unwrap();
        proof.verify(&metadata.digest()).unwrap();

        // CheckMetadataHash is the last extension: Some(RFC-0078 hash).
        let reference = merkleized_metadata::generate_metadata_digest(
            &sample_metadata(),
            merkleized_metadata::ExtraInfo {
                spec_version: 1_002_000,
                spec_name: "polkadot".into(),
                base58_prefix: NetworkId::Polkadot.ss58_prefix().unwrap(),
                decimals: NetworkId::Polkadot.decimals(),
                token_symbol: NetworkId::Polkadot.denom().into(),
            },
        )
        .unwrap();
        let plan = &request.request.plan;
        assert_eq!(plan[plan.len() - 33], 0x01);
        assert_eq!(&plan[plan.len() - 32..], &reference.hash());
        assert_eq!(metadata.digest(), reference.hash());

        let signature = key
            .signing_key()
            .sign(&signing_payload(&request.request.plan))
            .to_bytes();
        let response = SubstrateSignatures {
            crypto: SubstrateCrypto::Ed25519,
            payload_hash: request.request.digest,
            signatures: vec![FixedBytes(signature)],
        };
        let hash = adapter
            .complete_send_transaction(&mut pending, &hex::encode(response.encode_qr().unwrap()))
            .await
            .unwrap();

        assert_eq!(hash, "0xfeed");
        assert_eq!(pending.status, TxStatus::Confirmed);
        let submitted = chain.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert!(submitted[0].contains(&hex::encode(key.public_key())));
    }

    #[tokio::test]
    async fn test_custom_decoder_replaces_scale_decoder() {
        let (_, cache, adapter) =
            ready_adapter_with(|adapter| adapter.with_decoder(Arc::new(RejectingDecoder))).await;
        let key = signer_key();
        let result = adapter
            .build_send_transaction(
                &wallet(key.public_key()),
                SendParams {
                    to: ss58_encode(&[0x33; 32], 0).unwrap(),
                    amount: 1,
                    memo: None,
                    fee: None,
                },
            )
            .await;
        assert!(matches!(
            result,
            Err(AdapterError::Metadata(MetadataError::UnsupportedVersion(13)))
        ));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_signer_is_rejected() {
        let (chain, _, adapter) = ready_adapter().await;
        let key = signer_key();
        let mut pending = adapter
            .build_send_transaction(
                &wallet(key.public_key()),
                SendParams {
                    to: ss58_encode(&[0x33; 32], 0).unwrap(),
                    amount: 1,
                    memo: None,
                    fee: None,
                },
            )
            .await
            .unwrap();
        let request = SubstrateSignRequest::decode_qr(&hex::decode(&pending.sign_request_hex).unwrap())
            .unwrap();
        let response = SubstrateSignatures {
            crypto: SubstrateCrypto::Ed25519,
            payload_hash: request.request.digest,
            signatures: vec![FixedBytes([7; 64])],
        };
        let result = adapter
            .complete_send_transaction(&mut pending, &hex::encode(response.encode_qr().unwrap()))
            .await;
        assert!(matches!(result, Err(AdapterError::Transaction(_))));
        assert_eq!(pending.status, TxStatus::Failed);
        assert!(chain.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_address_for_other_network() {
        let (_, _, adapter) = ready_adapter().await;
        let kusama_address = ss58_encode(&[0x33; 32], 2).unwrap();
        assert!(!adapter.validate_address(&kusama_address));
        assert!(matches!(
            adapter
                .build_send_transaction(
                    &wallet([1; 32]),
                    SendParams {
                        to: kusama_address,
                        amount: 1,
                        memo: None,
                        fee: None,
                    },
                )
                .await,
            Err(AdapterError::InvalidAddress(_))
        ));
    }
}
