/// Light client registry
///
/// One `LightClient` per chain id for the session. Parachains are connected
/// after their relay chain, with the relay's handle as trust anchor.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::json;

use super::client::{LightClient, StatusSubscription};
use super::spec::{validate_chain_spec, ChainSpecStore};
use super::storage::{system_account_key, AccountInfo, RuntimeVersion};
use super::{ChainHandle, ConnectionStatus, LightClientBackend};
use crate::codec;
use crate::error::LightClientError;

pub struct LightClientRegistry {
    backend: Arc<dyn LightClientBackend>,
    specs: Arc<ChainSpecStore>,
    clients: RwLock<HashMap<String, Arc<LightClient>>>,
}

impl LightClientRegistry {
    pub fn new(backend: Arc<dyn LightClientBackend>, specs: Arc<ChainSpecStore>) -> Self {
        Self {
            backend,
            specs,
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn specs(&self) -> &Arc<ChainSpecStore> {
        &self.specs
    }

    /// The session's client for `chain_id`, created on first use.
    pub fn client(&self, chain_id: &str) -> Arc<LightClient> {
        {
            let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(client) = clients.get(chain_id) {
                return client.clone();
            }
        }

        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        clients
            .entry(chain_id.to_string())
            .or_insert_with(|| {
                log::debug!("Creating light client for {}", chain_id);
                Arc::new(LightClient::new(chain_id, self.backend.clone()))
            })
            .clone()
    }

    fn existing(&self, chain_id: &str) -> Option<Arc<LightClient>> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(chain_id)
            .cloned()
    }

    pub fn status(&self, chain_id: &str) -> ConnectionStatus {
        self.existing(chain_id)
            .map(|c| c.status())
            .unwrap_or_default()
    }

    pub fn subscribe(&self, chain_id: &str) -> StatusSubscription {
        self.client(chain_id).subscribe()
    }

    /// Connect `chain_id`, connecting its relay chain first for parachains.
    pub async fn connect(&self, chain_id: &str) -> Result<ChainHandle, LightClientError> {
        let client = self.client(chain_id);
        if client.is_ready() {
            if let Some(handle) = client.handle().await {
                return Ok(handle);
            }
        }

        let spec = self.specs.resolve(chain_id).await?;
        let info = validate_chain_spec(&spec)?;

        let relay = match &info.relay_chain {
            Some(relay_id) => {
                log::info!("{} is a parachain of {}; connecting relay first", chain_id, relay_id);
                let handle = self.connect_relay(relay_id).await.map_err(|e| {
                    LightClientError::RelayUnavailable {
                        chain: chain_id.to_string(),
                        relay: relay_id.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Some(handle)
            }
            None => None,
        };

        client.connect(&spec, relay).await
    }

    async fn connect_relay(&self, relay_id: &str) -> Result<ChainHandle, LightClientError> {
        let spec = self.specs.resolve(relay_id).await?;
        let info = validate_chain_spec(&spec)?;
        if let Some(parent) = info.relay_chain {
            return Err(LightClientError::InvalidSpec(format!(
                "relay chain {} declares its own relay {}",
                relay_id, parent
            )));
        }
        self.client(relay_id).connect(&spec, None).await
    }

    pub async fn disconnect(&self, chain_id: &str) -> Result<(), LightClientError> {
        match self.existing(chain_id) {
            Some(client) => client.disconnect().await,
            None => Ok(()),
        }
    }

    /// Disconnect every chain, parachains before relays.
    pub async fn disconnect_all(&self) {
        let clients: Vec<Arc<LightClient>> = self
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut parachains = Vec::new();
        let mut relays = Vec::new();
        for client in clients {
            let is_para = match self.specs.resolve(client.chain_id()).await {
                Ok(spec) => validate_chain_spec(&spec)
                    .map(|info| info.is_parachain())
                    .unwrap_or(false),
                Err(_) => false,
            };
            if is_para {
                parachains.push(client);
            } else {
                relays.push(client);
            }
        }
        for client in parachains.into_iter().chain(relays) {
            if let Err(e) = client.disconnect().await {
                log::warn!("Failed to disconnect {}: {}", client.chain_id(), e);
            }
        }
    }

    async fn rpc(
        &self,
        chain_id: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, LightClientError> {
        let client = self
            .existing(chain_id)
            .ok_or_else(|| LightClientError::NotReady {
                chain: chain_id.to_string(),
                state: "disconnected".into(),
            })?;
        let handle = client.ready_handle().await?;
        log::debug!("{} -> {}", chain_id, method);
        self.backend.request(handle, method, params).await
    }

    pub async fn account_info(
        &self,
        chain_id: &str,
        account: &[u8; 32],
    ) -> Result<AccountInfo, LightClientError> {
        let key = codec::bytes_to_hex(&system_account_key(account));
        let value = self
            .rpc(chain_id, "state_getStorage", json!([format!("0x{}", key)]))
            .await?;
        AccountInfo::from_storage_value(&value)
    }

    /// Next nonce, counting transactions already in the pool.
    pub async fn nonce(&self, chain_id: &str, ss58_address: &str) -> Result<u32, LightClientError> {
        let value = self
            .rpc(chain_id, "system_accountNextIndex", json!([ss58_address]))
            .await?;
        value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| LightClientError::InvalidResponse(format!("nonce {}", value)))
    }

    pub async fn runtime_version(&self, chain_id: &str) -> Result<RuntimeVersion, LightClientError> {
        let value = self.rpc(chain_id, "state_getRuntimeVersion", json!([])).await?;
        serde_json::from_value(value)
            .map_err(|e| LightClientError::InvalidResponse(format!("runtime version: {}", e)))
    }

    /// Raw SCALE metadata.
    pub async fn metadata(&self, chain_id: &str) -> Result<Vec<u8>, LightClientError> {
        let value = self.rpc(chain_id, "state_getMetadata", json!([])).await?;
        hex_result(&value, "metadata")
    }

    pub async fn genesis_hash(&self, chain_id: &str) -> Result<[u8; 32], LightClientError> {
        let value = self.rpc(chain_id, "chain_getBlockHash", json!([0])).await?;
        hex_result(&value, "genesis hash")?
            .try_into()
            .map_err(|_| LightClientError::InvalidResponse("genesis hash is not 32 bytes".into()))
    }

    /// Submit a signed extrinsic; returns its hash.
    pub async fn submit_extrinsic(
        &self,
        chain_id: &str,
        extrinsic: &[u8],
    ) -> Result<String, LightClientError> {
        let hex = format!("0x{}", codec::bytes_to_hex(extrinsic));
        let value = self
            .rpc(chain_id, "author_submitExtrinsic", json!([hex]))
            .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LightClientError::InvalidResponse(format!("extrinsic hash {}", value)))
    }

    /// Refresh the peer count from `system_health`.
    pub async fn refresh_health(&self, chain_id: &str) -> Result<u32, LightClientError> {
        let value = self.rpc(chain_id, "system_health", json!([])).await?;
        let peers = value
            .get("peers")
            .and_then(|p| p.as_u64())
            .ok_or_else(|| LightClientError::InvalidResponse(format!("health {}", value)))?;
        let peers = u32::try_from(peers).unwrap_or(u32::MAX);
        if let Some(client) = self.existing(chain_id) {
            client.set_peers(peers);
        }
        Ok(peers)
    }
}

fn hex_result(value: &serde_json::Value, what: &str) -> Result<Vec<u8>, LightClientError> {
    let s = value
        .as_str()
        .ok_or_else(|| LightClientError::InvalidResponse(format!("{}: expected hex string", what)))?;
    codec::hex_to_bytes(s).map_err(|e| LightClientError::InvalidResponse(format!("{}: {}", what, e)))
}
