/// Lazy adapter registry
///
/// Adapters are created and initialized on first use, at most once per
/// network, and cached until `unload`. Concurrent `get` calls for the same
/// network share a single initialization.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, OnceCell};

use super::cosmos::{CosmosAdapter, CosmosRpc, RestCosmosClient};
use super::penumbra::{PenumbraAdapter, PenumbraViewService};
use super::substrate::SubstrateAdapter;
use super::zcash::{ZcashAdapter, ZcashWalletBackend};
use super::{Balance, NetworkAdapter, NetworkId};
use crate::config::CoreConfig;
use crate::error::AdapterError;
use crate::lightclient::LightClientRegistry;
use crate::metadata::{MetadataCache, MetadataDecoder};
use crate::qr::ChainFamily;
use crate::wallet::WalletRecord;

/// Creates the adapter for a network. Creation must be cheap; connections
/// are opened in `NetworkAdapter::initialize`.
pub trait AdapterFactory: Send + Sync {
    fn create(&self, network: NetworkId) -> Result<Arc<dyn NetworkAdapter>, AdapterError>;
}

/// Wires each network family to its configured backend.
pub struct DefaultAdapterFactory {
    config: CoreConfig,
    light_clients: Arc<LightClientRegistry>,
    metadata: Arc<MetadataCache>,
    decoder: Option<Arc<dyn MetadataDecoder>>,
    penumbra: Option<Arc<dyn PenumbraViewService>>,
    zcash: Option<Arc<dyn ZcashWalletBackend>>,
    cosmos: HashMap<NetworkId, Arc<dyn CosmosRpc>>,
}

impl DefaultAdapterFactory {
    pub fn new(
        config: CoreConfig,
        light_clients: Arc<LightClientRegistry>,
        metadata: Arc<MetadataCache>,
    ) -> Self {
        Self {
            config,
            light_clients,
            metadata,
            decoder: None,
            penumbra: None,
            zcash: None,
            cosmos: HashMap::new(),
        }
    }

    /// Override the SCALE metadata decoder substrate adapters use.
    pub fn with_metadata_decoder(mut self, decoder: Arc<dyn MetadataDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn with_penumbra(mut self, service: Arc<dyn PenumbraViewService>) -> Self {
        self.penumbra = Some(service);
        self
    }

    pub fn with_zcash(mut self, backend: Arc<dyn ZcashWalletBackend>) -> Self {
        self.zcash = Some(backend);
        self
    }

    /// Use a custom RPC for one cosmos network instead of the REST client.
    pub fn with_cosmos_rpc(mut self, network: NetworkId, rpc: Arc<dyn CosmosRpc>) -> Self {
        self.cosmos.insert(network, rpc);
        self
    }
}

impl AdapterFactory for DefaultAdapterFactory {
    fn create(&self, network: NetworkId) -> Result<Arc<dyn NetworkAdapter>, AdapterError> {
        match network.family() {
            ChainFamily::Penumbra => {
                let service = self
                    .penumbra
                    .clone()
                    .ok_or_else(|| AdapterError::BackendMissing(network.to_string()))?;
                Ok(Arc::new(PenumbraAdapter::new(service)))
            }
            ChainFamily::Zcash => {
                let backend = self
                    .zcash
                    .clone()
                    .ok_or_else(|| AdapterError::BackendMissing(network.to_string()))?;
                Ok(Arc::new(ZcashAdapter::new(backend, self.config.zcash_network)))
            }
            ChainFamily::Cosmos => {
                let rpc = match self.cosmos.get(&network) {
                    Some(rpc) => rpc.clone(),
                    None => {
                        let url = self.config.cosmos_rest_url(network).ok_or_else(|| {
                            AdapterError::BackendMissing(format!("{} REST endpoint", network))
                        })?;
                        Arc::new(RestCosmosClient::new(url)) as Arc<dyn CosmosRpc>
                    }
                };
                Ok(Arc::new(CosmosAdapter::new(network, rpc)?))
            }
            ChainFamily::Substrate => {
                let adapter = SubstrateAdapter::new(
                    network,
                    self.light_clients.clone(),
                    self.metadata.clone(),
                )?;
                Ok(Arc::new(match &self.decoder {
                    Some(decoder) => adapter.with_decoder(decoder.clone()),
                    None => adapter,
                }))
            }
        }
    }
}

type Slot = Arc<OnceCell<Arc<dyn NetworkAdapter>>>;

/// Per-session adapter cache, owned by the host.
pub struct AdapterRegistry {
    factory: Arc<dyn AdapterFactory>,
    slots: Mutex<HashMap<NetworkId, Slot>>,
}

impl AdapterRegistry {
    pub fn new(factory: Arc<dyn AdapterFactory>) -> Self {
        Self {
            factory,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Adapter for `network`, created and initialized on first use.
    ///
    /// A failed initialization leaves nothing cached; the next call retries.
    pub async fn get(&self, network: NetworkId) -> Result<Arc<dyn NetworkAdapter>, AdapterError> {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(network).or_default().clone()
        };

        let adapter = slot
            .get_or_try_init(|| async {
                log::info!("Loading adapter for {}", network);
                let adapter = self.factory.create(network)?;
                adapter.initialize().await?;
                log::info!("Adapter for {} initialized", network);
                Ok::<_, AdapterError>(adapter)
            })
            .await?;
        Ok(adapter.clone())
    }

    /// Loaded adapter for `network`, without creating one.
    pub async fn loaded(&self, network: NetworkId) -> Option<Arc<dyn NetworkAdapter>> {
        let slots = self.slots.lock().await;
        slots.get(&network).and_then(|slot| slot.get().cloned())
    }

    pub async fn loaded_networks(&self) -> Vec<NetworkId> {
        let slots = self.slots.lock().await;
        let mut ids: Vec<_> = slots
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Shut the adapter down and drop it so the next `get` starts fresh.
    pub async fn unload(&self, network: NetworkId) -> Result<(), AdapterError> {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.remove(&network)
        };
        match slot.and_then(|s| s.get().cloned()) {
            Some(adapter) => {
                log::info!("Unloading adapter for {}", network);
                adapter.shutdown().await
            }
            None => Ok(()),
        }
    }

    /// Shut down every loaded adapter. Failures are logged; teardown continues.
    pub async fn shutdown_all(&self) {
        let drained: Vec<(NetworkId, Slot)> = {
            let mut slots = self.slots.lock().await;
            slots.drain().collect()
        };
        let shutdowns = drained.into_iter().filter_map(|(network, slot)| {
            slot.get().cloned().map(|adapter| async move {
                if let Err(e) = adapter.shutdown().await {
                    log::error!("Failed to shut down {} adapter: {}", network, e);
                }
            })
        });
        join_all(shutdowns).await;
        log::info!("All network adapters shut down");
    }

    /// Balances for `wallet` on each network, queried concurrently.
    ///
    /// A network that fails to load or answer yields `Balance::zero` so the
    /// rest of the batch still completes.
    pub async fn fetch_balances(
        &self,
        wallet: &WalletRecord,
        networks: &[NetworkId],
    ) -> Vec<(NetworkId, Balance)> {
        let futures = networks.iter().map(|&network| async move {
            let result = match self.get(network).await {
                Ok(adapter) => adapter.get_balance(wallet).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(balance) => (network, balance),
                Err(e) => {
                    log::warn!("Balance fetch failed for {} on {}: {}", wallet.id, network, e);
                    (network, Balance::zero(network))
                }
            }
        });
        join_all(futures).await
    }
}
