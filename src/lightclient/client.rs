/// Per-chain light client connection
///
/// `Disconnected -> Connecting -> Syncing -> Ready`, with `Error` reachable
/// from `Connecting` and `Syncing`. A new connection may start from
/// `Disconnected` or `Error`. Connect and disconnect are serialized through
/// one async mutex, so concurrent connects add the chain exactly once.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::{BlockSubscription, ChainHandle, ConnectionState, ConnectionStatus, LightClientBackend};
use crate::error::LightClientError;

struct Connection {
    handle: ChainHandle,
    subscription_id: u64,
    blocks: JoinHandle<()>,
}

pub struct LightClient {
    chain_id: String,
    backend: Arc<dyn LightClientBackend>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    connection: Mutex<Option<Connection>>,
}

/// Receives connection status changes. Dropping it unsubscribes.
pub struct StatusSubscription {
    receiver: watch::Receiver<ConnectionStatus>,
}

impl StatusSubscription {
    pub fn current(&self) -> ConnectionStatus {
        self.receiver.borrow().clone()
    }

    /// Next status change, or `None` once the client is gone.
    pub async fn changed(&mut self) -> Option<ConnectionStatus> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Wait until the client reaches `state`.
    pub async fn wait_for(&mut self, state: ConnectionState) -> Option<ConnectionStatus> {
        loop {
            let status = self.receiver.borrow_and_update().clone();
            if status.state == state {
                return Some(status);
            }
            self.receiver.changed().await.ok()?;
        }
    }
}

impl LightClient {
    pub fn new(chain_id: impl Into<String>, backend: Arc<dyn LightClientBackend>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        Self {
            chain_id: chain_id.into(),
            backend,
            status: Arc::new(status),
            connection: Mutex::new(None),
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    pub fn subscribe(&self) -> StatusSubscription {
        StatusSubscription {
            receiver: self.status.subscribe(),
        }
    }

    /// Handle of the live chain, if connected.
    pub async fn handle(&self) -> Option<ChainHandle> {
        self.connection.lock().await.as_ref().map(|c| c.handle)
    }

    /// Handle of the chain, failing unless the client is `Ready`.
    pub async fn ready_handle(&self) -> Result<ChainHandle, LightClientError> {
        let state = self.state();
        if state != ConnectionState::Ready {
            return Err(self.not_ready(state));
        }
        self.handle().await.ok_or_else(|| self.not_ready(ConnectionState::Disconnected))
    }

    fn not_ready(&self, state: ConnectionState) -> LightClientError {
        LightClientError::NotReady {
            chain: self.chain_id.clone(),
            state: state.to_string(),
        }
    }

    /// Add the chain to the backend and follow its best blocks.
    ///
    /// No-op returning the existing handle when a connection is live.
    pub async fn connect(
        &self,
        spec: &str,
        relay: Option<ChainHandle>,
    ) -> Result<ChainHandle, LightClientError> {
        let mut connection = self.connection.lock().await;

        if let Some(live) = connection.as_ref() {
            if !self.state().can_connect() {
                log::debug!("Light client for {} already {}", self.chain_id, self.state());
                return Ok(live.handle);
            }
        }
        if let Some(stale) = connection.take() {
            self.teardown(stale).await;
        }

        log::info!("Connecting light client for {}", self.chain_id);
        self.set_state(ConnectionState::Connecting, None);

        let handle = match self.backend.add_chain(spec, relay).await {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to add chain {}: {}", self.chain_id, e);
                self.set_state(ConnectionState::Error, Some(e.to_string()));
                return Err(e);
            }
        };
        self.set_state(ConnectionState::Syncing, None);

        let subscription = match self.backend.subscribe_best_blocks(handle).await {
            Ok(subscription) => subscription,
            Err(e) => {
                log::error!("Failed to follow best blocks on {}: {}", self.chain_id, e);
                if let Err(remove) = self.backend.remove_chain(handle).await {
                    log::warn!("Failed to remove chain {}: {}", self.chain_id, remove);
                }
                self.set_state(ConnectionState::Error, Some(e.to_string()));
                return Err(e);
            }
        };

        let subscription_id = subscription.id;
        let blocks = self.spawn_block_task(subscription);
        *connection = Some(Connection {
            handle,
            subscription_id,
            blocks,
        });
        Ok(handle)
    }

    /// Unsubscribe, stop following blocks and remove the chain.
    /// No-op when nothing is connected.
    pub async fn disconnect(&self) -> Result<(), LightClientError> {
        let mut connection = self.connection.lock().await;
        let Some(live) = connection.take() else {
            log::debug!("Light client for {} already disconnected", self.chain_id);
            return Ok(());
        };
        self.teardown(live).await;
        self.status.send_replace(ConnectionStatus::default());
        log::info!("Light client for {} disconnected", self.chain_id);
        Ok(())
    }

    async fn teardown(&self, live: Connection) {
        // the block task must be gone before the backend drops its stream
        live.blocks.abort();
        let _ = live.blocks.await;
        if let Err(e) = self
            .backend
            .unsubscribe(live.handle, live.subscription_id)
            .await
        {
            log::warn!("Failed to unsubscribe on {}: {}", self.chain_id, e);
        }
        if let Err(e) = self.backend.remove_chain(live.handle).await {
            log::warn!("Failed to remove chain {}: {}", self.chain_id, e);
        }
    }

    fn set_state(&self, state: ConnectionState, error: Option<String>) {
        self.status.send_modify(|status| {
            status.state = state;
            status.error = error;
            if state == ConnectionState::Connecting {
                status.best_block = None;
                status.synced_block = None;
                status.peers = 0;
            }
        });
    }

    fn spawn_block_task(&self, mut subscription: BlockSubscription) -> JoinHandle<()> {
        let status = self.status.clone();
        let chain_id = self.chain_id.clone();
        tokio::spawn(async move {
            while let Some(block) = subscription.receiver.recv().await {
                status.send_modify(|s| {
                    if s.state == ConnectionState::Syncing {
                        log::info!("Light client for {} ready at block {}", chain_id, block.number);
                        s.state = ConnectionState::Ready;
                    }
                    s.best_block = Some(block.number);
                    s.synced_block = Some(block.number);
                });
            }
            log::warn!("Best block stream for {} ended", chain_id);
            status.send_modify(|s| {
                s.state = ConnectionState::Error;
                s.error = Some("best block subscription closed".into());
            });
        })
    }

    /// Record the peer count reported by the backend's health RPC.
    pub fn set_peers(&self, peers: u32) {
        self.status.send_if_modified(|s| {
            let changed = s.peers != peers;
            s.peers = peers;
            changed
        });
    }
}

impl Drop for LightClient {
    fn drop(&mut self) {
        if let Some(live) = self.connection.get_mut().take() {
            live.blocks.abort();
        }
    }
}
