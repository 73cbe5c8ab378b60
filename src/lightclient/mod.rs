//! Substrate light client
//!
//! The embedded trustless client is a black box behind
//! [`LightClientBackend`]. This module owns the per-chain connection state
//! machine ([`LightClient`]), chain-spec resolution ([`ChainSpecStore`]) and
//! the session registry that composes parachains with their relay chain
//! ([`LightClientRegistry`]).

pub mod client;
pub mod registry;
pub mod spec;
pub mod storage;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::LightClientError;

pub use client::{LightClient, StatusSubscription};
pub use registry::LightClientRegistry;
pub use spec::{validate_chain_spec, ChainSpecInfo, ChainSpecStore, HttpSpecFetcher, SpecFetcher};
pub use storage::{system_account_key, AccountInfo, RuntimeVersion};

/// Backend-assigned handle of an added chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainHandle(pub u64);

/// Best-block notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestBlock {
    pub number: u64,
    pub hash: String,
}

/// Live best-block stream. The stream ends when the backend drops the sender.
pub struct BlockSubscription {
    pub id: u64,
    pub receiver: mpsc::Receiver<BestBlock>,
}

/// Embedded light-client runtime.
#[async_trait]
pub trait LightClientBackend: Send + Sync {
    /// Add a chain from its JSON spec. Parachains pass their relay's handle.
    async fn add_chain(
        &self,
        spec: &str,
        relay: Option<ChainHandle>,
    ) -> Result<ChainHandle, LightClientError>;

    async fn remove_chain(&self, chain: ChainHandle) -> Result<(), LightClientError>;

    async fn subscribe_best_blocks(
        &self,
        chain: ChainHandle,
    ) -> Result<BlockSubscription, LightClientError>;

    async fn unsubscribe(&self, chain: ChainHandle, subscription_id: u64)
        -> Result<(), LightClientError>;

    /// JSON-RPC request against the chain.
    async fn request(
        &self,
        chain: ChainHandle,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, LightClientError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Syncing,
    Ready,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Syncing => "syncing",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }

    /// States from which `connect` starts a new connection.
    pub fn can_connect(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub best_block: Option<u64>,
    pub synced_block: Option<u64>,
    pub peers: u32,
    pub error: Option<String>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            best_block: None,
            synced_block: None,
            peers: 0,
            error: None,
        }
    }
}
