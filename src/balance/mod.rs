//! Balance cache with dormancy detection
//!
//! Reads return cached values at once; stale entries are refreshed in the
//! background. Chains that keep reporting zero go dormant and are left out
//! of passive reads until forced, included explicitly, or marked active.

pub mod cache;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::adapter::NetworkId;
use crate::error::AdapterError;
use crate::lightclient::{ConnectionState, LightClientRegistry};

pub use cache::{BalanceCache, CachedBalance};

/// Queries one chain's balance for a public key.
#[async_trait]
pub trait BalanceFetcher: Send + Sync {
    async fn fetch(&self, chain: NetworkId, public_key: &[u8; 32]) -> Result<u128, AdapterError>;
}

/// Fetches through the session's light clients, connecting on demand.
pub struct LightClientBalanceFetcher {
    registry: Arc<LightClientRegistry>,
    ready_timeout: Duration,
}

impl LightClientBalanceFetcher {
    pub fn new(registry: Arc<LightClientRegistry>, ready_timeout: Duration) -> Self {
        Self {
            registry,
            ready_timeout,
        }
    }
}

#[async_trait]
impl BalanceFetcher for LightClientBalanceFetcher {
    async fn fetch(&self, chain: NetworkId, public_key: &[u8; 32]) -> Result<u128, AdapterError> {
        let chain_id = chain.as_str();
        self.registry.connect(chain_id).await?;
        let mut status = self.registry.subscribe(chain_id);
        tokio::time::timeout(self.ready_timeout, status.wait_for(ConnectionState::Ready))
            .await
            .map_err(|_| AdapterError::NotReady(format!("{} light client still syncing", chain)))?
            .ok_or_else(|| AdapterError::NotReady(chain.to_string()))?;
        let info = self.registry.account_info(chain_id, public_key).await?;
        Ok(info.total())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceOptions {
    pub force_refresh: bool,
    pub include_dormant: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceView {
    pub chain: NetworkId,
    pub balance: u128,
    /// Missing or older than the TTL; a refresh has been scheduled.
    pub stale: bool,
    pub dormant: bool,
}

/// Views returned by [`BalanceService::get_balances`] plus the background
/// refresh they scheduled, if any. Dropping the handle does not cancel it;
/// a [`BalanceService::clear`] makes it discard its results.
pub struct BalanceReport {
    pub views: Vec<BalanceView>,
    pub refresh: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct BalanceService {
    cache: Arc<Mutex<BalanceCache>>,
    fetcher: Arc<dyn BalanceFetcher>,
    /// Bumped by `clear`; refreshes started under an older value do not
    /// write back.
    generation: Arc<AtomicU64>,
}

impl BalanceService {
    pub fn new(cache: BalanceCache, fetcher: Arc<dyn BalanceFetcher>) -> Self {
        Self {
            cache: Arc::new(Mutex::new(cache)),
            fetcher,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BalanceCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached balances for every chain under `relay`.
    ///
    /// Dormant chains are omitted unless `include_dormant` or
    /// `force_refresh` is set. Stale and missing entries (all entries when
    /// forced) are refreshed in a task spawned on the caller's runtime.
    pub async fn get_balances(
        &self,
        relay: NetworkId,
        public_key: [u8; 32],
        opts: BalanceOptions,
    ) -> BalanceReport {
        let mut views = Vec::new();
        let mut to_refresh = Vec::new();
        let generation;
        {
            let cache = self.lock();
            generation = self.generation.load(Ordering::SeqCst);
            for chain in NetworkId::chains_under(relay) {
                let dormant = cache.is_dormant(&public_key, chain);
                if dormant && !opts.include_dormant && !opts.force_refresh {
                    log::debug!("Skipping dormant chain {}", chain);
                    continue;
                }
                let fresh = cache.is_fresh(&public_key, chain);
                if opts.force_refresh || !fresh {
                    to_refresh.push(chain);
                }
                views.push(BalanceView {
                    chain,
                    balance: cache.get(&public_key, chain).map(|e| e.balance).unwrap_or(0),
                    stale: !fresh,
                    dormant,
                });
            }
        }

        let refresh = if to_refresh.is_empty() {
            None
        } else {
            let service = self.clone();
            Some(tokio::spawn(async move {
                service.refresh_at(generation, public_key, &to_refresh).await;
            }))
        };
        BalanceReport { views, refresh }
    }

    /// Fetch `chains` concurrently and update the cache. A failed chain keeps
    /// its cached value (or zero) and does not count as a zero observation.
    /// Results are not recorded if the cache is cleared meanwhile.
    pub async fn refresh_chains(
        &self,
        public_key: [u8; 32],
        chains: &[NetworkId],
    ) -> Vec<(NetworkId, u128)> {
        let generation = self.generation.load(Ordering::SeqCst);
        self.refresh_at(generation, public_key, chains).await
    }

    async fn refresh_at(
        &self,
        generation: u64,
        public_key: [u8; 32],
        chains: &[NetworkId],
    ) -> Vec<(NetworkId, u128)> {
        let fetches = chains.iter().map(|&chain| {
            let fetcher = self.fetcher.clone();
            async move { (chain, fetcher.fetch(chain, &public_key).await) }
        });
        let results = join_all(fetches).await;

        let mut cache = self.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            log::debug!("Balance cache cleared during refresh; dropping {} results", results.len());
            return results
                .into_iter()
                .map(|(chain, result)| (chain, result.unwrap_or(0)))
                .collect();
        }
        results
            .into_iter()
            .map(|(chain, result)| match result {
                Ok(balance) => {
                    cache.record(&public_key, chain, balance);
                    (chain, balance)
                }
                Err(e) => {
                    log::warn!("Balance refresh failed for {}: {}", chain, e);
                    let fallback = cache.get(&public_key, chain).map(|c| c.balance).unwrap_or(0);
                    (chain, fallback)
                }
            })
            .collect()
    }

    pub fn mark_chain_active(&self, public_key: &[u8; 32], chain: NetworkId) {
        self.lock().mark_chain_active(public_key, chain);
    }

    pub fn is_dormant(&self, public_key: &[u8; 32], chain: NetworkId) -> bool {
        self.lock().is_dormant(public_key, chain)
    }

    pub fn cached(&self, public_key: &[u8; 32], chain: NetworkId) -> Option<CachedBalance> {
        self.lock().get(public_key, chain).copied()
    }

    /// Drop every entry (logout or wallet switch).
    pub fn clear(&self) {
        let mut cache = self.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        cache.clear();
    }
}
