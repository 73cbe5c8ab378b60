use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::adapter::NetworkId;

pub const DEFAULT_DORMANCY_THRESHOLD: u32 = 3;
pub const DEFAULT_BALANCE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedBalance {
    pub balance: u128,
    pub fetched_at: Instant,
    /// Consecutive zero observations.
    pub zero_count: u32,
}

/// Balance store keyed by `(public key, chain)`.
#[derive(Debug)]
pub struct BalanceCache {
    entries: HashMap<([u8; 32], NetworkId), CachedBalance>,
    ttl: Duration,
    dormancy_threshold: u32,
}

impl Default for BalanceCache {
    fn default() -> Self {
        Self::new(DEFAULT_BALANCE_TTL, DEFAULT_DORMANCY_THRESHOLD)
    }
}

impl BalanceCache {
    pub fn new(ttl: Duration, dormancy_threshold: u32) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            dormancy_threshold,
        }
    }

    pub fn get(&self, public_key: &[u8; 32], chain: NetworkId) -> Option<&CachedBalance> {
        self.entries.get(&(*public_key, chain))
    }

    pub fn is_fresh(&self, public_key: &[u8; 32], chain: NetworkId) -> bool {
        self.get(public_key, chain)
            .map(|e| e.fetched_at.elapsed() < self.ttl)
            .unwrap_or(false)
    }

    pub fn is_dormant(&self, public_key: &[u8; 32], chain: NetworkId) -> bool {
        self.get(public_key, chain)
            .map(|e| e.zero_count >= self.dormancy_threshold)
            .unwrap_or(false)
    }

    /// Store a fetched balance. Zero bumps the zero streak, anything else
    /// resets it.
    pub fn record(&mut self, public_key: &[u8; 32], chain: NetworkId, balance: u128) -> &CachedBalance {
        let previous_zeros = self.get(public_key, chain).map(|e| e.zero_count).unwrap_or(0);
        let zero_count = if balance == 0 {
            previous_zeros.saturating_add(1)
        } else {
            0
        };
        if zero_count == self.dormancy_threshold {
            log::info!(
                "{} marked dormant after {} zero balances",
                chain,
                zero_count
            );
        }
        let entry = self
            .entries
            .entry((*public_key, chain))
            .or_insert(CachedBalance {
                balance,
                fetched_at: Instant::now(),
                zero_count,
            });
        entry.balance = balance;
        entry.fetched_at = Instant::now();
        entry.zero_count = zero_count;
        entry
    }

    /// Reset the zero streak, typically after a transfer touched the chain.
    pub fn mark_chain_active(&mut self, public_key: &[u8; 32], chain: NetworkId) {
        if let Some(entry) = self.entries.get_mut(&(*public_key, chain)) {
            if entry.zero_count > 0 {
                log::debug!("{} marked active; dormancy reset", chain);
            }
            entry.zero_count = 0;
        }
    }

    pub fn clear(&mut self) {
        log::info!("Clearing {} cached balances", self.entries.len());
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [7u8; 32];

    #[test]
    fn test_zero_streak_and_reset() {
        let mut cache = BalanceCache::default();
        for _ in 0..2 {
            cache.record(&KEY, NetworkId::Polkadot, 0);
        }
        assert!(!cache.is_dormant(&KEY, NetworkId::Polkadot));
        cache.record(&KEY, NetworkId::Polkadot, 0);
        assert!(cache.is_dormant(&KEY, NetworkId::Polkadot));

        cache.record(&KEY, NetworkId::Polkadot, 5);
        assert_eq!(cache.get(&KEY, NetworkId::Polkadot).unwrap().zero_count, 0);
        assert!(!cache.is_dormant(&KEY, NetworkId::Polkadot));
    }

    #[test]
    fn test_mark_chain_active_resets() {
        let mut cache = BalanceCache::new(DEFAULT_BALANCE_TTL, 2);
        cache.record(&KEY, NetworkId::Kusama, 0);
        cache.record(&KEY, NetworkId::Kusama, 0);
        assert!(cache.is_dormant(&KEY, NetworkId::Kusama));
        cache.mark_chain_active(&KEY, NetworkId::Kusama);
        assert!(!cache.is_dormant(&KEY, NetworkId::Kusama));
        assert_eq!(cache.get(&KEY, NetworkId::Kusama).unwrap().balance, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_freshness_follows_ttl() {
        let mut cache = BalanceCache::new(Duration::from_secs(60), 3);
        cache.record(&KEY, NetworkId::Polkadot, 1);
        assert!(cache.is_fresh(&KEY, NetworkId::Polkadot));
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!cache.is_fresh(&KEY, NetworkId::Polkadot));
        assert!(!cache.is_fresh(&KEY, NetworkId::Kusama));
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut cache = BalanceCache::default();
        cache.record(&KEY, NetworkId::Polkadot, 1);
        cache.record(&KEY, NetworkId::AssetHubPolkadot, 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
