/// Merkleized metadata cache
///
/// Keyed by `(chain, spec_version)`. Inserting a spec version for a chain
/// evicts that chain's other versions, so a proof is never built against
/// metadata from before a runtime upgrade.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use super::MerkleizedMetadata;

#[derive(Default)]
pub struct MetadataCache {
    entries: RwLock<HashMap<(String, u32), Arc<MerkleizedMetadata>>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, chain: &str, spec_version: u32) -> Option<Arc<MerkleizedMetadata>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(chain.to_string(), spec_version))
            .cloned()
    }

    pub fn contains(&self, chain: &str, spec_version: u32) -> bool {
        self.get(chain, spec_version).is_some()
    }

    /// Cached metadata for `(chain, spec_version)`, built on a miss.
    ///
    /// The builder runs without the lock held. If two callers race, the
    /// first insert wins and both get the same entry.
    pub async fn get_or_build<F, Fut, E>(
        &self,
        chain: &str,
        spec_version: u32,
        builder: F,
    ) -> Result<Arc<MerkleizedMetadata>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<MerkleizedMetadata, E>>,
    {
        if let Some(hit) = self.get(chain, spec_version) {
            log::debug!("Metadata cache hit for {} v{}", chain, spec_version);
            return Ok(hit);
        }

        log::debug!("Metadata cache miss for {} v{}; merkleizing", chain, spec_version);
        let built = Arc::new(builder().await?);
        Ok(self.insert(chain, spec_version, built))
    }

    /// Insert and evict the chain's other spec versions.
    pub fn insert(
        &self,
        chain: &str,
        spec_version: u32,
        metadata: Arc<MerkleizedMetadata>,
    ) -> Arc<MerkleizedMetadata> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let key = (chain.to_string(), spec_version);
        if let Some(existing) = entries.get(&key) {
            return existing.clone();
        }

        let before = entries.len();
        entries.retain(|(c, v), _| c != chain || *v == spec_version);
        let evicted = before - entries.len();
        if evicted > 0 {
            log::info!(
                "Runtime upgrade on {} (v{}): evicted {} stale metadata entries",
                chain,
                spec_version,
                evicted
            );
        }
        entries.insert(key, metadata.clone());
        metadata
    }

    pub fn evict_chain(&self, chain: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(c, _), _| c != chain);
    }

    pub fn versions(&self, chain: &str) -> Vec<u32> {
        let mut versions: Vec<u32> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|(c, _)| c == chain)
            .map(|(_, v)| *v)
            .collect();
        versions.sort_unstable();
        versions
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetadataError;
    use crate::metadata::tests::{sample_extra, sample_metadata};

    async fn load(cache: &MetadataCache, chain: &str, v: u32) -> Arc<MerkleizedMetadata> {
        cache
            .get_or_build(chain, v, move || async move {
                MerkleizedMetadata::build(sample_metadata(), sample_extra(v))
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_hit_reuses_entry() {
        let cache = MetadataCache::new();
        let a = load(&cache, "polkadot", 4).await;
        let b = cache
            .get_or_build("polkadot", 4, || async {
                Err::<MerkleizedMetadata, _>(MetadataError::Decode("unreachable".into()))
            })
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_new_version_evicts_same_chain_only() {
        let cache = MetadataCache::new();
        load(&cache, "polkadot", 4).await;
        load(&cache, "kusama", 4).await;
        load(&cache, "polkadot", 5).await;

        assert!(!cache.contains("polkadot", 4));
        assert!(cache.contains("polkadot", 5));
        assert!(cache.contains("kusama", 4));
        assert_eq!(cache.versions("polkadot"), vec![5]);
    }

    #[tokio::test]
    async fn test_failed_build_caches_nothing() {
        let cache = MetadataCache::new();
        let result = cache
            .get_or_build("polkadot", 4, || async {
                Err::<MerkleizedMetadata, _>(MetadataError::Decode("unreachable".into()))
            })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty());
    }
}
