//! The verdict cache: a content-addressed cache of [`PolicyResult`]s keyed by
//! the canonical fingerprint of the attribute set that produced them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::effect::PolicyResult;
use crate::error::AceError;

/// Point-in-time counters for cache observability.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerdictCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub version: u64,
}

/// Pluggable storage behind the verdict cache.
///
/// The in-memory implementation shipped here ([`InMemoryVerdictStore`]) is
/// the only backend in this crate; a persistent backend (the relational
/// `verdict_cache` table) is an external collaborator that can implement this
/// trait without `PolicyEvaluator` changing at all.
#[async_trait]
pub trait VerdictStore: Send + Sync {
    async fn get(&self, fingerprint: &str) -> Result<Option<PolicyResult>, AceError>;
    async fn put(&self, fingerprint: String, result: PolicyResult) -> Result<(), AceError>;
    async fn purge_all(&self) -> Result<(), AceError>;
    async fn len(&self) -> Result<usize, AceError>;
}

/// An in-memory [`VerdictStore`] guarded by an async `RwLock`, since readers
/// and the reload path both need to await on it without blocking a thread.
#[derive(Debug, Default)]
pub struct InMemoryVerdictStore {
    entries: RwLock<HashMap<String, PolicyResult>>,
}

impl InMemoryVerdictStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VerdictStore for InMemoryVerdictStore {
    async fn get(&self, fingerprint: &str) -> Result<Option<PolicyResult>, AceError> {
        Ok(self.entries.read().await.get(fingerprint).copied())
    }

    async fn put(&self, fingerprint: String, result: PolicyResult) -> Result<(), AceError> {
        self.entries.write().await.insert(fingerprint, result);
        Ok(())
    }

    async fn purge_all(&self) -> Result<(), AceError> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize, AceError> {
        Ok(self.entries.read().await.len())
    }
}

/// The verdict cache an evaluator consults before walking the policy tree.
///
/// `version` is bumped on every [`VerdictCache::purge_all`] so that a reload
/// invalidates every previously-cached verdict in one atomic step, even
/// for in-flight lookups racing the purge.
pub struct VerdictCache {
    store: Box<dyn VerdictStore>,
    hits: AtomicU64,
    misses: AtomicU64,
    version: AtomicU64,
}

impl VerdictCache {
    #[must_use]
    pub fn new(store: Box<dyn VerdictStore>) -> Self {
        Self {
            store,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            version: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Box::new(InMemoryVerdictStore::new()))
    }

    pub async fn get(&self, fingerprint: &str) -> Result<Option<PolicyResult>, AceError> {
        let result = self.store.get(fingerprint).await?;
        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(result)
    }

    pub async fn put(&self, fingerprint: String, result: PolicyResult) -> Result<(), AceError> {
        self.store.put(fingerprint, result).await
    }

    /// Invalidates every cached verdict and bumps the cache version.
    ///
    /// Called by the evaluator as the last step of a successful policy
    /// reload — verdicts are content-addressed on the attribute set, not the
    /// policy tree, so there is no way to know which cached entries the new
    /// tree would still agree with; the safe, spec-mandated move is to
    /// discard all of them.
    pub async fn purge_all(&self) -> Result<(), AceError> {
        self.store.purge_all().await?;
        self.version.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Relaxed)
    }

    pub async fn stats(&self) -> Result<VerdictCacheStats, AceError> {
        Ok(VerdictCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.store.len().await?,
            version: self.version(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn miss_then_hit_updates_stats() {
        let cache = VerdictCache::in_memory();
        assert!(cache.get("fp1").await.unwrap().is_none());
        cache
            .put("fp1".to_string(), PolicyResult::Permit)
            .await
            .unwrap();
        assert_eq!(cache.get("fp1").await.unwrap(), Some(PolicyResult::Permit));

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn purge_all_clears_entries_and_bumps_version() {
        let cache = VerdictCache::in_memory();
        cache
            .put("fp1".to_string(), PolicyResult::Deny)
            .await
            .unwrap();
        assert_eq!(cache.version(), 0);
        cache.purge_all().await.unwrap();
        assert_eq!(cache.version(), 1);
        assert!(cache.get("fp1").await.unwrap().is_none());
    }
}
