//! Snapshot Cache Module
//!
//! Thread-safe memoization of chain state snapshots, keyed by strongly typed
//! keys. Uses DashMap for concurrent access without lock contention.
//!
//! Features:
//! - Optional TTL (entries live for the whole run by default)
//! - Failed computations are never cached
//! - Cache HIT/MISS statistics

use alloy_primitives::{Address, U256};
use dashmap::DashMap;
use serde::Serialize;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::models::types::{BlockPin, Epoch};

/// Delegation snapshot key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VeSnapshotKey {
    pub position_id: U256,
    pub calc_epoch: Epoch,
    pub block: BlockPin,
}

/// Reward contract snapshot key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BribeSnapshotKey {
    pub bribe: Address,
    pub token: Address,
    pub calc_epoch: Epoch,
    pub delegatee: Address,
    pub block: BlockPin,
}

#[derive(Clone, Debug)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| self.created_at.elapsed() > ttl)
    }
}

/// Memoization table shared by clones
#[derive(Clone)]
pub struct SnapshotCache<K, V> {
    name: &'static str,
    store: Arc<DashMap<K, CacheEntry<V>>>,
    ttl: Option<Duration>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl<K, V> SnapshotCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    pub fn new(name: &'static str) -> Self {
        Self::with_ttl(name, None)
    }

    pub fn with_ttl(name: &'static str, ttl_secs: Option<u64>) -> Self {
        Self {
            name,
            store: Arc::new(DashMap::new()),
            ttl: ttl_secs.map(Duration::from_secs),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get with TTL validation; expired entries are evicted
    pub fn get(&self, key: &K) -> Option<V> {
        if let Some(entry) = self.store.get(key) {
            if entry.is_expired(self.ttl) {
                drop(entry); // release read lock before removing
                self.store.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("📭 {} MISS (expired): {:?}", self.name, key);
                None
            } else {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("✅ {} HIT: {:?}", self.name, key);
                Some(entry.value.clone())
            }
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("📭 {} MISS: {:?}", self.name, key);
            None
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.store.insert(
            key,
            CacheEntry {
                value,
                created_at: Instant::now(),
            },
        );
    }

    /// Return the cached value or compute, store and return it.
    ///
    /// An `Err` from `compute` is passed through and nothing is stored. Two
    /// tasks racing on the same key may both compute; both results are equal
    /// for a pinned block, so the last write wins harmlessly.
    pub async fn get_or_try_compute<F, Fut, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = compute().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Remove expired entries, returning how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let before = self.store.len();
        let ttl = self.ttl;
        self.store.retain(|_, entry| !entry.is_expired(ttl));
        let removed = before - self.store.len();
        if removed > 0 {
            info!("🧹 {} CLEANUP: {} expired entries removed", self.name, removed);
        }
        removed
    }

    pub fn clear(&self) {
        self.store.clear();
        debug!("🗑️ {} CLEARED", self.name);
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            name: self.name,
            entries: self.store.len(),
            hits,
            misses,
            hit_rate,
            ttl_secs: self.ttl.map(|ttl| ttl.as_secs()),
        }
    }
}

/// Cache statistics for run summaries
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub name: &'static str,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub ttl_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn key(block: u64) -> VeSnapshotKey {
        VeSnapshotKey {
            position_id: U256::from(1),
            calc_epoch: Epoch::align(1_209_600, 604_800),
            block: BlockPin::Number(block),
        }
    }

    #[test]
    fn test_cache_insert_get() {
        let cache: SnapshotCache<VeSnapshotKey, u64> = SnapshotCache::new("ve");
        cache.insert(key(1), 42);
        assert_eq!(cache.get(&key(1)), Some(42));
        assert_eq!(cache.get(&key(2)), None);

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_block_is_part_of_key() {
        let cache: SnapshotCache<VeSnapshotKey, u64> = SnapshotCache::new("ve");
        cache.insert(key(1), 1);
        cache.insert(key(2), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key(2)), Some(2));
    }

    #[tokio::test]
    async fn test_compute_once() {
        let cache: SnapshotCache<VeSnapshotKey, u64> = SnapshotCache::new("ve");
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_try_compute(key(1), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(7)
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_errors_not_cached() {
        let cache: SnapshotCache<VeSnapshotKey, u64> = SnapshotCache::new("ve");
        let failed = cache
            .get_or_try_compute(key(1), || async { Err::<u64, _>("boom") })
            .await;
        assert!(failed.is_err());
        assert!(cache.is_empty());

        let ok = cache.get_or_try_compute(key(1), || async { Ok::<_, &str>(3) }).await;
        assert_eq!(ok, Ok(3));
    }

    #[test]
    fn test_ttl_expiry() {
        let cache: SnapshotCache<VeSnapshotKey, u64> = SnapshotCache::with_ttl("ve", Some(0));
        cache.insert(key(1), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.get(&key(1)).is_none());
    }

    #[test]
    fn test_clear() {
        let cache: SnapshotCache<VeSnapshotKey, u64> = SnapshotCache::new("ve");
        cache.insert(key(1), 1);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().ttl_secs, None);
    }
}
