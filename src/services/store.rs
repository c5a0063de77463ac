// src/services/store.rs
//! Concurrent TTL key-value store
//!
//! The revocation list and the abuse engine both keep hot per-key state
//! (revoked jtis, window counters, reputation scores). They take the store as
//! an injected trait object so an in-memory backend can be swapped for a
//! distributed one without touching the callers.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Key-value store with per-entry TTL and an atomic counter primitive.
///
/// `incr_by` must be atomic per key: two concurrent increments of the same
/// key always observe each other. Mutations to distinct keys must not
/// serialize against a single global lock.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str, ttl: Duration);
    async fn delete(&self, key: &str);
    /// Atomically add `delta` to the integer at `key`, creating it at zero
    /// with the given TTL when absent or expired. Returns the new value.
    async fn incr_by(&self, key: &str, delta: i64, ttl: Duration) -> i64;
    /// Drop expired entries. Safe to call at any time.
    async fn prune(&self);
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

const SHARD_COUNT: usize = 16;

/// Sharded in-memory implementation. Keys hash onto one of 16 shards, each
/// behind its own `RwLock`, so contention stays per-shard.
pub struct MemoryStore {
    shards: Vec<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard_for(&self, key: &str) -> &RwLock<HashMap<String, Entry>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<String> {
        let shard = self.shard_for(key);
        {
            let map = shard.read().await;
            match map.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired entry: remove it on the miss path
        let mut map = shard.write().await;
        if map.get(key).map(|e| e.is_expired()).unwrap_or(false) {
            map.remove(key);
        }
        None
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        let mut map = self.shard_for(key).write().await;
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn delete(&self, key: &str) {
        let mut map = self.shard_for(key).write().await;
        map.remove(key);
    }

    async fn incr_by(&self, key: &str, delta: i64, ttl: Duration) -> i64 {
        let mut map = self.shard_for(key).write().await;
        let now = Instant::now();
        match map.get_mut(key) {
            Some(entry) if now < entry.expires_at => {
                let current = entry.value.parse::<i64>().unwrap_or(0);
                let next = current + delta;
                entry.value = next.to_string();
                // Counters are idle-expired: activity keeps the record alive
                entry.expires_at = now + ttl;
                next
            }
            _ => {
                map.insert(
                    key.to_string(),
                    Entry {
                        value: delta.to_string(),
                        expires_at: now + ttl,
                    },
                );
                delta
            }
        }
    }

    async fn prune(&self) {
        let mut removed = 0usize;
        for shard in &self.shards {
            let mut map = shard.write().await;
            let before = map.len();
            map.retain(|_, entry| !entry.is_expired());
            removed += before - map.len();
        }
        if removed > 0 {
            debug!(removed = removed, "Pruned expired store entries");
        }
    }
}

/// Spawn the periodic low-priority maintenance task that keeps the store from
/// growing unbounded. Lazy expiry on the request path stays O(1); this sweep
/// handles keys nobody asks about again.
pub fn start_prune_task(store: Arc<dyn CacheStore>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // First tick fires immediately; skip it
        interval.tick().await;
        loop {
            interval.tick().await;
            store.prune().await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let store = MemoryStore::new();
        store.set("k", "v", Duration::from_secs(60)).await;
        assert_eq!(store.get("k").await, Some("v".to_string()));
        assert_eq!(store.get("missing").await, None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_gone() {
        let store = MemoryStore::new();
        store.set("k", "v", Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        store.set("k", "v", Duration::from_secs(60)).await;
        store.delete("k").await;
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn test_incr_counts_atomically_under_concurrency() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..100 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.incr_by("counter", 1, Duration::from_secs(60)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.get("counter").await, Some("100".to_string()));
    }

    #[tokio::test]
    async fn test_incr_restarts_after_expiry() {
        let store = MemoryStore::new();
        store.incr_by("c", 5, Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        let value = store.incr_by("c", 1, Duration::from_secs(60)).await;
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn test_prune_removes_only_expired() {
        let store = MemoryStore::new();
        store.set("old", "1", Duration::from_millis(5)).await;
        store.set("new", "2", Duration::from_secs(60)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.prune().await;
        assert_eq!(store.get("old").await, None);
        assert_eq!(store.get("new").await, Some("2".to_string()));
    }
}
