// src/cache.rs

//! Read-through TTL cache
//!
//! Caches full entity-read responses (`entity:<chain_id>`) and resolved
//! principal closures (`principals:<user_id>`). Entries expire by TTL;
//! write paths invalidate explicitly. Consistency is read-your-writes
//! within a request and eventual across requests; callers needing strict
//! reads bypass the cache.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Cache key for an entity read response
pub fn entity_key(chain_id: &str) -> String {
    format!("entity:{}", chain_id)
}

/// Cache key for a resolved principal closure
pub fn principals_key(user_id: &str) -> String {
    format!("principals:{}", user_id)
}

/// Prefix of every principal-closure key
pub const PRINCIPALS_PREFIX: &str = "principals:";

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    created_at: Instant,
    ttl: Duration,
    hit_count: u64,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

/// In-memory TTL key-value cache
pub struct TtlCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

/// Cache statistics for the admin stats endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Entries currently stored (live and expired-but-unswept)
    pub entry_count: usize,
    /// Entries past their TTL awaiting sweep
    pub expired_count: usize,
    /// Total hits recorded across live entries
    pub total_hits: u64,
}

impl TtlCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch a live value; expired entries are removed on access
    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.hit_count += 1;
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a value with its own TTL
    pub async fn put(&self, key: &str, value: Value, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl,
                hit_count: 0,
            },
        );
    }

    /// Drop a single key
    pub async fn invalidate(&self, key: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
    }

    /// Drop every key with the given prefix
    ///
    /// Group-membership changes use this to clear all memoized closures.
    pub async fn invalidate_prefix(&self, prefix: &str) {
        let mut entries = self.entries.write().await;
        entries.retain(|key, _| !key.starts_with(prefix));
    }

    /// Sweep expired entries
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Snapshot for the stats endpoint
    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let mut expired_count = 0usize;
        let mut total_hits = 0u64;
        for entry in entries.values() {
            if entry.is_expired() {
                expired_count += 1;
            }
            total_hits += entry.hit_count;
        }
        CacheStats {
            entry_count: entries.len(),
            expired_count,
            total_hits,
        }
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new()
    }
}
