//! Query result cache
//!
//! Results keyed by collection and the exact query (vector bits, limit,
//! threshold, filter). The cache depends on collection state, so every
//! successful write clears it, and it registers itself as a [`RecoveryHook`]
//! so a collection reset clears it too.
//!
//! Each clear advances an epoch. A query captures the epoch before calling
//! the provider and its result is only stored if no clear happened since.

use crate::recovery::RecoveryHook;
use async_trait::async_trait;
use dashmap::DashMap;
use forest_core::{QueryMatch, QueryOptions};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QueryKey {
    collection: String,
    vector: Vec<u32>,
    limit: usize,
    threshold: u32,
    filter: Option<String>,
}

impl QueryKey {
    fn new(collection: &str, vector: &[f32], options: &QueryOptions) -> Self {
        Self {
            collection: collection.to_string(),
            vector: vector.iter().map(|v| v.to_bits()).collect(),
            limit: options.limit,
            threshold: options.threshold.to_bits(),
            filter: options
                .filter
                .as_ref()
                .and_then(|f| f.to_where_clause())
                .map(|clause| clause.to_string()),
        }
    }
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Cached entries
    pub entries: usize,
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that went to the provider
    pub misses: u64,
    /// Times the cache was cleared
    pub clears: u64,
    /// Results dropped because a clear happened while they were computed
    pub stale_inserts: u64,
}

/// Bounded cache of query results
pub struct QueryCache {
    entries: DashMap<QueryKey, Vec<QueryMatch>>,
    capacity: usize,
    // Held shared by inserts, exclusively by clears
    gate: RwLock<()>,
    epoch: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    clears: AtomicU64,
    stale_inserts: AtomicU64,
}

impl QueryCache {
    /// Cache holding at most `capacity` results; 0 disables caching
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            gate: RwLock::new(()),
            epoch: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            clears: AtomicU64::new(0),
            stale_inserts: AtomicU64::new(0),
        }
    }

    /// True if the cache stores anything at all
    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    /// Clears so far; capture before computing a result to insert
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Look up a query against `collection`
    pub fn get(
        &self,
        collection: &str,
        vector: &[f32],
        options: &QueryOptions,
    ) -> Option<Vec<QueryMatch>> {
        if !self.is_enabled() {
            return None;
        }
        let hit = self
            .entries
            .get(&QueryKey::new(collection, vector, options))
            .map(|entry| entry.value().clone());
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    /// Store a result computed at `epoch`, evicting an arbitrary entry when
    /// full. Returns false, storing nothing, if the cache was cleared since.
    pub fn insert(
        &self,
        epoch: u64,
        collection: &str,
        vector: &[f32],
        options: &QueryOptions,
        results: Vec<QueryMatch>,
    ) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let _gate = self.gate.read();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            self.stale_inserts.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let key = QueryKey::new(collection, vector, options);
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            // Collect the victim first; removing while iterating deadlocks the shard
            let victim = self.entries.iter().next().map(|e| e.key().clone());
            if let Some(victim) = victim {
                self.entries.remove(&victim);
            }
        }
        self.entries.insert(key, results);
        true
    }

    /// Drop every entry and invalidate results still being computed
    pub fn clear(&self) {
        let _gate = self.gate.write();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if !self.entries.is_empty() {
            self.entries.clear();
        }
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of cached queries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
            stale_inserts: self.stale_inserts.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl RecoveryHook for QueryCache {
    fn name(&self) -> &str {
        "query_cache"
    }

    fn clear_caches(&self) {
        self.clear();
    }
}
