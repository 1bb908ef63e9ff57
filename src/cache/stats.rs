//! Cache Statistics Module
//!
//! Introspection snapshot plus hit/miss/eviction counters.

use serde::Serialize;

// == Counters ==
/// Running counters kept by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Reads that returned a value
    pub hits: u64,
    /// Reads that found nothing, an expired entry, or an undecodable value
    pub misses: u64,
    /// Entries removed to make room for a new one
    pub evictions: u64,
    /// Entries purged because their TTL elapsed
    pub expirations: u64,
}

impl Counters {
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expirations(&mut self, count: usize) {
        self.expirations += count as u64;
    }
}

// == Cache Stats ==
/// Point-in-time view of a cache store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of entries currently held (expired-but-unpurged included)
    pub size: usize,
    /// Maximum number of entries
    pub capacity: usize,
    /// Held keys, next-to-evict first
    pub keys: Vec<String>,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Builds a snapshot from the store's current shape and counters.
    pub fn new(capacity: usize, keys: Vec<String>, counters: Counters) -> Self {
        Self {
            size: keys.len(),
            capacity,
            keys,
            hits: counters.hits,
            misses: counters.misses,
            evictions: counters.evictions,
            expirations: counters.expirations,
        }
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
