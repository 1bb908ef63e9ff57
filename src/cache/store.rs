//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with eviction-order tracking,
//! TTL expiration and staleness checks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::cache::{
    system_clock, CacheEntry, CacheStats, Counters, EvictionPolicy, OrderTracker, SharedClock,
};

/// A cache store shared between query runners, mutations and the API.
pub type SharedCache = Arc<RwLock<CacheStore>>;

// == Cache Store ==
/// Bounded, time-aware key/value storage.
///
/// Every operation is infallible: absence is reported as `None`, `false` or `0`.
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Eviction order
    order: OrderTracker,
    /// Hit/miss/eviction counters
    counters: Counters,
    /// Maximum number of entries allowed
    capacity: usize,
    /// TTL used by `set_default`
    default_ttl: Duration,
    clock: SharedClock,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a FIFO store on the system clock.
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of entries (0 is treated as 1)
    /// * `default_ttl` - TTL applied by `set_default`
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self::with_clock(capacity, default_ttl, system_clock())
    }

    /// Creates a FIFO store reading time from `clock`.
    pub fn with_clock(capacity: usize, default_ttl: Duration, clock: SharedClock) -> Self {
        Self {
            entries: HashMap::new(),
            order: OrderTracker::new(EvictionPolicy::Fifo),
            counters: Counters::default(),
            capacity: capacity.max(1),
            default_ttl,
            clock,
        }
    }

    /// Switches the eviction policy. Intended for construction time, so any
    /// tracked order is rebuilt from the current entries in write order.
    pub fn with_policy(mut self, policy: EvictionPolicy) -> Self {
        let mut by_write: Vec<(&String, u64)> = self
            .entries
            .iter()
            .map(|(key, entry)| (key, entry.stored_at))
            .collect();
        by_write.sort_by_key(|(_, stored_at)| *stored_at);

        let mut order = OrderTracker::new(policy);
        for (key, _) in by_write {
            order.record_insert(key);
        }
        self.order = order;
        self
    }

    /// Wraps the store for sharing across tasks.
    pub fn into_shared(self) -> SharedCache {
        Arc::new(RwLock::new(self))
    }

    // == Set ==
    /// Stores `value` under `key` for `ttl`.
    ///
    /// An existing entry for the key is replaced and moves to the newest
    /// position. If the store is still full, the oldest entry is evicted first.
    pub fn set(&mut self, key: impl Into<String>, value: Value, ttl: Duration) {
        let key = key.into();
        let now = self.clock.now_ms();

        if self.entries.remove(&key).is_some() {
            self.order.remove(&key);
        }

        while self.entries.len() >= self.capacity {
            match self.order.evict_oldest() {
                Some(evicted) => {
                    self.entries.remove(&evicted);
                    self.counters.record_eviction();
                    debug!(key = %evicted, "evicted cache entry");
                }
                None => break,
            }
        }

        let entry = CacheEntry::new(value, now, ttl.as_millis() as u64);
        self.entries.insert(key.clone(), entry);
        self.order.record_insert(&key);
    }

    /// Stores `value` under `key` with the store's default TTL.
    pub fn set_default(&mut self, key: impl Into<String>, value: Value) {
        let ttl = self.default_ttl;
        self.set(key, value, ttl);
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Expired entries are removed and reported as absent.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        self.get_entry(key).map(|entry| entry.value.clone())
    }

    /// Retrieves a value and decodes it into `T`.
    ///
    /// A value that does not decode is reported as absent and left in place.
    pub fn get_as<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        if !self.purge_if_expired(key) {
            self.counters.record_miss();
            return None;
        }

        let decoded = self
            .entries
            .get(key)
            .map(|entry| serde_json::from_value::<T>(entry.value.clone()));

        match decoded {
            Some(Ok(value)) => {
                self.counters.record_hit();
                self.order.record_read(key);
                Some(value)
            }
            Some(Err(err)) => {
                warn!(key, error = %err, "cached value has an unexpected shape");
                self.counters.record_miss();
                None
            }
            None => {
                self.counters.record_miss();
                None
            }
        }
    }

    /// Retrieves the full entry, including its timestamps.
    pub fn get_entry(&mut self, key: &str) -> Option<&CacheEntry> {
        if self.purge_if_expired(key) {
            self.counters.record_hit();
            self.order.record_read(key);
            self.entries.get(key)
        } else {
            self.counters.record_miss();
            None
        }
    }

    // == Is Stale ==
    /// Returns true if there is no live entry for `key`, or it was written more
    /// than `stale_time` ago. Does not purge and does not touch counters.
    pub fn is_stale(&self, key: &str, stale_time: Duration) -> bool {
        let now = self.clock.now_ms();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.is_stale(now, stale_time.as_millis() as u64)
            }
            _ => true,
        }
    }

    // == Invalidate ==
    /// Removes an entry by key. Returns whether anything was removed.
    pub fn invalidate(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_some() {
            self.order.remove(key);
            true
        } else {
            false
        }
    }

    /// Removes every key matching `pattern`. Returns the number removed.
    pub fn invalidate_pattern(&mut self, pattern: &Regex) -> usize {
        let matching: Vec<String> = self
            .entries
            .keys()
            .filter(|key| pattern.is_match(key))
            .cloned()
            .collect();

        for key in &matching {
            self.entries.remove(key);
            self.order.remove(key);
        }

        if !matching.is_empty() {
            debug!(pattern = %pattern, removed = matching.len(), "invalidated cache keys");
        }
        matching.len()
    }

    /// Removes everything. Returns the number of entries dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.order.clear();
        count
    }

    // == Stats ==
    /// Returns a snapshot of size, capacity, keys and counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats::new(self.capacity, self.order.keys_oldest_first(), self.counters)
    }

    // == Purge Expired ==
    /// Removes all expired entries. Returns the number removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now_ms();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.remove(key);
            self.order.remove(key);
        }

        self.counters.record_expirations(expired.len());
        expired.len()
    }

    /// Returns true if a live entry exists. Does not purge or count.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.clock.now_ms();
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.order.policy()
    }

    /// The clock this store reads time from.
    pub fn clock(&self) -> SharedClock {
        Arc::clone(&self.clock)
    }

    // Drops the entry for `key` if it has expired. Returns whether a live
    // entry remains.
    fn purge_if_expired(&mut self, key: &str) -> bool {
        let now = self.clock.now_ms();
        match self.entries.get(key).map(|entry| entry.is_expired(now)) {
            Some(true) => {
                self.entries.remove(key);
                self.order.remove(key);
                self.counters.record_expirations(1);
                false
            }
            Some(false) => true,
            None => false,
        }
    }
}
