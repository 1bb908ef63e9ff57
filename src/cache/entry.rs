//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and staleness support.

use serde_json::Value;

// == Cache Entry ==
/// Represents a single cache entry with its value and timing metadata.
///
/// Two clocks apply to every entry: `expires_at` decides whether the value may
/// be returned at all, `stored_at` decides whether it is old enough to refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The stored value, opaque to the cache
    pub value: Value,
    /// Write timestamp (Unix milliseconds)
    pub stored_at: u64,
    /// Expiration timestamp (Unix milliseconds), always after `stored_at`
    pub expires_at: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry written at `now` that lives for `ttl_ms`.
    ///
    /// A zero TTL is clamped to one millisecond so that `expires_at > stored_at`
    /// always holds.
    pub fn new(value: Value, now: u64, ttl_ms: u64) -> Self {
        Self {
            value,
            stored_at: now,
            expires_at: now.saturating_add(ttl_ms.max(1)),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: an entry is expired once `now >= expires_at`, so a
    /// read at exactly `stored_at + ttl` is already a miss.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    // == Is Stale ==
    /// Checks if the entry is older than `stale_time_ms` at `now`.
    ///
    /// Staleness ignores `expires_at`: an entry can be both servable and stale.
    pub fn is_stale(&self, now: u64, stale_time_ms: u64) -> bool {
        self.age_ms(now) > stale_time_ms
    }

    // == Age ==
    /// Milliseconds elapsed since the entry was written.
    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.stored_at)
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, 0 once expired.
    pub fn ttl_remaining_ms(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }
}
