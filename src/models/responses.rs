//! Response DTOs for the inspection API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheEntry, CacheStats};

/// Response body for reading an entry (GET /entries/:key)
#[derive(Debug, Clone, Serialize)]
pub struct EntryResponse {
    pub key: String,
    pub value: Value,
    /// Write timestamp (Unix milliseconds)
    pub stored_at: u64,
    /// Expiry timestamp (Unix milliseconds)
    pub expires_at: u64,
    pub age_ms: u64,
    pub ttl_remaining_ms: u64,
    /// Whether the entry is older than the requested stale threshold
    pub stale: bool,
}

impl EntryResponse {
    /// Creates a new EntryResponse from a live entry as seen at `now`
    pub fn new(key: impl Into<String>, entry: &CacheEntry, now: u64, stale: bool) -> Self {
        Self {
            key: key.into(),
            value: entry.value.clone(),
            stored_at: entry.stored_at,
            expires_at: entry.expires_at,
            age_ms: entry.age_ms(now),
            ttl_remaining_ms: entry.ttl_remaining_ms(now),
            stale,
        }
    }
}

/// Response body for single-key invalidation (DELETE /entries/:key)
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    /// Success message
    pub message: String,
    /// The key that was invalidated
    pub key: String,
}

impl InvalidateResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' invalidated", key),
            key,
        }
    }
}

/// Response body for pattern invalidation (POST /invalidate)
#[derive(Debug, Clone, Serialize)]
pub struct PatternInvalidateResponse {
    pub pattern: String,
    /// Number of keys removed
    pub removed: usize,
}

/// Response body for clearing the cache (DELETE /entries)
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    /// Number of entries dropped
    pub removed: usize,
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        let hit_rate = stats.hit_rate();
        Self { stats, hit_rate }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
