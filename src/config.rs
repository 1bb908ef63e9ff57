//! Configuration Module
//!
//! Loads cache, query and server settings from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::cache::{CacheStore, EvictionPolicy};
use crate::query::QueryOptions;

/// Cache and server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of entries the cache can hold
    pub cache_capacity: usize,
    /// TTL in milliseconds for entries written without an explicit TTL
    pub default_ttl_ms: u64,
    /// Age in milliseconds after which cached data is refreshed in the background
    pub stale_time_ms: u64,
    /// Which access moves a key away from eviction
    pub eviction_policy: EvictionPolicy,
    /// HTTP port of the inspection API
    pub server_port: u16,
    /// Interval in seconds between expired-entry sweeps
    pub sweep_interval_secs: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY` - Maximum cache entries (default: 100)
    /// - `DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 600000)
    /// - `STALE_TIME_MS` - Stale threshold in milliseconds (default: 300000)
    /// - `EVICTION_POLICY` - `fifo` or `lru` (default: fifo)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `SWEEP_INTERVAL_SECS` - Sweep frequency in seconds (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_capacity: env_or("CACHE_CAPACITY", defaults.cache_capacity),
            default_ttl_ms: env_or("DEFAULT_TTL_MS", defaults.default_ttl_ms),
            stale_time_ms: env_or("STALE_TIME_MS", defaults.stale_time_ms),
            eviction_policy: env_or("EVICTION_POLICY", defaults.eviction_policy),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs),
        }
    }

    /// Builds a cache store with this configuration on the system clock.
    pub fn build_store(&self) -> CacheStore {
        CacheStore::new(self.cache_capacity, Duration::from_millis(self.default_ttl_ms))
            .with_policy(self.eviction_policy)
    }

    /// Query options whose cache timings follow this configuration.
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            stale_time: Duration::from_millis(self.stale_time_ms),
            cache_ttl: Duration::from_millis(self.default_ttl_ms),
            ..QueryOptions::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_capacity: 100,
            default_ttl_ms: 600_000,
            stale_time_ms: 300_000,
            eviction_policy: EvictionPolicy::Fifo,
            server_port: 3000,
            sweep_interval_secs: 30,
        }
    }
}

// Unset variables fall back silently; unparsable ones fall back with a warning.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid value {:?} for {}", raw, name);
            default
        }),
        Err(_) => default,
    }
}
