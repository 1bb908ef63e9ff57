//! Query Options Module
//!
//! Per-query configuration with every option spelled out and defaulted.

use std::time::Duration;

// == Query Options ==
/// Configuration for a single query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// When false the query is inert: no fetch ever runs (default: true)
    pub enabled: bool,
    /// Age after which data is refreshed in the background (default: 5 minutes)
    pub stale_time: Duration,
    /// TTL used when writing results into the cache (default: 10 minutes)
    pub cache_ttl: Duration,
    /// Background refetch period while the host is visible (default: disabled)
    pub refetch_interval: Option<Duration>,
    /// Refetch stale data when the host regains focus (default: false)
    pub refetch_on_window_focus: bool,
    /// Automatic retries after the first failed attempt (default: 3)
    pub retry_limit: u32,
    /// Delay before the first retry; doubles for each retry after it (default: 1s)
    pub retry_base_delay: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_time: Duration::from_secs(5 * 60),
            cache_ttl: Duration::from_secs(10 * 60),
            refetch_interval: None,
            refetch_on_window_focus: false,
            retry_limit: 3,
            retry_base_delay: Duration::from_millis(1000),
        }
    }
}

impl QueryOptions {
    // == Retry Delay ==
    /// Backoff before retry number `retry_count` (1-based):
    /// `retry_base_delay * 2^(retry_count - 1)`.
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(31);
        self.retry_base_delay.saturating_mul(1u32 << exponent)
    }
}
