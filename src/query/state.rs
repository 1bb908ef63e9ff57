//! Query State Module
//!
//! Observable lifecycle of one query.

use std::sync::Arc;
use std::time::Duration;

// == Query Status ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

// == Query State ==
/// What a caller sees of a query at a given moment.
#[derive(Debug, Clone)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub status: QueryStatus,
    /// Last terminal foreground failure; cleared by the next fetch
    pub error: Option<Arc<anyhow::Error>>,
    /// When `data` was produced (Unix milliseconds)
    pub last_fetched_at: Option<u64>,
    /// Automatic retries made by the current foreground fetch
    pub retry_count: u32,
    /// True while any fetch for this query is in flight, background included
    pub is_fetching: bool,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            status: QueryStatus::Idle,
            error: None,
            last_fetched_at: None,
            retry_count: 0,
            is_fetching: false,
        }
    }
}

impl<T> QueryState<T> {
    /// True when there is no fetch time yet, or `now_ms - last_fetched_at > stale_time`.
    pub fn is_stale(&self, stale_time: Duration, now_ms: u64) -> bool {
        match self.last_fetched_at {
            Some(fetched_at) => now_ms.saturating_sub(fetched_at) > stale_time.as_millis() as u64,
            None => true,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }
}
