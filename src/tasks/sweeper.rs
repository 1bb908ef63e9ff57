//! Expired-Entry Sweeper
//!
//! Background task that periodically purges expired cache entries, so that
//! keys nobody reads again still release their memory.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::SharedCache;

/// Spawns a background task that periodically purges expired cache entries.
///
/// The task runs in an infinite loop, sleeping for `interval` between runs and
/// taking the write lock only for the purge itself.
///
/// # Returns
/// A JoinHandle for the spawned task, aborted during graceful shutdown.
///
/// # Example
/// ```ignore
/// let cache = CacheStore::new(100, Duration::from_secs(600)).into_shared();
/// let sweeper = spawn_sweeper_task(cache.clone(), Duration::from_secs(30));
/// // Later, during shutdown:
/// sweeper.abort();
/// ```
pub fn spawn_sweeper_task(cache: SharedCache, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting expired-entry sweeper with interval of {} ms",
            interval.as_millis()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = {
                let mut store = cache.write().await;
                store.purge_expired()
            };

            if removed > 0 {
                info!("Sweeper: removed {} expired entries", removed);
            } else {
                debug!("Sweeper: no expired entries found");
            }
        }
    })
}
