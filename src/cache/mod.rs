//! Cache Module
//!
//! Bounded in-memory storage with TTL expiration, staleness tracking,
//! FIFO (or LRU) eviction and pattern-based invalidation.

mod clock;
mod entry;
mod order;
mod stats;
mod store;


// Re-export public types
pub use clock::{current_timestamp_ms, system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use entry::CacheEntry;
pub use order::{EvictionPolicy, OrderTracker};
pub use stats::{CacheStats, Counters};
pub use store::{CacheStore, SharedCache};
