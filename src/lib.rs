//! Query Cache - client-side data fetching and caching
//!
//! An in-memory TTL cache with stale-while-revalidate reads, retry with
//! exponential backoff, pattern invalidation and background refresh, plus an
//! optional HTTP surface for inspecting a shared store.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod query;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheStore, SharedCache};
pub use config::Config;
pub use error::CacheError;
pub use query::{HostEnvironment, Mutation, QueryOptions, QueryRunner, QueryState, QueryStatus};
pub use tasks::spawn_sweeper_task;
