//! Query Module
//!
//! Fetch orchestration on top of the cache: query runners with
//! stale-while-revalidate reads and retry, and mutations that invalidate
//! the queries they affect.

mod host;
mod mutation;
mod options;
mod runner;
mod state;

pub use host::HostEnvironment;
pub use mutation::Mutation;
pub use options::QueryOptions;
pub use runner::{FetchFuture, FetchMode, QueryBuilder, QueryData, QueryRunner, QuerySubscription};
pub use state::{QueryState, QueryStatus};
