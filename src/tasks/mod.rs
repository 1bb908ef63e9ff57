//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache is shared.
//!
//! # Tasks
//! - Sweeper: Removes expired cache entries at configured intervals

mod sweeper;

pub use sweeper::spawn_sweeper_task;
