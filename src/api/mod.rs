//! API Module
//!
//! HTTP inspection surface over a shared cache store.
//!
//! # Endpoints
//! - `GET /entries/:key` - Read an entry with its timestamps
//! - `DELETE /entries/:key` - Invalidate one key
//! - `DELETE /entries` - Clear the cache
//! - `POST /invalidate` - Invalidate keys by pattern
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
