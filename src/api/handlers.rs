//! API Handlers
//!
//! HTTP request handlers for each inspection endpoint.

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use regex::Regex;
use tracing::info;

use crate::cache::{CacheStore, SharedCache};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    ClearResponse, EntryParams, EntryResponse, HealthResponse, InvalidatePatternRequest,
    InvalidateResponse, PatternInvalidateResponse, StatsResponse,
};

/// Application state shared across all handlers.
///
/// Holds the same shared store that the process's query runners and
/// mutations use.
#[derive(Clone)]
pub struct AppState {
    /// Shared cache store
    pub cache: SharedCache,
    /// Stale threshold used when a request does not give one
    pub stale_time: Duration,
}

impl AppState {
    /// Creates a new AppState over an existing shared store.
    pub fn new(cache: SharedCache, stale_time: Duration) -> Self {
        Self { cache, stale_time }
    }

    /// Creates a new AppState with a fresh store built from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.build_store().into_shared(),
            Duration::from_millis(config.stale_time_ms),
        )
    }

    /// Wraps a store that nothing else shares yet.
    pub fn with_store(store: CacheStore, stale_time: Duration) -> Self {
        Self::new(store.into_shared(), stale_time)
    }
}

/// Handler for GET /entries/:key
///
/// Returns the live entry for a key with its timestamps and staleness.
pub async fn get_entry_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<EntryParams>,
) -> Result<Json<EntryResponse>> {
    let stale_time = params
        .stale_time_ms
        .map(Duration::from_millis)
        .unwrap_or(state.stale_time);

    // Write lock: reads purge expired entries and update counters
    let mut cache = state.cache.write().await;
    let stale = cache.is_stale(&key, stale_time);
    let now = cache.clock().now_ms();
    let entry = cache
        .get_entry(&key)
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;

    Ok(Json(EntryResponse::new(key, entry, now, stale)))
}

/// Handler for DELETE /entries/:key
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<InvalidateResponse>> {
    let mut cache = state.cache.write().await;
    if !cache.invalidate(&key) {
        return Err(CacheError::NotFound(key));
    }

    Ok(Json(InvalidateResponse::new(key)))
}

/// Handler for POST /invalidate
///
/// Removes every key matching the posted regular expression.
pub async fn invalidate_pattern_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidatePatternRequest>,
) -> Result<Json<PatternInvalidateResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }
    let pattern = Regex::new(&req.pattern)?;

    let removed = state.cache.write().await.invalidate_pattern(&pattern);
    info!(pattern = %req.pattern, removed, "invalidated keys by pattern");

    Ok(Json(PatternInvalidateResponse {
        pattern: req.pattern,
        removed,
    }))
}

/// Handler for DELETE /entries
pub async fn clear_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    let removed = state.cache.write().await.clear();
    info!(removed, "cache cleared");

    Json(ClearResponse { removed })
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    // Acquire read lock for stats
    let cache = state.cache.read().await;
    Json(StatsResponse::from(cache.stats()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
