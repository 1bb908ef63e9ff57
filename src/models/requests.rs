//! Request DTOs for the inspection API
//!
//! Defines the structure of incoming request bodies and query strings.

use serde::Deserialize;

/// Maximum accepted length of an invalidation pattern
pub const MAX_PATTERN_LENGTH: usize = 512;

/// Request body for pattern invalidation (POST /invalidate)
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidatePatternRequest {
    /// Regular expression matched against every cache key
    pub pattern: String,
}

impl InvalidatePatternRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid. Whether the
    /// pattern compiles is checked separately.
    pub fn validate(&self) -> Option<String> {
        if self.pattern.is_empty() {
            return Some("Pattern cannot be empty".to_string());
        }
        if self.pattern.len() > MAX_PATTERN_LENGTH {
            return Some(format!(
                "Pattern exceeds maximum length of {} characters",
                MAX_PATTERN_LENGTH
            ));
        }
        None
    }
}

/// Query string for reading an entry (GET /entries/:key)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryParams {
    /// Stale threshold in milliseconds; the server default applies if absent
    #[serde(default)]
    pub stale_time_ms: Option<u64>,
}
