//! Error types for shared configuration (thiserror-based).

use thiserror::Error;

/// Errors produced while loading or validating a [`TimelineConfig`](crate::TimelineConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}
