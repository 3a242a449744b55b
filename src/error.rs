//! Error types for Sessionweave

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during session reconstruction
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Malformed event for device {device_id} app {app_package} at {timestamp}: {reason}")]
    MalformedEvent {
        device_id: String,
        app_package: String,
        timestamp: DateTime<Utc>,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error(
        "Negative duration for device {device_id} app {app_package}: start {start} after end {end}"
    )]
    NegativeDuration {
        device_id: String,
        app_package: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Failed to parse events: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}
