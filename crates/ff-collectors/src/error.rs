//! Collector error types.

use thiserror::Error;

/// Errors raised while gathering one piece of the telemetry snapshot.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("{name}: request failed: {message}")]
    Request { name: String, message: String },

    #[error("{name}: HTTP {status}")]
    Status { name: String, status: u16 },

    #[error("{name}: invalid payload: {message}")]
    Format { name: String, message: String },

    #[error("{name}: unavailable: {message}")]
    Unavailable { name: String, message: String },

    #[error("invalid collector configuration: {0}")]
    Configuration(String),
}

/// Convenience alias for collector results.
pub type CollectorResult<T> = Result<T, CollectorError>;
