//! MQTT channel error types.

use thiserror::Error;

/// Errors that can occur while configuring, connecting, publishing,
/// or tearing down an MQTT session.
#[derive(Debug, Error)]
pub enum MqttError {
    /// A required setting is missing or invalid. Raised before any I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("connect timed out after {timeout_ms}ms")]
    ConnectTimeout { timeout_ms: u64 },

    #[error("not connected: {0}")]
    NotConnected(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("no acknowledgment within {timeout_ms}ms")]
    PublishTimeout { timeout_ms: u64 },

    #[error("offline publish queue is disabled")]
    QueueDisabled,

    #[error("offline publish queue is full ({depth} messages)")]
    QueueFull { depth: usize },

    #[error("message dropped before delivery: {0}")]
    Undelivered(String),

    #[error("disconnect error: {0}")]
    Disconnect(String),

    #[error("disconnect timed out after {timeout_ms}ms")]
    DisconnectTimeout { timeout_ms: u64 },
}

impl MqttError {
    /// True when the failure means the link is down rather than the
    /// broker rejecting the request.
    pub fn is_link_down(&self) -> bool {
        matches!(self, Self::NotConnected(_))
    }
}

/// Convenience alias for MQTT results.
pub type MqttResult<T> = Result<T, MqttError>;
