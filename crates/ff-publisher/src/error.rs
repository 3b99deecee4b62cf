//! Run-level error taxonomy.

use ff_collectors::CollectorError;
use ff_mqtt_channel::MqttError;
use thiserror::Error;

/// Why a publish run failed.
#[derive(Debug, Error)]
pub enum RunError {
    /// Missing or invalid settings. Detected before any network activity.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The initial connection failed or timed out.
    #[error("connection error: {0}")]
    Connection(String),

    /// A data source failed; nothing was published.
    #[error("collaborator error: {0}")]
    Collaborator(#[from] CollectorError),

    /// The broker did not acknowledge within the operation timeout.
    #[error("publish timed out: {0}")]
    PublishTimeout(String),

    /// The publish was rejected or dropped for a reason other than a timeout.
    #[error("publish failed: {0}")]
    Publish(String),
}

impl RunError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            _ => 1,
        }
    }

    pub(crate) fn from_publish(error: MqttError) -> Self {
        match error {
            MqttError::PublishTimeout { .. } => Self::PublishTimeout(error.to_string()),
            other => Self::Publish(other.to_string()),
        }
    }
}
