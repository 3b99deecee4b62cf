//! The transport seam between the connection manager and an MQTT client.
//!
//! The manager only talks to `dyn Transport`, so tests can swap in
//! [`crate::mock::MockTransport`] to script disconnects and timeouts.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::config::ConnectionConfig;
use crate::error::{MqttError, MqttResult};

/// Delivery guarantee for a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    /// Fire and forget.
    AtMostOnce,
    /// Broker acknowledgment required.
    AtLeastOnce,
}

impl TryFrom<u8> for Qos {
    type Error = MqttError;

    fn try_from(level: u8) -> MqttResult<Self> {
        match level {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            other => Err(MqttError::Configuration(format!(
                "unsupported QoS level {other}"
            ))),
        }
    }
}

impl From<Qos> for rumqttc::QoS {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => rumqttc::QoS::AtMostOnce,
            Qos::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        }
    }
}

/// Physical link status as seen by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Up,
    Down,
}

/// A single physical MQTT connection.
///
/// Implementations never reconnect on their own: when the link drops they
/// report `LinkState::Down` and wait for the next `connect` call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the link. Resolves once the broker accepted the session.
    async fn connect(&self) -> MqttResult<()>;

    /// Send one message. Resolves once it was written (QoS 0) or
    /// acknowledged by the broker (QoS 1). Fails with
    /// [`MqttError::NotConnected`] when the link is down.
    async fn publish(&self, topic: &str, payload: &[u8], qos: Qos) -> MqttResult<()>;

    /// Close the link gracefully and release its resources.
    async fn disconnect(&self) -> MqttResult<()>;

    /// Link state changes.
    fn link_state(&self) -> watch::Receiver<LinkState>;
}

/// Builds a transport for validated connection parameters.
pub trait TransportFactory: Send + Sync {
    fn build(&self, config: &ConnectionConfig) -> MqttResult<Arc<dyn Transport>>;
}
