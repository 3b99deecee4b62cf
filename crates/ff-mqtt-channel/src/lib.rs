//! MQTT session management for AWS IoT Core.
//!
//! Provides the connection layer for the Footfall publisher:
//! - `select_transport` turns raw endpoint settings into a validated `ConnectionConfig`
//! - `Transport` trait for a single broker link (mockable in tests)
//! - `MqttChannel` over mutual TLS or SigV4-signed WebSocket TLS for production
//! - `ConnectionManager` with reconnect backoff and an offline publish queue
//! - `MockTransport` for testing without a broker

pub mod backoff;
pub mod channel;
pub mod config;
pub mod error;
pub mod manager;
pub mod mock;
pub mod observer;
pub mod queue;
pub mod selector;
pub mod sigv4;
pub mod tls;
pub mod transport;

// Re-exports for convenience.
pub use channel::{MqttChannel, MqttTransportFactory};
pub use config::{
    ConnectionConfig, DropBehavior, EndpointSettings, OperationTimeouts, QueueLimit,
    ReconnectPolicy, TransportKind,
};
pub use error::{MqttError, MqttResult};
pub use manager::{ConnectionManager, PublishOutcome, SessionState};
pub use mock::{MockTransport, MockTransportFactory, RecordingObserver};
pub use observer::{ConnectionObserver, NoopObserver, TracingObserver};
pub use queue::DeliveryReceipt;
pub use selector::select_transport;
pub use transport::{LinkState, Qos, Transport, TransportFactory};
