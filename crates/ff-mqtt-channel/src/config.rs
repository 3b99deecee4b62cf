use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{MqttError, MqttResult};

/// Port for MQTT over mutually-authenticated TLS.
pub const MUTUAL_TLS_PORT: u16 = 8883;
/// Port for MQTT over WebSocket TLS.
pub const WEBSOCKET_TLS_PORT: u16 = 443;

/// Raw endpoint settings as gathered from the CLI or a TOML file.
///
/// Empty strings mean "not provided". Nothing here is validated; pass it
/// through [`crate::selector::select_transport`] to get a [`ConnectionConfig`].
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointSettings {
    /// Broker hostname (e.g., AWS IoT custom endpoint).
    #[serde(default)]
    pub host: String,
    /// Path to the root CA certificate (e.g., AmazonRootCA1.pem).
    #[serde(default)]
    pub root_ca_path: String,
    /// Path to the device X.509 certificate (PEM). Mutual TLS only.
    #[serde(default)]
    pub certificate_path: String,
    /// Path to the device private key (PEM). Mutual TLS only.
    #[serde(default)]
    pub private_key_path: String,
    /// Use MQTT over WebSocket TLS instead of mutual TLS.
    #[serde(default)]
    pub use_websocket: bool,
    /// MQTT client ID.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
    /// AWS region for WebSocket signing. Taken from the endpoint host, or
    /// the AWS environment, when empty.
    #[serde(default)]
    pub region: String,
}

fn default_client_id() -> String {
    "basicPubSub".to_string()
}

fn default_keepalive() -> u16 {
    30
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            root_ca_path: String::new(),
            certificate_path: String::new(),
            private_key_path: String::new(),
            use_websocket: false,
            client_id: default_client_id(),
            keepalive_secs: default_keepalive(),
            region: String::new(),
        }
    }
}

/// Which secure transport carries the MQTT session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    MutualTls,
    WebSocketTls,
}

/// Device certificate and private key presented during a mutual TLS handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAuth {
    pub certificate_path: PathBuf,
    pub private_key_path: PathBuf,
}

/// Validated, immutable connection parameters.
///
/// Only the transport selector constructs these, so a WebSocket config
/// never carries client credentials and a mutual TLS config always does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub(crate) kind: TransportKind,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) root_ca_path: PathBuf,
    pub(crate) client_auth: Option<ClientAuth>,
    pub(crate) client_id: String,
    pub(crate) keepalive: Duration,
    pub(crate) region: Option<String>,
}

impl ConnectionConfig {
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn root_ca_path(&self) -> &Path {
        &self.root_ca_path
    }

    pub fn client_auth(&self) -> Option<&ClientAuth> {
        self.client_auth.as_ref()
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn keepalive(&self) -> Duration {
        self.keepalive
    }

    /// Signing region for WebSocket TLS, when known before connecting.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Unsigned broker address. WebSocket connects sign this per attempt. WebSocket transports need a URL.
    pub fn broker_address(&self) -> String {
        match self.kind {
            TransportKind::MutualTls => self.host.clone(),
            TransportKind::WebSocketTls => format!("wss://{}:{}/mqtt", self.host, self.port),
        }
    }
}

/// Auto-reconnect backoff applied after the initial connection succeeded.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectPolicy {
    /// First delay before reconnecting, in seconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,
    /// Upper bound on the delay between attempts, in seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
    /// A connection that survives this long resets the backoff to base.
    #[serde(default = "default_stable_connection")]
    pub stable_connection_secs: u64,
}

fn default_base_delay() -> u64 {
    1
}

fn default_max_delay() -> u64 {
    32
}

fn default_stable_connection() -> u64 {
    20
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay(),
            max_delay_secs: default_max_delay(),
            stable_connection_secs: default_stable_connection(),
        }
    }
}

impl ReconnectPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs(self.base_delay_secs)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    pub fn stable_connection(&self) -> Duration {
        Duration::from_secs(self.stable_connection_secs)
    }

    pub fn validate(&self) -> MqttResult<()> {
        if self.base_delay_secs == 0 {
            return Err(MqttError::Configuration(
                "reconnect base delay must be at least 1s".into(),
            ));
        }
        if self.base_delay_secs > self.max_delay_secs {
            return Err(MqttError::Configuration(format!(
                "reconnect base delay ({}s) exceeds max delay ({}s)",
                self.base_delay_secs, self.max_delay_secs
            )));
        }
        Ok(())
    }
}

/// What to drop when a bounded offline queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropBehavior {
    /// Evict the oldest queued message to make room.
    DropOldest,
    /// Reject the message being submitted.
    #[default]
    DropNewest,
}

/// Capacity of the offline publish queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueLimit {
    Unbounded,
    Disabled,
    Bounded { depth: usize, drop: DropBehavior },
}

/// Timeouts and offline-queue settings for the connection manager.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationTimeouts {
    /// Hard cap on connect and on disconnect, in seconds.
    #[serde(default = "default_connect_disconnect")]
    pub connect_disconnect_secs: u64,
    /// Per-operation (publish acknowledgment) timeout, in seconds.
    #[serde(default = "default_operation")]
    pub operation_secs: u64,
    /// Offline queue draining rate, in messages per second.
    #[serde(default = "default_draining_frequency")]
    pub draining_frequency_hz: f64,
    /// Offline queue depth: -1 unbounded, 0 disabled, n bounded.
    #[serde(default = "default_queue_depth")]
    pub offline_queue_depth: i64,
    /// Overflow policy for a bounded queue.
    #[serde(default)]
    pub drop_behavior: DropBehavior,
}

fn default_connect_disconnect() -> u64 {
    10
}

fn default_operation() -> u64 {
    5
}

fn default_draining_frequency() -> f64 {
    2.0
}

fn default_queue_depth() -> i64 {
    -1
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            connect_disconnect_secs: default_connect_disconnect(),
            operation_secs: default_operation(),
            draining_frequency_hz: default_draining_frequency(),
            offline_queue_depth: default_queue_depth(),
            drop_behavior: DropBehavior::default(),
        }
    }
}

impl OperationTimeouts {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_disconnect_secs)
    }

    pub fn disconnect(&self) -> Duration {
        Duration::from_secs(self.connect_disconnect_secs)
    }

    pub fn operation(&self) -> Duration {
        Duration::from_secs(self.operation_secs)
    }

    /// Pause between two drained messages.
    pub fn draining_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.draining_frequency_hz.recip()).unwrap_or(Duration::MAX)
    }

    pub fn queue_limit(&self) -> QueueLimit {
        match self.offline_queue_depth {
            0 => QueueLimit::Disabled,
            n if n < 0 => QueueLimit::Unbounded,
            n => QueueLimit::Bounded {
                depth: n as usize,
                drop: self.drop_behavior,
            },
        }
    }

    pub fn validate(&self) -> MqttResult<()> {
        if self.connect_disconnect_secs == 0 || self.operation_secs == 0 {
            return Err(MqttError::Configuration(
                "connect/disconnect and operation timeouts must be at least 1s".into(),
            ));
        }
        let hz = self.draining_frequency_hz;
        if !(hz.is_finite() && hz > 0.0 && Duration::try_from_secs_f64(hz.recip()).is_ok()) {
            return Err(MqttError::Configuration(format!(
                "draining frequency must be positive and not vanishingly small, got {hz}"
            )));
        }
        Ok(())
    }
}
