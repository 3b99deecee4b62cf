//! Transport selection: turn raw endpoint settings into validated
//! connection parameters.
//!
//! Runs before any network activity. WebSocket TLS authenticates the
//! server only, so it needs just the root CA; mutual TLS additionally
//! needs the device certificate and private key.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{
    ClientAuth, ConnectionConfig, EndpointSettings, MUTUAL_TLS_PORT, TransportKind,
    WEBSOCKET_TLS_PORT,
};
use crate::error::{MqttError, MqttResult};
use crate::sigv4::region_from_host;

/// Validate `settings` and pick the transport they describe.
///
/// Reports every missing field at once so an operator can fix the
/// configuration in a single pass.
pub fn select_transport(settings: &EndpointSettings) -> MqttResult<ConnectionConfig> {
    let mut missing = Vec::new();
    if settings.host.trim().is_empty() {
        missing.push("endpoint host");
    }
    if settings.root_ca_path.trim().is_empty() {
        missing.push("root CA path");
    }
    if settings.client_id.trim().is_empty() {
        missing.push("client id");
    }

    let (kind, port, client_auth) = if settings.use_websocket {
        if !settings.certificate_path.is_empty() || !settings.private_key_path.is_empty() {
            tracing::warn!("certificate and private key are ignored for WebSocket TLS");
        }
        (TransportKind::WebSocketTls, WEBSOCKET_TLS_PORT, None)
    } else {
        if settings.certificate_path.trim().is_empty() {
            missing.push("certificate path");
        }
        if settings.private_key_path.trim().is_empty() {
            missing.push("private key path");
        }
        let auth = ClientAuth {
            certificate_path: PathBuf::from(&settings.certificate_path),
            private_key_path: PathBuf::from(&settings.private_key_path),
        };
        (TransportKind::MutualTls, MUTUAL_TLS_PORT, Some(auth))
    };

    if !missing.is_empty() {
        return Err(MqttError::Configuration(format!(
            "missing {}",
            missing.join(", ")
        )));
    }

    let host = settings.host.trim().to_string();
    let region = match kind {
        TransportKind::MutualTls => None,
        TransportKind::WebSocketTls if !settings.region.trim().is_empty() => {
            Some(settings.region.trim().to_string())
        }
        TransportKind::WebSocketTls => region_from_host(&host).map(str::to_string),
    };

    Ok(ConnectionConfig {
        kind,
        host,
        port,
        root_ca_path: PathBuf::from(&settings.root_ca_path),
        client_auth,
        client_id: settings.client_id.clone(),
        keepalive: Duration::from_secs(settings.keepalive_secs.into()),
        region,
    })
}
