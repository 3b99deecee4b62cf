//! TLS configuration for connections to AWS IoT Core.
//!
//! Loads the root CA and, for mutual TLS, the device certificate and
//! private key from PEM files, then builds the matching rumqttc transport.

use std::path::Path;

use rumqttc::{TlsConfiguration, Transport};

use crate::config::{ConnectionConfig, TransportKind};
use crate::error::{MqttError, MqttResult};

fn read_pem(what: &str, path: &Path) -> MqttResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| MqttError::Tls(format!("failed to read {what} '{}': {e}", path.display())))
}

/// Build the rumqttc transport for `config`.
///
/// Uses `TlsConfiguration::Simple`, which reads PEM-encoded material:
/// - mutual TLS: CA + device certificate + private key over TCP/TLS
/// - WebSocket TLS: CA only, over WSS
pub fn load_transport(config: &ConnectionConfig) -> MqttResult<Transport> {
    let ca = read_pem("CA cert", config.root_ca_path())?;

    match config.kind() {
        TransportKind::MutualTls => {
            let auth = config.client_auth().ok_or_else(|| {
                MqttError::Configuration("mutual TLS requires a certificate and key".into())
            })?;
            let client_cert = read_pem("client cert", &auth.certificate_path)?;
            let client_key = read_pem("client key", &auth.private_key_path)?;
            Ok(Transport::tls_with_config(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth: Some((client_cert, client_key)),
            }))
        }
        TransportKind::WebSocketTls => Ok(Transport::wss_with_config(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: None,
        })),
    }
}
