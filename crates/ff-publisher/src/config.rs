//! Publisher configuration, loadable from TOML.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use ff_collectors::{Collaborators, CollectorResult, EnvironmentConfig, StaticCount, SystemClock};
use ff_mqtt_channel::{EndpointSettings, OperationTimeouts, ReconnectPolicy};
use serde::Deserialize;

use crate::session::SessionSettings;

/// Top-level configuration for one publish run.
#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    /// Topic the snapshot is published to.
    #[serde(default = "default_topic")]
    pub topic: String,
    /// People count reported in the `pi` section.
    #[serde(default)]
    pub people_count: i64,
    /// Broker endpoint and credentials.
    #[serde(default)]
    pub endpoint: EndpointSettings,
    /// Auto-reconnect backoff.
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    /// Connect, publish and offline-queue limits.
    #[serde(default)]
    pub timeouts: OperationTimeouts,
    /// Weather provider. Defaults to an empty reading.
    #[serde(default)]
    pub weather: EnvironmentConfig,
    /// Traffic provider. Defaults to an empty reading.
    #[serde(default)]
    pub traffic: EnvironmentConfig,
}

fn default_topic() -> String {
    ff_protocol::topics::TELEMETRY.to_string()
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            people_count: 0,
            endpoint: EndpointSettings::default(),
            reconnect: ReconnectPolicy::default(),
            timeouts: OperationTimeouts::default(),
            weather: EnvironmentConfig::default(),
            traffic: EnvironmentConfig::default(),
        }
    }
}

impl PublisherConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            endpoint: self.endpoint.clone(),
            reconnect: self.reconnect.clone(),
            timeouts: self.timeouts.clone(),
            topic: self.topic.clone(),
        }
    }

    /// Production data sources: local clock, the configured people count,
    /// and the weather/traffic providers.
    pub fn collaborators(&self) -> CollectorResult<Collaborators> {
        Ok(Collaborators {
            clock: Arc::new(SystemClock),
            count: Arc::new(StaticCount(self.people_count)),
            weather: self.weather.build("weather")?,
            traffic: self.traffic.build("traffic")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use ff_mqtt_channel::DropBehavior;

    #[test]
    fn empty_config_uses_defaults() {
        let config: PublisherConfig = toml::from_str("").unwrap();
        assert_eq!(config.topic, "sdk/test/Python");
        assert_eq!(config.people_count, 0);
        assert_eq!(config.endpoint.client_id, "basicPubSub");
        assert!(!config.endpoint.use_websocket);
        assert_eq!(config.reconnect.base_delay_secs, 1);
        assert_eq!(config.reconnect.max_delay_secs, 32);
        assert_eq!(config.reconnect.stable_connection_secs, 20);
        assert_eq!(config.timeouts.connect_disconnect_secs, 10);
        assert_eq!(config.timeouts.operation_secs, 5);
        assert_eq!(config.timeouts.offline_queue_depth, -1);
        assert!(config.weather.url.is_none());
    }

    #[test]
    fn deserialize_full_config() {
        let toml = r#"
topic = "footfall/store-12"
people_count = 4

[endpoint]
host = "a1b2c3-ats.iot.eu-west-1.amazonaws.com"
root_ca_path = "/etc/footfall/root-CA.crt"
certificate_path = "/etc/footfall/device.pem.crt"
private_key_path = "/etc/footfall/private.pem.key"
client_id = "store-12"

[reconnect]
base_delay_secs = 2
max_delay_secs = 64

[timeouts]
operation_secs = 8
offline_queue_depth = 100
drop_behavior = "drop_oldest"

[weather]
url = "http://localhost:8080/weather"
timeout_secs = 3

[traffic.values]
congestion = "light"
"#;
        let config: PublisherConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.topic, "footfall/store-12");
        assert_eq!(config.people_count, 4);
        assert_eq!(config.endpoint.client_id, "store-12");
        assert_eq!(config.endpoint.keepalive_secs, 30); // default
        assert_eq!(config.reconnect.base_delay_secs, 2);
        assert_eq!(config.reconnect.stable_connection_secs, 20); // default
        assert_eq!(config.timeouts.operation_secs, 8);
        assert_eq!(config.timeouts.connect_disconnect_secs, 10); // default
        assert_eq!(config.timeouts.drop_behavior, DropBehavior::DropOldest);
        assert_eq!(
            config.weather.url.as_deref(),
            Some("http://localhost:8080/weather")
        );
        assert_eq!(config.weather.timeout_secs, 3);
        assert_eq!(config.traffic.values["congestion"], "light");
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "people_count = 9").unwrap();
        let config = PublisherConfig::from_file(file.path()).unwrap();
        assert_eq!(config.people_count, 9);
    }

    #[test]
    fn from_file_reports_path() {
        let err = PublisherConfig::from_file(Path::new("/nonexistent/footfall.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/footfall.toml"));
    }

    #[test]
    fn from_file_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "people_count = \"many\"").unwrap();
        assert!(PublisherConfig::from_file(file.path()).is_err());
    }

    #[tokio::test]
    async fn collaborators_from_config() {
        let config: PublisherConfig = toml::from_str(
            r#"
people_count = 3

[weather.values]
temp_c = 12
"#,
        )
        .unwrap();
        let collaborators = config.collaborators().unwrap();
        let snapshot = collaborators.snapshot().await.unwrap();
        assert_eq!(snapshot.pi.people_count, 3);
        assert_eq!(snapshot.weather["temp_c"], 12);
        assert!(snapshot.traffic.is_empty());
    }
}
