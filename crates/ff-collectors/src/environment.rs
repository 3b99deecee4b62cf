//! Weather and traffic providers.
//!
//! Both return an opaque JSON object that is embedded in the snapshot as-is.
//! A provider is either an HTTP endpoint returning a JSON object or a fixed
//! map taken from configuration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ff_protocol::EnvironmentReading;
use serde::Deserialize;

use crate::error::{CollectorError, CollectorResult};

/// A provider of one environmental reading.
#[async_trait]
pub trait EnvironmentSource: Send + Sync {
    /// Short name used in logs and errors (`weather`, `traffic`).
    fn name(&self) -> &str;

    async fn fetch(&self) -> CollectorResult<EnvironmentReading>;
}

/// Provider configuration as it appears in the `[weather]` and `[traffic]`
/// tables of the publisher config.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    /// HTTP endpoint returning a JSON object. When unset, `values` is used.
    #[serde(default)]
    pub url: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Fixed reading used when no URL is configured.
    #[serde(default)]
    pub values: EnvironmentReading,
}

fn default_timeout_secs() -> u64 {
    5
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_timeout_secs(),
            values: EnvironmentReading::new(),
        }
    }
}

impl EnvironmentConfig {
    /// Build the provider described by this config.
    pub fn build(&self, name: &str) -> CollectorResult<Arc<dyn EnvironmentSource>> {
        match &self.url {
            Some(url) => Ok(Arc::new(HttpJsonSource::new(
                name,
                url,
                Duration::from_secs(self.timeout_secs),
            )?)),
            None => Ok(Arc::new(StaticSource::new(name, self.values.clone()))),
        }
    }
}

/// Fetches a JSON object over HTTP GET.
pub struct HttpJsonSource {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpJsonSource {
    pub fn new(name: &str, url: &str, timeout: Duration) -> CollectorResult<Self> {
        if timeout.is_zero() {
            return Err(CollectorError::Configuration(format!(
                "{name}: timeout must be greater than zero"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollectorError::Configuration(format!("{name}: {e}")))?;
        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl EnvironmentSource for HttpJsonSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> CollectorResult<EnvironmentReading> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| CollectorError::Request {
                name: self.name.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(source = %self.name, %status, "provider returned non-200");
            return Err(CollectorError::Status {
                name: self.name.clone(),
                status: status.as_u16(),
            });
        }

        let body: serde_json::Value =
            response.json().await.map_err(|e| CollectorError::Format {
                name: self.name.clone(),
                message: e.to_string(),
            })?;

        match body {
            serde_json::Value::Object(map) => {
                tracing::debug!(source = %self.name, keys = map.len(), "reading fetched");
                Ok(map)
            }
            other => Err(CollectorError::Format {
                name: self.name.clone(),
                message: format!("expected a JSON object, got {other}"),
            }),
        }
    }
}

/// Returns the same reading every time.
#[derive(Debug, Clone)]
pub struct StaticSource {
    name: String,
    values: EnvironmentReading,
}

impl StaticSource {
    pub fn new(name: &str, values: EnvironmentReading) -> Self {
        Self {
            name: name.to_string(),
            values,
        }
    }
}

#[async_trait]
impl EnvironmentSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> CollectorResult<EnvironmentReading> {
        Ok(self.values.clone())
    }
}
