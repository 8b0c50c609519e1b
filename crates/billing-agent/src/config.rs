// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Agent configuration, read from a JSON file.

use billing::s3::S3SinkConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/billing-agent/config.json";
const DEFAULT_QUEUE_CAPACITY: usize = 100_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Metering is disabled when absent.
    #[serde(default)]
    pub billing: Option<BillingConfig>,
    pub inventory_path: PathBuf,
    #[serde(default = "default_inventory_refresh_seconds")]
    pub inventory_refresh_seconds: u64,
    #[serde(default = "default_sample_request_timeout_seconds")]
    pub sample_request_timeout_seconds: u64,
    /// Port serving `/metrics`; 0 disables it.
    #[serde(default)]
    pub metrics_port: u16,
    #[serde(default = "default_shutdown_timeout_seconds")]
    pub shutdown_timeout_seconds: u64,
}

fn default_inventory_refresh_seconds() -> u64 {
    5
}

fn default_sample_request_timeout_seconds() -> u64 {
    1
}

fn default_shutdown_timeout_seconds() -> u64 {
    10
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingConfig {
    pub cpu_metric_name: String,
    pub active_time_metric_name: String,
    pub ingress_bytes_metric_name: String,
    pub egress_bytes_metric_name: String,
    pub collect_every_seconds: u64,
    pub accumulate_every_seconds: u64,
    #[serde(default)]
    pub clients: ClientsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClientsConfig {
    #[serde(default)]
    pub http: Option<HttpClientConfig>,
    #[serde(default)]
    pub s3: Option<S3ClientConfig>,
}

/// Push settings shared by every sink.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushConfig {
    pub push_every_seconds: u64,
    pub push_request_timeout_seconds: u64,
    pub max_batch_size: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl PushConfig {
    #[must_use]
    pub fn push_every(&self) -> Duration {
        Duration::from_secs(self.push_every_seconds)
    }

    #[must_use]
    pub fn push_request_timeout(&self) -> Duration {
        Duration::from_secs(self.push_request_timeout_seconds)
    }

    fn validate(&self, client: &str) -> Result<(), ConfigError> {
        if self.push_every_seconds == 0 {
            return Err(invalid(format!("{client}: pushEverySeconds must be > 0")));
        }
        if self.push_request_timeout_seconds == 0 {
            return Err(invalid(format!(
                "{client}: pushRequestTimeoutSeconds must be > 0"
            )));
        }
        if self.max_batch_size == 0 {
            return Err(invalid(format!("{client}: maxBatchSize must be > 0")));
        }
        if self.queue_capacity == 0 {
            return Err(invalid(format!("{client}: queueCapacity must be > 0")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpClientConfig {
    pub url: String,
    #[serde(flatten)]
    pub push: PushConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct S3ClientConfig {
    #[serde(flatten)]
    pub sink: S3SinkConfig,
    #[serde(flatten)]
    pub push: PushConfig,
}

fn invalid(msg: String) -> ConfigError {
    ConfigError::Invalid(msg)
}

impl AgentConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inventory_refresh_seconds == 0 {
            return Err(invalid("inventoryRefreshSeconds must be > 0".to_string()));
        }
        if self.sample_request_timeout_seconds == 0 {
            return Err(invalid(
                "sampleRequestTimeoutSeconds must be > 0".to_string(),
            ));
        }
        match &self.billing {
            Some(billing) => billing.validate(),
            None => Ok(()),
        }
    }
}

impl BillingConfig {
    #[must_use]
    pub fn collect_every(&self) -> Duration {
        Duration::from_secs(self.collect_every_seconds)
    }

    #[must_use]
    pub fn accumulate_every(&self) -> Duration {
        Duration::from_secs(self.accumulate_every_seconds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, name) in [
            ("cpuMetricName", &self.cpu_metric_name),
            ("activeTimeMetricName", &self.active_time_metric_name),
            ("ingressBytesMetricName", &self.ingress_bytes_metric_name),
            ("egressBytesMetricName", &self.egress_bytes_metric_name),
        ] {
            if name.trim().is_empty() {
                return Err(invalid(format!("field {field:?} cannot be empty")));
            }
        }
        if self.collect_every_seconds == 0 {
            return Err(invalid("collectEverySeconds must be > 0".to_string()));
        }
        if self.accumulate_every_seconds == 0 {
            return Err(invalid("accumulateEverySeconds must be > 0".to_string()));
        }

        if let Some(http) = &self.clients.http {
            if http.url.trim().is_empty() {
                return Err(invalid("http: url cannot be empty".to_string()));
            }
            http.push.validate("http")?;
        }
        if let Some(s3) = &self.clients.s3 {
            if s3.sink.bucket.trim().is_empty() {
                return Err(invalid("s3: bucket cannot be empty".to_string()));
            }
            if s3.sink.region.trim().is_empty() {
                return Err(invalid("s3: region cannot be empty".to_string()));
            }
            s3.push.validate("s3")?;
        }
        Ok(())
    }
}
