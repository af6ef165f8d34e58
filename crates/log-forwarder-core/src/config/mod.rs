// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Forwarder configuration.
//!
//! Configuration is assembled once at startup from, in increasing priority:
//! 1. Defaults
//! 2. A YAML file (`log-forwarder.yaml`, or the path in `LOG_FORWARDER_CONFIG_FILE`)
//! 3. Environment variables prefixed with `LOG_FORWARDER_`
//!
//! # Example
//!
//! ```yaml
//! log_level: info
//! deployment_name: prod-logs
//! forwarding_rules_path: /etc/log-forwarder/forwarding-rules
//! processing_rules_path: /etc/log-forwarder/processing-rules.yaml
//! sinks:
//!   - id: "1"
//!     type: http
//!     url: https://logs.example.com/api/v2/logs/ingest
//!     api_key_env: LOGS_API_TOKEN
//!     compression: gzip
//! ```

pub mod log_level;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

use crate::config::log_level::LogLevel;

pub const ENV_PREFIX: &str = "LOG_FORWARDER_";
pub const CONFIG_FILE_ENV: &str = "LOG_FORWARDER_CONFIG_FILE";
pub const DEFAULT_CONFIG_FILE: &str = "log-forwarder.yaml";

#[derive(Debug, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Wire type of a sink.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Batched JSON POSTs to a log ingestion endpoint.
    #[default]
    Http,
    /// One JSON line per record on standard output.
    Stdout,
}

/// Request body compression used by HTTP sinks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zstd,
}

/// One configured destination.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[allow(clippy::module_name_repetitions)]
pub struct SinkConfig {
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: SinkKind,
    #[serde(default)]
    pub url: String,
    /// Literal API token. Takes precedence over `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Name of the environment variable holding the API token.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub compression: Compression,
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
#[allow(clippy::module_name_repetitions)]
pub struct Config {
    pub log_level: LogLevel,
    /// Dimension attached to every emitted metric.
    pub deployment_name: String,
    /// A YAML file, or a directory of per-bucket YAML files.
    pub forwarding_rules_path: PathBuf,
    /// User processing rules, loaded after the built-in ones.
    pub processing_rules_path: Option<PathBuf>,
    #[serde(deserialize_with = "deserialize_sinks")]
    pub sinks: Vec<SinkConfig>,
    /// Per request timeout of sink deliveries, in seconds.
    pub flush_timeout: u64,
    pub flush_retry_count: usize,
    /// Timeout of a single object download, in seconds.
    pub fetch_timeout: u64,
    pub max_batch_entries: usize,
    pub max_content_size_bytes: usize,
    pub max_log_size_bytes: usize,
    pub https_proxy: Option<String>,
    /// Serve objects from `<root>/<bucket>/<key>` instead of S3.
    pub object_store_root: Option<PathBuf>,
    pub s3_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            deployment_name: "default".to_string(),
            forwarding_rules_path: PathBuf::from("config/forwarding-rules"),
            processing_rules_path: None,
            sinks: Vec::new(),
            flush_timeout: 10,
            flush_retry_count: 3,
            fetch_timeout: 30,
            max_batch_entries: 5_000,
            max_content_size_bytes: 5 * 1_024 * 1_024,
            max_log_size_bytes: 64 * 1_024,
            https_proxy: None,
            object_store_root: None,
            s3_endpoint: None,
        }
    }
}

impl Config {
    /// Loads the configuration from the file named by `LOG_FORWARDER_CONFIG_FILE`
    /// (or [`DEFAULT_CONFIG_FILE`]) and the environment.
    pub fn load() -> Result<Config, ConfigError> {
        let path = std::env::var(CONFIG_FILE_ENV)
            .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from);
        Self::load_from(&path)
    }

    /// Loads the configuration from `path` and the environment. A missing
    /// file is not an error: defaults and environment variables still apply.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let mut config: Config = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        if config.https_proxy.is_none() {
            if let Ok(https_proxy) = std::env::var("HTTPS_PROXY") {
                config.https_proxy = Some(https_proxy);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.forwarding_rules_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "forwarding_rules_path cannot be empty".to_string(),
            ));
        }

        if self.max_batch_entries == 0
            || self.max_content_size_bytes == 0
            || self.max_log_size_bytes == 0
        {
            return Err(ConfigError::Invalid(
                "batch and log size limits must be greater than 0".to_string(),
            ));
        }

        if self.flush_timeout == 0 || self.fetch_timeout == 0 {
            return Err(ConfigError::Invalid(
                "flush_timeout and fetch_timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_log_size_bytes > self.max_content_size_bytes {
            return Err(ConfigError::Invalid(format!(
                "max_log_size_bytes ({}) cannot exceed max_content_size_bytes ({})",
                self.max_log_size_bytes, self.max_content_size_bytes
            )));
        }

        if self.sinks.is_empty() {
            return Err(ConfigError::Invalid("no sinks configured".to_string()));
        }

        let mut ids = HashSet::new();
        for sink in &self.sinks {
            if !ids.insert(sink.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "sink id '{}' is defined more than once",
                    sink.id
                )));
            }
            if sink.kind == SinkKind::Http && sink.url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "sink '{}' has no url",
                    sink.id
                )));
            }
        }

        Ok(())
    }
}

/// Accepts sinks either as a list (YAML) or as a JSON encoded string
/// (environment variable). Unlike most settings an invalid sink is fatal:
/// a silently missing destination would turn into skipped log files.
pub fn deserialize_sinks<'de, D>(deserializer: D) -> Result<Vec<SinkConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: JsonValue = Deserialize::deserialize(deserializer)?;

    match value {
        JsonValue::String(s) if s.trim().is_empty() => Ok(Vec::new()),
        JsonValue::String(s) => serde_json::from_str(&s)
            .map_err(|e| D::Error::custom(format!("failed to parse sinks: {e}"))),
        JsonValue::Array(a) => a
            .into_iter()
            .map(|v| {
                serde_json::from_value(v)
                    .map_err(|e| D::Error::custom(format!("failed to parse sink: {e}")))
            })
            .collect(),
        JsonValue::Null => Ok(Vec::new()),
        other => Err(D::Error::custom(format!(
            "expected a list of sinks, got {other}"
        ))),
    }
}

pub fn deserialize_string_or_int<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    match value {
        JsonValue::String(s) => Ok(s),
        JsonValue::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected a string or an integer, got {other}"
        ))),
    }
}
