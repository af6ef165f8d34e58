// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Destinations for normalized records.
//!
//! Every configured sink is created once at startup and lives in the
//! [`SinkRegistry`]. For each notification the coordinator resets all sinks,
//! resolves the ones named by the matched forwarding rule, pushes records
//! into them and flushes them.

pub mod batcher;
pub mod http;
pub mod stdout;

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{Config, SinkConfig, SinkKind};
use crate::record::NormalizedRecord;

#[derive(Debug, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum SinkError {
    #[error("sink {sink_id}: no API key, set `api_key` or a non-empty `{variable}` variable")]
    MissingApiKey { sink_id: String, variable: String },

    #[error("sink {sink_id}: endpoint answered {status}: {body}")]
    Status {
        sink_id: String,
        status: u16,
        body: String,
    },

    #[error("sink {sink_id}: request failed after {attempts} attempts: {source}")]
    Request {
        sink_id: String,
        attempts: usize,
        #[source]
        source: reqwest::Error,
    },

    #[error("sink {sink_id}: failed to compress payload: {source}")]
    Encode {
        sink_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sink {sink_id}: failed to write records: {source}")]
    Write {
        sink_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A stateful destination. Records are buffered by `push` and delivered by
/// `flush`; `reset` discards anything still buffered.
#[async_trait]
pub trait Sink: Send {
    fn id(&self) -> &str;

    fn reset(&mut self);

    async fn push(&mut self, record: &NormalizedRecord) -> Result<(), SinkError>;

    /// Delivers every buffered record. A no-op when nothing is buffered.
    async fn flush(&mut self) -> Result<(), SinkError>;

    /// Number of records accepted but not yet delivered.
    fn buffered(&self) -> usize;
}

/// All configured sinks, keyed by id.
#[derive(Default)]
pub struct SinkRegistry {
    sinks: BTreeMap<String, Box<dyn Sink>>,
}

impl SinkRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates every sink of the configuration. Fails when an HTTP sink has
    /// no usable API key.
    pub fn from_config(config: &Config) -> Result<Self, SinkError> {
        let client = crate::http::get_client(config);
        let mut registry = Self::new();
        for sink_config in &config.sinks {
            let sink: Box<dyn Sink> = match sink_config.kind {
                SinkKind::Http => Box::new(http::HttpSink::new(
                    sink_config,
                    resolve_api_key(sink_config)?,
                    client.clone(),
                    config,
                )),
                SinkKind::Stdout => Box::new(stdout::StdoutSink::new(&sink_config.id)),
            };
            debug!("Registered {:?} sink {}", sink_config.kind, sink_config.id);
            registry.insert(sink);
        }
        Ok(registry)
    }

    /// Registers `sink`, replacing any sink with the same id.
    pub fn insert(&mut self, sink: Box<dyn Sink>) {
        self.sinks.insert(sink.id().to_string(), sink);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn reset_all(&mut self) {
        for sink in self.sinks.values_mut() {
            sink.reset();
        }
    }

    /// Resolves `ids` to sinks, in the given order. Unknown ids are logged
    /// and skipped, repeated ids resolve once.
    pub fn sinks_for(&mut self, ids: &[String], rule_name: &str, bucket: &str) -> Vec<&mut dyn Sink> {
        let mut available: HashMap<&str, &mut Box<dyn Sink>> = self
            .sinks
            .iter_mut()
            .map(|(id, sink)| (id.as_str(), sink))
            .collect();

        let mut seen = HashSet::new();
        let mut resolved: Vec<&mut dyn Sink> = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            match available.remove(id.as_str()) {
                Some(sink) => resolved.push(&mut **sink),
                None => warn!(
                    "Invalid sink id {} defined on forwarding rule {} in bucket {}",
                    id, rule_name, bucket
                ),
            }
        }
        resolved
    }
}

fn resolve_api_key(sink_config: &SinkConfig) -> Result<String, SinkError> {
    if let Some(api_key) = sink_config.api_key.as_deref().filter(|k| !k.is_empty()) {
        return Ok(api_key.to_string());
    }
    let variable = sink_config
        .api_key_env
        .clone()
        .unwrap_or_else(|| format!("LOG_FORWARDER_SINK_{}_API_KEY", sink_config.id));
    match std::env::var(&variable) {
        Ok(api_key) if !api_key.is_empty() => Ok(api_key),
        _ => Err(SinkError::MissingApiKey {
            sink_id: sink_config.id.clone(),
            variable,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Compression;
    use std::sync::{Arc, Mutex};

    struct CountingSink {
        id: String,
        buffered: usize,
        resets: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl Sink for CountingSink {
        fn id(&self) -> &str {
            &self.id
        }

        fn reset(&mut self) {
            self.buffered = 0;
            *self.resets.lock().unwrap() += 1;
        }

        async fn push(&mut self, _record: &NormalizedRecord) -> Result<(), SinkError> {
            self.buffered += 1;
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), SinkError> {
            self.buffered = 0;
            Ok(())
        }

        fn buffered(&self) -> usize {
            self.buffered
        }
    }

    fn registry(ids: &[&str], resets: &Arc<Mutex<usize>>) -> SinkRegistry {
        let mut registry = SinkRegistry::new();
        for id in ids {
            registry.insert(Box::new(CountingSink {
                id: (*id).to_string(),
                buffered: 0,
                resets: Arc::clone(resets),
            }));
        }
        registry
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_sinks_for_keeps_requested_order() {
        let resets = Arc::new(Mutex::new(0));
        let mut registry = registry(&["1", "2", "3"], &resets);
        let sinks = registry.sinks_for(&ids(&["3", "1"]), "rule", "bucket");
        let resolved: Vec<&str> = sinks.iter().map(|s| s.id()).collect();
        assert_eq!(resolved, vec!["3", "1"]);
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_sinks_for_skips_unknown_and_duplicates() {
        let resets = Arc::new(Mutex::new(0));
        let mut registry = registry(&["1"], &resets);
        let sinks = registry.sinks_for(&ids(&["9", "1", "1"]), "rule-a", "bucket-a");
        assert_eq!(sinks.len(), 1);
        assert!(logs_contain("Invalid sink id 9"));
    }

    #[test]
    fn test_sinks_for_all_unknown() {
        let resets = Arc::new(Mutex::new(0));
        let mut registry = registry(&["1"], &resets);
        assert!(registry.sinks_for(&ids(&["2"]), "rule", "bucket").is_empty());
    }

    #[tokio::test]
    async fn test_reset_all_clears_every_sink() {
        let resets = Arc::new(Mutex::new(0));
        let mut registry = registry(&["1", "2"], &resets);
        let record = NormalizedRecord::new("x".to_string());
        for sink in registry.sinks_for(&ids(&["1", "2"]), "rule", "bucket") {
            sink.push(&record).await.unwrap();
        }

        registry.reset_all();
        assert_eq!(*resets.lock().unwrap(), 2);
        for sink in registry.sinks_for(&ids(&["1", "2"]), "rule", "bucket") {
            assert_eq!(sink.buffered(), 0);
        }
    }

    #[test]
    fn test_from_config_requires_api_key() {
        let config = Config {
            sinks: vec![SinkConfig {
                id: "1".to_string(),
                kind: SinkKind::Http,
                url: "https://logs.example.com/ingest".to_string(),
                api_key: None,
                api_key_env: Some("LOG_FORWARDER_TEST_UNSET_API_KEY".to_string()),
                compression: Compression::None,
            }],
            ..Default::default()
        };
        assert!(matches!(
            SinkRegistry::from_config(&config),
            Err(SinkError::MissingApiKey { .. })
        ));
    }

    #[test]
    fn test_from_config_builds_every_sink() {
        let config = Config {
            sinks: vec![
                SinkConfig {
                    id: "1".to_string(),
                    kind: SinkKind::Http,
                    url: "https://logs.example.com/ingest".to_string(),
                    api_key: Some("secret".to_string()),
                    api_key_env: None,
                    compression: Compression::Gzip,
                },
                SinkConfig {
                    id: "local".to_string(),
                    kind: SinkKind::Stdout,
                    url: String::new(),
                    api_key: None,
                    api_key_env: None,
                    compression: Compression::None,
                },
            ],
            ..Default::default()
        };
        let registry = SinkRegistry::from_config(&config).unwrap();
        assert_eq!(registry.len(), 2);
    }
}
