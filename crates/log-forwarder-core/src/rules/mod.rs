// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Forwarding and processing rules.
//!
//! Both rule sets are loaded once at startup into a [`RuleStore`] that is
//! never mutated afterwards. Any problem while loading is fatal: the
//! forwarder cannot make a single correct decision without a settled rule set.

pub mod filter;
pub mod forwarding;
pub mod processing;

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Format, Yaml},
    Figment,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::rules::forwarding::ForwardingRule;
use crate::rules::processing::ProcessingRule;

/// Family of a log source. Ties a forwarding rule to the processing rules
/// it may use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Aws,
    Generic,
    Custom,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Source::Aws => "aws",
            Source::Generic => "generic",
            Source::Custom => "custom",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("rule '{rule}' has an invalid pattern: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("forwarding rule '{rule}' does not name a bucket")]
    MissingBucket { rule: String },

    #[error("rule '{name}' is defined more than once in {scope}")]
    DuplicateName { scope: String, name: String },
}

/// Immutable rule set shared by every notification of the process.
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    forwarding: Vec<ForwardingRule>,
    processing: Vec<ProcessingRule>,
}

impl RuleStore {
    /// Loads forwarding rules from `config.forwarding_rules_path` and the
    /// built-in processing rules followed by the optional user ones.
    pub fn load(config: &Config) -> Result<RuleStore, RuleError> {
        let forwarding = forwarding::load(&config.forwarding_rules_path)?;

        let mut processing = processing::builtin_rules()?;
        if let Some(path) = &config.processing_rules_path {
            processing.extend(processing::load(path)?);
        }

        let store = RuleStore::from_rules(forwarding, processing)?;
        info!(
            "Loaded {} forwarding rules and {} processing rules",
            store.forwarding.len(),
            store.processing.len()
        );
        Ok(store)
    }

    /// Builds a store from already compiled rules, enforcing name uniqueness.
    pub fn from_rules(
        forwarding: Vec<ForwardingRule>,
        processing: Vec<ProcessingRule>,
    ) -> Result<RuleStore, RuleError> {
        let mut seen = HashSet::new();
        for rule in &forwarding {
            if !seen.insert(rule.name.as_str()) {
                return Err(RuleError::DuplicateName {
                    scope: "forwarding rules".to_string(),
                    name: rule.name.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        for rule in &processing {
            if !seen.insert((rule.source, rule.name.as_str())) {
                return Err(RuleError::DuplicateName {
                    scope: format!("{} processing rules", rule.source),
                    name: rule.name.clone(),
                });
            }
        }

        Ok(RuleStore {
            forwarding,
            processing,
        })
    }

    #[must_use]
    pub fn forwarding_rules(&self) -> &[ForwardingRule] {
        &self.forwarding
    }

    #[must_use]
    pub fn processing_rules(&self) -> &[ProcessingRule] {
        &self.processing
    }

    #[must_use]
    pub fn matching_forwarding_rule(&self, bucket: &str, key: &str) -> Option<&ForwardingRule> {
        forwarding::get_matching_rule(bucket, key, &self.forwarding)
    }

    #[must_use]
    pub fn processing_rule_for(
        &self,
        forwarding_rule: &ForwardingRule,
        key: &str,
    ) -> Option<&ProcessingRule> {
        processing::lookup(
            forwarding_rule.source,
            &forwarding_rule.source_name,
            &self.processing,
            key,
        )
    }
}

/// Reads a YAML rules document from disk.
pub(crate) fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, RuleError> {
    debug!("Reading rules from {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(&content, &path.display().to_string())
}

pub(crate) fn parse_document<T: DeserializeOwned>(content: &str, origin: &str) -> Result<T, RuleError> {
    Figment::from(Yaml::string(content))
        .extract()
        .map_err(|e| RuleError::Parse {
            origin: origin.to_string(),
            message: e.to_string(),
        })
}

/// Compiles a pattern that must match at the start of an object key.
pub(crate) fn compile_key_pattern(rule: &str, pattern: &str) -> Result<regex::Regex, RuleError> {
    regex::Regex::new(&format!("^(?:{pattern})")).map_err(|source| RuleError::InvalidPattern {
        rule: rule.to_string(),
        source,
    })
}
