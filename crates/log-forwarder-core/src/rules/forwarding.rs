// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Forwarding rules decide whether an object is forwarded at all, to which
//! sinks, and under which log source.
//!
//! Rules live either in a single YAML file, or in a directory with one file
//! per bucket (`<bucket>.yaml`), in which case `bucket` may be omitted:
//!
//! ```yaml
//! forwarding_rules:
//!   - name: cloudtrail
//!     bucket: audit-logs
//!     prefix: 'AWSLogs/\d{12}/CloudTrail/'
//!     source: aws
//!     source_name: cloudtrail
//!     sinks: ["1", "2"]
//!     annotations:
//!       team: security
//!   - name: everything-else
//!     bucket: audit-logs
//!     source: generic
//!     source_name: generic_text
//!     sinks: ["1"]
//!     priority: 100
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::rules::{compile_key_pattern, read_document, RuleError, Source};

/// A compiled forwarding rule.
#[derive(Clone, Debug)]
pub struct ForwardingRule {
    pub name: String,
    pub bucket: String,
    /// Matched against the start of the object key.
    pub prefix: regex::Regex,
    pub source: Source,
    pub source_name: String,
    /// Sink ids, in the order deliveries are attempted.
    pub sinks: Vec<String>,
    /// User annotations attached to every forwarded record.
    pub annotations: BTreeMap<String, String>,
    /// Explicit priority. Lower values are tried first, and any explicit
    /// priority is tried before rules without one.
    pub priority: Option<i64>,
}

impl ForwardingRule {
    pub fn new(
        name: &str,
        bucket: &str,
        prefix: &str,
        source: Source,
        source_name: &str,
        sinks: Vec<String>,
    ) -> Result<ForwardingRule, RuleError> {
        Ok(ForwardingRule {
            name: name.to_string(),
            bucket: bucket.to_string(),
            prefix: compile_key_pattern(name, prefix)?,
            source,
            source_name: source_name.to_string(),
            sinks,
            annotations: BTreeMap::new(),
            priority: None,
        })
    }

    #[must_use]
    pub fn with_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.annotations = annotations;
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn matches(&self, bucket: &str, key: &str) -> bool {
        self.bucket == bucket && self.prefix.is_match(key)
    }
}

#[derive(Debug, Deserialize)]
struct ForwardingRulesDocument {
    #[serde(default)]
    forwarding_rules: Vec<ForwardingRuleConfig>,
}

#[derive(Debug, Deserialize)]
struct ForwardingRuleConfig {
    name: String,
    bucket: Option<String>,
    #[serde(default)]
    prefix: String,
    source: Source,
    source_name: String,
    #[serde(default, deserialize_with = "deserialize_sink_ids")]
    sinks: Vec<String>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
    priority: Option<i64>,
}

impl ForwardingRuleConfig {
    fn compile(self, default_bucket: Option<&str>) -> Result<ForwardingRule, RuleError> {
        let Some(bucket) = self.bucket.or_else(|| default_bucket.map(str::to_string)) else {
            return Err(RuleError::MissingBucket { rule: self.name });
        };

        Ok(ForwardingRule {
            prefix: compile_key_pattern(&self.name, &self.prefix)?,
            name: self.name,
            bucket,
            source: self.source,
            source_name: self.source_name,
            sinks: self.sinks,
            annotations: self.annotations,
            priority: self.priority,
        })
    }
}

fn deserialize_sink_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Vec<JsonValue> = Deserialize::deserialize(deserializer)?;
    values
        .into_iter()
        .map(|value| match value {
            JsonValue::String(s) => Ok(s),
            JsonValue::Number(n) => Ok(n.to_string()),
            other => Err(D::Error::custom(format!("invalid sink id {other}"))),
        })
        .collect()
}

/// Loads forwarding rules from a YAML file, or from every `*.yaml`/`*.yml`
/// file of a directory in file name order. Rules of a directory file default
/// to the bucket named after the file stem.
pub fn load(path: &Path) -> Result<Vec<ForwardingRule>, RuleError> {
    if !path.is_dir() {
        return load_file(path, None);
    }

    let entries = std::fs::read_dir(path).map_err(|source| RuleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| RuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file = entry.path();
        let is_yaml = file
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if is_yaml && file.is_file() {
            files.push(file);
        }
    }
    files.sort();

    let mut rules = Vec::new();
    for file in files {
        let bucket = file
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string);
        rules.extend(load_file(&file, bucket.as_deref())?);
    }
    Ok(rules)
}

fn load_file(path: &Path, default_bucket: Option<&str>) -> Result<Vec<ForwardingRule>, RuleError> {
    let document: ForwardingRulesDocument = read_document(path)?;
    let rules = document
        .forwarding_rules
        .into_iter()
        .map(|rule| rule.compile(default_bucket))
        .collect::<Result<Vec<_>, _>>()?;
    debug!("Loaded {} forwarding rules from {}", rules.len(), path.display());
    Ok(rules)
}

/// Returns the rule an object is forwarded with, if any.
///
/// Candidates are ordered by explicit priority (ascending), then rules
/// without a priority; equal priorities keep declaration order. The first
/// candidate whose bucket and prefix match wins.
#[must_use]
pub fn get_matching_rule<'a>(
    bucket: &str,
    key: &str,
    rules: &'a [ForwardingRule],
) -> Option<&'a ForwardingRule> {
    rules
        .iter()
        .enumerate()
        .filter(|(_, rule)| rule.matches(bucket, key))
        .min_by_key(|(index, rule)| (rule.priority.is_none(), rule.priority.unwrap_or(0), *index))
        .map(|(_, rule)| rule)
}
