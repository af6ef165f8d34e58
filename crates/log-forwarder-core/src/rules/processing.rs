// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Processing rules describe how the objects of one log source are parsed.
//!
//! A forwarding rule names a `(source, source_name)` pair; among the
//! processing rules registered for that pair, the ones whose
//! `known_key_path_pattern` matches the start of the object key are
//! candidates. The most specific candidate wins, where specificity is the
//! length of the pattern text; equally specific candidates keep declaration
//! order (built-in rules are declared before user rules).
//!
//! ```yaml
//! processing_rules:
//!   - name: nginx-access
//!     source: custom
//!     source_name: nginx
//!     known_key_path_pattern: 'nginx/access/'
//!     log_format: text
//!     skip_header_lines: 0
//!     annotations:
//!       service: frontend
//!     attribute_extraction_from_key_name: 'nginx/access/(?P<host.name>[^/]+)/'
//!     filters:
//!       - type: exclude_at_match
//!         name: health
//!         pattern: 'GET /health'
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::rules::filter::{Filter, FilterConfig};
use crate::rules::{compile_key_pattern, parse_document, read_document, RuleError, Source};

const BUILTIN_RULES: &str = include_str!("../../rules/processing_rules.yaml");

/// Layout of the records inside an object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One record per line.
    #[default]
    Text,
    /// A single JSON document, optionally holding the records in an array.
    Json,
    /// One JSON value per line.
    JsonStream,
}

#[derive(Clone, Debug)]
pub struct ProcessingRule {
    pub name: String,
    pub source: Source,
    pub source_name: String,
    pub known_key_path_pattern: regex::Regex,
    pattern_text: String,
    pub log_format: LogFormat,
    /// JSON pointer to the array of records of a `json` document.
    pub log_entries_key: Option<String>,
    pub skip_header_lines: usize,
    pub filters: Vec<Filter>,
    pub annotations: BTreeMap<String, String>,
    /// Named groups of this pattern become record attributes.
    pub attribute_extraction_from_key_name: Option<regex::Regex>,
}

impl ProcessingRule {
    pub fn new(
        name: &str,
        source: Source,
        source_name: &str,
        known_key_path_pattern: &str,
        log_format: LogFormat,
    ) -> Result<ProcessingRule, RuleError> {
        Ok(ProcessingRule {
            name: name.to_string(),
            source,
            source_name: source_name.to_string(),
            known_key_path_pattern: compile_key_pattern(name, known_key_path_pattern)?,
            pattern_text: known_key_path_pattern.to_string(),
            log_format,
            log_entries_key: None,
            skip_header_lines: 0,
            filters: Vec::new(),
            annotations: BTreeMap::new(),
            attribute_extraction_from_key_name: None,
        })
    }

    #[must_use]
    pub fn with_log_entries_key(mut self, key: &str) -> Self {
        self.log_entries_key = Some(json_pointer(key));
        self
    }

    #[must_use]
    pub fn with_skip_header_lines(mut self, lines: usize) -> Self {
        self.skip_header_lines = lines;
        self
    }

    #[must_use]
    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    #[must_use]
    pub fn with_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.annotations = annotations;
        self
    }

    #[must_use]
    pub fn matches_key(&self, key: &str) -> bool {
        self.known_key_path_pattern.is_match(key)
    }

    /// Length of the key pattern; the longer pattern is the more specific one.
    #[must_use]
    pub fn specificity(&self) -> usize {
        self.pattern_text.len()
    }

    /// Attributes captured from the object key by named groups.
    #[must_use]
    pub fn key_attributes(&self, key: &str) -> BTreeMap<String, String> {
        let mut attributes = BTreeMap::new();
        let Some(regex) = &self.attribute_extraction_from_key_name else {
            return attributes;
        };
        let Some(captures) = regex.captures(key) else {
            return attributes;
        };
        for name in regex.capture_names().flatten() {
            if let Some(value) = captures.name(name) {
                attributes.insert(name.to_string(), value.as_str().to_string());
            }
        }
        attributes
    }
}

#[derive(Debug, Deserialize)]
struct ProcessingRulesDocument {
    #[serde(default)]
    processing_rules: Vec<ProcessingRuleConfig>,
}

#[derive(Debug, Deserialize)]
struct ProcessingRuleConfig {
    name: String,
    source: Source,
    source_name: Option<String>,
    #[serde(default)]
    known_key_path_pattern: String,
    #[serde(default)]
    log_format: LogFormat,
    log_entries_key: Option<String>,
    #[serde(default)]
    skip_header_lines: usize,
    #[serde(default)]
    filters: Vec<FilterConfig>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
    attribute_extraction_from_key_name: Option<String>,
}

impl ProcessingRuleConfig {
    fn compile(self) -> Result<ProcessingRule, RuleError> {
        let filters = self
            .filters
            .iter()
            .map(|filter| {
                Filter::compile(filter).map_err(|source| RuleError::InvalidPattern {
                    rule: format!("{}/{}", self.name, filter.name),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let attribute_extraction_from_key_name = self
            .attribute_extraction_from_key_name
            .as_deref()
            .map(regex::Regex::new)
            .transpose()
            .map_err(|source| RuleError::InvalidPattern {
                rule: self.name.clone(),
                source,
            })?;

        Ok(ProcessingRule {
            known_key_path_pattern: compile_key_pattern(&self.name, &self.known_key_path_pattern)?,
            pattern_text: self.known_key_path_pattern,
            source_name: self.source_name.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            source: self.source,
            log_format: self.log_format,
            log_entries_key: self.log_entries_key.as_deref().map(json_pointer),
            skip_header_lines: self.skip_header_lines,
            filters,
            annotations: self.annotations,
            attribute_extraction_from_key_name,
        })
    }
}

/// Accepts both a bare top level key (`Records`) and a JSON pointer (`/a/b`).
fn json_pointer(key: &str) -> String {
    if key.starts_with('/') {
        key.to_string()
    } else {
        format!("/{key}")
    }
}

fn compile_document(document: ProcessingRulesDocument) -> Result<Vec<ProcessingRule>, RuleError> {
    document
        .processing_rules
        .into_iter()
        .map(ProcessingRuleConfig::compile)
        .collect()
}

/// Rules shipped with the forwarder for well known AWS and generic formats.
pub fn builtin_rules() -> Result<Vec<ProcessingRule>, RuleError> {
    compile_document(parse_document(BUILTIN_RULES, "built-in processing rules")?)
}

/// Loads user processing rules from a YAML file.
pub fn load(path: &Path) -> Result<Vec<ProcessingRule>, RuleError> {
    let rules = compile_document(read_document(path)?)?;
    debug!("Loaded {} processing rules from {}", rules.len(), path.display());
    Ok(rules)
}

/// Returns the processing rule an object of `(source, source_name)` is
/// parsed with, or `None` when no rule covers the key.
#[must_use]
pub fn lookup<'a>(
    source: Source,
    source_name: &str,
    rules: &'a [ProcessingRule],
    key: &str,
) -> Option<&'a ProcessingRule> {
    rules
        .iter()
        .enumerate()
        .filter(|(_, rule)| {
            rule.source == source && rule.source_name == source_name && rule.matches_key(key)
        })
        .max_by(|(index_a, a), (index_b, b)| {
            a.specificity()
                .cmp(&b.specificity())
                .then_with(|| index_b.cmp(index_a))
        })
        .map(|(_, rule)| rule)
}
