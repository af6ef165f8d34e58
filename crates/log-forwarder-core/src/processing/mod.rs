// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turns one log object into normalized records.
//!
//! # Pipeline
//!
//! ```text
//!   fetch ──> decompress ──> parse (text | json | json_stream)
//!                                  │
//!                                  v
//!          sinks <── attributes <── truncate <── filters
//! ```
//!
//! Record attributes are merged in this order, later keys overriding
//! earlier ones:
//! 1. Intrinsic metadata (`cloud.provider`, `aws.s3.bucket`, ...)
//! 2. Processing rule annotations
//! 3. Attributes extracted from the object key
//! 4. Forwarding rule annotations

pub mod format;

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::ProcessingError;
use crate::object_source::ObjectSource;
use crate::record::{merge_attributes, NormalizedRecord};
use crate::rules::processing::ProcessingRule;
use crate::sinks::Sink;

pub const CLOUD_PROVIDER: &str = "aws";

/// Per object settings taken from the configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessingOptions {
    /// Longer record contents are truncated to this many bytes.
    pub max_log_size_bytes: usize,
    /// Value of the `log.source.forwarder` attribute.
    pub forwarder_name: String,
}

impl ProcessingOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_log_size_bytes: config.max_log_size_bytes,
            forwarder_name: config.deployment_name.clone(),
        }
    }
}

/// What happened to the records of one object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessingSummary {
    /// Records pushed to the sinks.
    pub records: usize,
    pub dropped_by_filters: usize,
    pub malformed: usize,
}

/// Reads `s3://bucket/key`, parses it with `rule` and pushes every record to
/// every sink in `sinks`, in source order. Sinks are not flushed.
pub async fn process_log_object(
    rule: &ProcessingRule,
    bucket: &str,
    key: &str,
    annotations: &BTreeMap<String, String>,
    sinks: &mut [&mut dyn Sink],
    objects: &dyn ObjectSource,
    options: &ProcessingOptions,
) -> Result<ProcessingSummary, ProcessingError> {
    let raw = objects
        .fetch(bucket, key)
        .await
        .map_err(|source| ProcessingError::Fetch {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        })?;
    debug!("Fetched {} bytes from s3://{}/{}", raw.len(), bucket, key);

    let data = format::decompress(&raw)?;
    let parsed = format::parse_entries(rule, &data)?;
    debug!(
        "Parsed {} entries from s3://{}/{} with processing rule {}",
        parsed.entries.len(),
        bucket,
        key,
        rule.name
    );

    let attributes = record_attributes(rule, bucket, key, annotations, options);
    let mut summary = ProcessingSummary {
        malformed: parsed.malformed,
        ..Default::default()
    };

    for mut content in parsed.entries {
        if !crate::rules::filter::apply_filters(&rule.filters, &mut content) {
            summary.dropped_by_filters += 1;
            continue;
        }
        truncate_on_char_boundary(&mut content, options.max_log_size_bytes);

        let record = NormalizedRecord {
            content,
            attributes: attributes.clone(),
        };
        for sink in sinks.iter_mut() {
            sink.push(&record).await?;
        }
        summary.records += 1;
    }

    Ok(summary)
}

fn record_attributes(
    rule: &ProcessingRule,
    bucket: &str,
    key: &str,
    annotations: &BTreeMap<String, String>,
    options: &ProcessingOptions,
) -> BTreeMap<String, Value> {
    let mut attributes = BTreeMap::new();
    merge_attributes(
        &mut attributes,
        [
            ("cloud.provider", CLOUD_PROVIDER),
            ("aws.s3.bucket", bucket),
            ("aws.s3.key", key),
            ("log.source", rule.source_name.as_str()),
            ("log.source.forwarder", options.forwarder_name.as_str()),
            ("log.processing_rule", rule.name.as_str()),
        ],
    );
    merge_attributes(&mut attributes, rule.annotations.clone());
    merge_attributes(&mut attributes, rule.key_attributes(key));
    merge_attributes(&mut attributes, annotations.clone());
    attributes
}

fn truncate_on_char_boundary(content: &mut String, max_bytes: usize) {
    if content.len() <= max_bytes {
        return;
    }
    let mut boundary = max_bytes;
    while !content.is_char_boundary(boundary) {
        boundary -= 1;
    }
    content.truncate(boundary);
}
