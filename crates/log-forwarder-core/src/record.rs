// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// A single log event as delivered to sinks.
///
/// Serialized flat: `{"content": "...", "aws.s3.bucket": "...", ...}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NormalizedRecord {
    pub content: String,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl NormalizedRecord {
    #[must_use]
    pub fn new(content: String) -> Self {
        Self {
            content,
            attributes: BTreeMap::new(),
        }
    }

    /// Merges `attributes` into the record, overriding existing keys.
    pub fn extend_attributes<I, K, V>(&mut self, attributes: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        merge_attributes(&mut self.attributes, attributes);
    }

    /// JSON encoding used by every sink.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Merges `attributes` into `target`, later keys overriding earlier ones.
/// `content` is reserved for the record body and never merged.
pub fn merge_attributes<I, K, V>(target: &mut BTreeMap<String, Value>, attributes: I)
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    for (key, value) in attributes {
        let key = key.into();
        if key == "content" {
            continue;
        }
        target.insert(key, value.into());
    }
}
