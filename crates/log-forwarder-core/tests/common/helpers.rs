// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use std::sync::Arc;
use std::time::Duration;

use log_forwarder_core::object_source::{ObjectSource, StoreObjectSource};
use log_forwarder_core::processing::ProcessingOptions;
use log_forwarder_core::rules::forwarding::ForwardingRule;
use log_forwarder_core::rules::processing::ProcessingRule;
use log_forwarder_core::rules::RuleStore;
use log_forwarder_core::sinks::{Sink, SinkRegistry};
use log_forwarder_core::{BatchCoordinator, NotificationBatch, RawMessage};
use object_store::memory::InMemory;
use object_store::{ObjectStore, PutPayload};

pub const BUCKET: &str = "app-logs";

/// Body of an object-created notification for `s3://bucket/key`.
pub fn notification_body(bucket: &str, key: &str) -> String {
    serde_json::json!({
        "version": "0",
        "detail-type": "Object Created",
        "source": "aws.s3",
        "detail": {
            "bucket": {"name": bucket},
            "object": {"key": key, "size": 1024},
            "requester": "123456789012"
        }
    })
    .to_string()
}

pub fn batch(messages: &[(&str, &str)]) -> NotificationBatch {
    NotificationBatch {
        records: messages
            .iter()
            .map(|(id, body)| RawMessage::new(id, body))
            .collect(),
    }
}

/// Object source serving `(bucket, key, content)` triples from memory.
pub async fn objects(objects: &[(&str, &str, Vec<u8>)]) -> Arc<dyn ObjectSource> {
    let store = Arc::new(InMemory::new());
    for (bucket, key, content) in objects {
        store
            .put(
                &StoreObjectSource::location(bucket, key),
                PutPayload::from(content.clone()),
            )
            .await
            .unwrap();
    }
    Arc::new(StoreObjectSource::new(store, Duration::from_secs(5)))
}

pub fn options() -> ProcessingOptions {
    ProcessingOptions {
        max_log_size_bytes: 64 * 1_024,
        forwarder_name: "integration-tests".to_string(),
    }
}

pub fn sink_ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(ToString::to_string).collect()
}

pub fn coordinator(
    forwarding: Vec<ForwardingRule>,
    processing: Vec<ProcessingRule>,
    sinks: Vec<Box<dyn Sink>>,
    objects: Arc<dyn ObjectSource>,
) -> BatchCoordinator {
    let rules = Arc::new(RuleStore::from_rules(forwarding, processing).unwrap());
    let mut registry = SinkRegistry::new();
    for sink in sinks {
        registry.insert(sink);
    }
    BatchCoordinator::new(rules, registry, objects, options())
}
