// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::ConfigError;
use crate::object_source::FetchError;
use crate::rules::RuleError;
use crate::sinks::SinkError;

/// Errors that prevent the forwarder from starting. Any of these aborts the
/// process before a single notification is looked at.
#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to load rules: {0}")]
    Rules(#[from] RuleError),

    #[error("Failed to build sink registry: {0}")]
    Sinks(#[from] SinkError),

    #[error("Failed to create object source: {0}")]
    ObjectSource(#[from] FetchError),
}

/// Body of a notification that could not be decoded. The notification is
/// dropped and never retried.
#[derive(Debug, thiserror::Error)]
#[error("notification {message_id} has an undecodable body: {source}")]
pub struct EnvelopeError {
    pub message_id: String,
    #[source]
    pub source: serde_json::Error,
}

/// Failure while turning a single log object into records. Recorded as a
/// batch item failure so the upstream source redelivers the notification.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("failed to fetch s3://{bucket}/{key}: {source}")]
    Fetch {
        bucket: String,
        key: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to decompress object: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("failed to parse json document: {0}")]
    Json(#[source] serde_json::Error),

    #[error("log entries key {pointer} does not point to an array")]
    LogEntriesNotArray { pointer: String },

    #[error(transparent)]
    Sink(#[from] SinkError),
}
