// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch coordinator.
//!
//! Notifications of a batch are handled strictly one after the other. Each
//! one ends in exactly one [`Outcome`]:
//!
//! ```text
//!   Received ─> EnvelopeParsed ─> RuleMatched ─> ProcessingRuleResolved
//!      │              │                │                   │
//!      v              v                v                   v
//!   Deferred   DroppedMalformed  DroppedNoFwdRule  SkippedNoProcessingRule
//!
//!   ─> SinksResolved ─> Processed ─> Flushed (Forwarded)
//!           │               │           │
//!           v               v           v
//!   SkippedNoValidSinks   Failed      Failed
//! ```
//!
//! Only `Failed` and `Deferred` notifications are reported back as batch
//! item failures; everything else is acknowledged.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::error::ProcessingError;
use crate::metrics::ForwarderMetrics;
use crate::notification::{BatchResponse, Notification, NotificationBatch, RawMessage};
use crate::object_source::ObjectSource;
use crate::processing::{process_log_object, ProcessingOptions};
use crate::rules::RuleStore;
use crate::sinks::SinkRegistry;

#[derive(Debug)]
pub enum Outcome {
    /// Every record reached every resolved sink.
    Forwarded { records: usize },
    DroppedMalformedEnvelope,
    DroppedNoForwardingRule,
    SkippedNoProcessingRule,
    SkippedNoValidSinks,
    Failed(ProcessingError),
    /// Not attempted because the batch was cancelled.
    Deferred,
}

impl Outcome {
    #[must_use]
    pub fn is_batch_item_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_) | Outcome::Deferred)
    }
}

/// Result of one batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Message id and outcome of every notification, in batch order.
    pub outcomes: Vec<(String, Outcome)>,
    pub response: BatchResponse,
    pub metrics: ForwarderMetrics,
}

pub struct BatchCoordinator {
    rules: Arc<RuleStore>,
    sinks: SinkRegistry,
    objects: Arc<dyn ObjectSource>,
    options: ProcessingOptions,
}

impl BatchCoordinator {
    #[must_use]
    pub fn new(
        rules: Arc<RuleStore>,
        sinks: SinkRegistry,
        objects: Arc<dyn ObjectSource>,
        options: ProcessingOptions,
    ) -> Self {
        Self {
            rules,
            sinks,
            objects,
            options,
        }
    }

    /// Processes every notification of `batch` and returns the messages to
    /// redeliver. Once `cancel` fires, notifications not yet started are
    /// deferred; the one in progress runs to completion.
    pub async fn process_batch(
        &mut self,
        batch: &NotificationBatch,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let mut report = BatchReport::default();

        for message in &batch.records {
            let outcome = if cancel.is_cancelled() {
                info!(
                    "Deferring message {}, batch processing was cancelled",
                    message.message_id
                );
                Outcome::Deferred
            } else {
                self.sinks.reset_all();
                let span = info_span!("notification", message_id = %message.message_id);
                self.process_notification(message).instrument(span).await
            };

            if outcome.is_batch_item_failure() {
                report.response.push(&message.message_id);
            }
            report.metrics.record(&outcome);
            report.outcomes.push((message.message_id.clone(), outcome));
        }

        debug!(
            "Batch of {} messages done, {} failures",
            batch.records.len(),
            report.response.batch_item_failures.len()
        );
        report.metrics.emit(&self.options.forwarder_name);
        report
    }

    async fn process_notification(&mut self, message: &RawMessage) -> Outcome {
        let notification = match Notification::from_message(message) {
            Ok(notification) => notification,
            Err(e) => {
                warn!("Dropping message: {}", e);
                return Outcome::DroppedMalformedEnvelope;
            }
        };
        let Notification {
            bucket,
            key,
            requester,
            ..
        } = &notification;

        debug!(
            "Processing object s3://{}/{}; posted by {}",
            bucket,
            key,
            requester.as_deref().unwrap_or("unknown")
        );

        let rules = Arc::clone(&self.rules);
        let Some(forwarding_rule) = rules.matching_forwarding_rule(bucket, key) else {
            info!(
                "Dropping object. s3://{}/{} doesn't match any forwarding rule",
                bucket, key
            );
            return Outcome::DroppedNoForwardingRule;
        };
        debug!(
            "Object s3://{}/{} matched forwarding rule {}",
            bucket, key, forwarding_rule.name
        );

        let Some(processing_rule) = rules.processing_rule_for(forwarding_rule, key) else {
            debug!(
                "Could not find a matching processing rule for source {}/{} and key {}",
                forwarding_rule.source, forwarding_rule.source_name, key
            );
            return Outcome::SkippedNoProcessingRule;
        };

        let mut sinks = self
            .sinks
            .sinks_for(&forwarding_rule.sinks, &forwarding_rule.name, bucket);
        if sinks.is_empty() {
            error!(
                "There are no valid sinks defined in forwarding rule {} in bucket {}",
                forwarding_rule.name, bucket
            );
            return Outcome::SkippedNoValidSinks;
        }

        let summary = match process_log_object(
            processing_rule,
            bucket,
            key,
            &forwarding_rule.annotations,
            &mut sinks,
            self.objects.as_ref(),
            &self.options,
        )
        .await
        {
            Ok(summary) => summary,
            Err(e) => {
                error!("Error processing s3://{}/{}: {}", bucket, key, e);
                return Outcome::Failed(e);
            }
        };

        for sink in &mut sinks {
            if let Err(e) = sink.flush().await {
                error!("Error flushing sink {}: {}", sink.id(), e);
                return Outcome::Failed(e.into());
            }
        }

        debug!(
            "Forwarded {} records from s3://{}/{} ({} filtered, {} malformed)",
            summary.records, bucket, key, summary.dropped_by_filters, summary.malformed
        );
        Outcome::Forwarded {
            records: summary.records,
        }
    }
}
