// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per batch counters.
//!
//! Counters are collected while a batch is processed and emitted once at
//! the end as a single structured event tagged with the deployment name.
//! Shipping them anywhere else is left to the subscriber.

use tracing::info;

use crate::forwarder::Outcome;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[allow(clippy::module_name_repetitions)]
pub struct ForwarderMetrics {
    pub log_files_processed: u64,
    pub dropped_objects_not_matching_fwd_rules: u64,
    /// Objects without a matching processing rule.
    pub log_files_skipped: u64,
    pub log_files_skipped_no_valid_sinks: u64,
    pub dropped_malformed_notifications: u64,
    /// Batch item failures, deferred notifications included.
    pub log_processing_failures: u64,
    pub log_records_forwarded: u64,
}

impl ForwarderMetrics {
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Forwarded { records } => {
                self.log_files_processed += 1;
                self.log_records_forwarded += *records as u64;
            }
            Outcome::DroppedMalformedEnvelope => self.dropped_malformed_notifications += 1,
            Outcome::DroppedNoForwardingRule => self.dropped_objects_not_matching_fwd_rules += 1,
            Outcome::SkippedNoProcessingRule => self.log_files_skipped += 1,
            Outcome::SkippedNoValidSinks => self.log_files_skipped_no_valid_sinks += 1,
            Outcome::Failed(_) | Outcome::Deferred => self.log_processing_failures += 1,
        }
    }

    /// Counter names paired with their values.
    #[must_use]
    pub fn counters(&self) -> [(&'static str, u64); 7] {
        [
            ("LogFilesProcessed", self.log_files_processed),
            (
                "DroppedObjectsNotMatchingFwdRules",
                self.dropped_objects_not_matching_fwd_rules,
            ),
            ("LogFilesSkipped", self.log_files_skipped),
            (
                "LogFilesSkippedNoValidSinks",
                self.log_files_skipped_no_valid_sinks,
            ),
            (
                "DroppedMalformedNotifications",
                self.dropped_malformed_notifications,
            ),
            ("LogProcessingFailures", self.log_processing_failures),
            ("LogRecordsForwarded", self.log_records_forwarded),
        ]
    }

    pub fn emit(&self, deployment: &str) {
        info!(
            deployment,
            LogFilesProcessed = self.log_files_processed,
            DroppedObjectsNotMatchingFwdRules = self.dropped_objects_not_matching_fwd_rules,
            LogFilesSkipped = self.log_files_skipped,
            LogFilesSkippedNoValidSinks = self.log_files_skipped_no_valid_sinks,
            DroppedMalformedNotifications = self.dropped_malformed_notifications,
            LogProcessingFailures = self.log_processing_failures,
            LogRecordsForwarded = self.log_records_forwarded,
            "Batch metrics"
        );
    }
}
