// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory sinks

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log_forwarder_core::sinks::{Sink, SinkError};
use log_forwarder_core::NormalizedRecord;

/// Records delivered by a [`RecordingSink`], shared with the test.
#[derive(Clone, Default)]
pub struct Delivered(Arc<Mutex<Vec<NormalizedRecord>>>);

impl Delivered {
    pub fn records(&self) -> Vec<NormalizedRecord> {
        self.0.lock().unwrap().clone()
    }

    pub fn contents(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.content).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().unwrap().is_empty()
    }
}

/// Buffers pushed records and hands them to [`Delivered`] on flush, or fails
/// every flush when built with [`RecordingSink::failing`].
pub struct RecordingSink {
    id: String,
    pending: Vec<NormalizedRecord>,
    delivered: Delivered,
    fail_flush: bool,
}

impl RecordingSink {
    pub fn new(id: &str) -> (Box<dyn Sink>, Delivered) {
        Self::build(id, false)
    }

    pub fn failing(id: &str) -> (Box<dyn Sink>, Delivered) {
        Self::build(id, true)
    }

    fn build(id: &str, fail_flush: bool) -> (Box<dyn Sink>, Delivered) {
        let delivered = Delivered::default();
        let sink: Box<dyn Sink> = Box::new(RecordingSink {
            id: id.to_string(),
            pending: Vec::new(),
            delivered: delivered.clone(),
            fail_flush,
        });
        (sink, delivered)
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn reset(&mut self) {
        self.pending.clear();
    }

    async fn push(&mut self, record: &NormalizedRecord) -> Result<(), SinkError> {
        self.pending.push(record.clone());
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        if self.fail_flush {
            return Err(SinkError::Status {
                sink_id: self.id.clone(),
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.delivered
            .0
            .lock()
            .unwrap()
            .append(&mut self.pending);
        Ok(())
    }

    fn buffered(&self) -> usize {
        self.pending.len()
    }
}
