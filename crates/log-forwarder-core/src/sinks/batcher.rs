// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Buffers serialized records and cuts them into JSON array payloads that
//! respect the ingest endpoint's entry count and payload size limits.

use std::collections::VecDeque;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Batcher {
    messages: VecDeque<String>,
    /// Sum of the lengths of the queued entries.
    queued_bytes: usize,
    max_batch_entries: usize,
    max_content_size_bytes: usize,
    buffer: Vec<u8>,
}

impl Batcher {
    #[must_use]
    pub fn new(max_batch_entries: usize, max_content_size_bytes: usize) -> Self {
        Batcher {
            messages: VecDeque::new(),
            queued_bytes: 0,
            max_batch_entries,
            max_content_size_bytes,
            buffer: Vec::new(),
        }
    }

    pub fn add(&mut self, entry: String) {
        self.queued_bytes += entry.len();
        self.messages.push_back(entry);
    }

    /// True once the queued entries fill at least one complete payload.
    #[must_use]
    pub fn has_full_batch(&self) -> bool {
        // "[" + "]" and one separator per entry.
        let framed = self.queued_bytes + self.messages.len() + 1;
        self.messages.len() >= self.max_batch_entries || framed >= self.max_content_size_bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.queued_bytes = 0;
        self.buffer.clear();
    }

    /// Drains the oldest entries into a JSON array, stopping at the entry
    /// count or payload size limit. Returns an empty vector when nothing is
    /// queued. An entry too large for any payload is sent on its own.
    pub fn get_batch(&mut self) -> Vec<u8> {
        self.buffer.clear();
        self.buffer.extend(b"[");

        for _ in 0..self.max_batch_entries {
            let Some(entry) = self.messages.pop_front() else {
                break;
            };

            let first = self.buffer.len() == 1;
            if !first && self.buffer.len() + entry.len() + 1 > self.max_content_size_bytes {
                self.messages.push_front(entry);
                break;
            }
            if first && entry.len() + 2 > self.max_content_size_bytes {
                warn!(
                    "Log record of {} bytes exceeds the {} bytes payload limit, sending it alone",
                    entry.len(),
                    self.max_content_size_bytes
                );
            }

            self.queued_bytes -= entry.len();
            self.buffer.extend(entry.as_bytes());
            self.buffer.extend(b",");
        }

        if self.buffer.len() > 1 {
            self.buffer.pop();
            self.buffer.extend(b"]");
        } else {
            self.buffer.pop();
        }

        std::mem::take(&mut self.buffer)
    }
}
