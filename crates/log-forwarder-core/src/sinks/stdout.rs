// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use async_trait::async_trait;

use crate::record::NormalizedRecord;
use crate::sinks::{Sink, SinkError};

/// Writes every record as one JSON line. Meant for local runs.
pub struct StdoutSink {
    id: String,
    lines: Vec<String>,
    writer: Box<dyn Write + Send>,
}

impl StdoutSink {
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self::with_writer(id, Box::new(std::io::stdout()))
    }

    #[must_use]
    pub fn with_writer(id: &str, writer: Box<dyn Write + Send>) -> Self {
        StdoutSink {
            id: id.to_string(),
            lines: Vec::new(),
            writer,
        }
    }

    fn write_lines(&mut self) -> std::io::Result<()> {
        for line in self.lines.drain(..) {
            self.writer.write_all(line.as_bytes())?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()
    }
}

#[async_trait]
impl Sink for StdoutSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn reset(&mut self) {
        self.lines.clear();
    }

    async fn push(&mut self, record: &NormalizedRecord) -> Result<(), SinkError> {
        self.lines.push(record.to_json()?);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.write_lines().map_err(|source| SinkError::Write {
            sink_id: self.id.clone(),
            source,
        })
    }

    fn buffered(&self) -> usize {
        self.lines.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_writes_one_line_per_record_on_flush() {
        let buffer = SharedBuffer::default();
        let mut sink = StdoutSink::with_writer("local", Box::new(buffer.clone()));
        for content in ["first", "second"] {
            sink.push(&NormalizedRecord::new(content.to_string()))
                .await
                .unwrap();
        }
        assert!(buffer.0.lock().unwrap().is_empty());

        sink.flush().await.unwrap();
        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(
            output,
            "{\"content\":\"first\"}\n{\"content\":\"second\"}\n"
        );
        assert_eq!(sink.buffered(), 0);
    }

    #[tokio::test]
    async fn test_reset_drops_pending_lines() {
        let buffer = SharedBuffer::default();
        let mut sink = StdoutSink::with_writer("local", Box::new(buffer.clone()));
        sink.push(&NormalizedRecord::new("stale".to_string()))
            .await
            .unwrap();
        sink.reset();
        sink.flush().await.unwrap();
        assert!(buffer.0.lock().unwrap().is_empty());
    }
}
