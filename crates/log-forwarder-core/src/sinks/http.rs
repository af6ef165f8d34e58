// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of records to a log ingestion endpoint.
//!
//! Records are serialized on `push` and queued in a [`Batcher`]. As soon as a
//! complete batch is queued it is sent, so memory stays bounded for large
//! objects; `flush` sends whatever remains.
//!
//! ```text
//!   push ──> Batcher ──> JSON array ──> compress ──> POST ──> retry?
//! ```
//!
//! Transport errors and 5xx answers are retried with a linearly growing
//! delay, up to `flush_retry_count` attempts. Any other non-success answer
//! fails the delivery immediately.

use std::io::Write;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use flate2::write::GzEncoder;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use tracing::{debug, error, warn};
use zstd::stream::write::Encoder as ZstdEncoder;

use crate::config::{Compression, Config, SinkConfig};
use crate::record::NormalizedRecord;
use crate::sinks::batcher::Batcher;
use crate::sinks::{Sink, SinkError};

const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);
const ZSTD_LEVEL: i32 = 3;

pub struct HttpSink {
    id: String,
    url: String,
    client: reqwest::Client,
    headers: HeaderMap,
    compression: Compression,
    batcher: Batcher,
    retry_count: usize,
    retry_backoff: Duration,
}

impl HttpSink {
    #[must_use]
    pub fn new(
        sink_config: &SinkConfig,
        api_key: String,
        client: reqwest::Client,
        config: &Config,
    ) -> Self {
        HttpSink {
            headers: build_headers(&api_key, sink_config.compression),
            id: sink_config.id.clone(),
            url: sink_config.url.clone(),
            client,
            compression: sink_config.compression,
            batcher: Batcher::new(config.max_batch_entries, config.max_content_size_bytes),
            retry_count: config.flush_retry_count.max(1),
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Base delay between attempts; attempt `n` waits `n * backoff`.
    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    fn compress(&self, data: Vec<u8>) -> Result<Vec<u8>, SinkError> {
        let encoded = match self.compression {
            Compression::None => return Ok(data),
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(&data).and_then(|()| encoder.finish())
            }
            Compression::Zstd => ZstdEncoder::new(Vec::new(), ZSTD_LEVEL).and_then(|mut encoder| {
                encoder.write_all(&data)?;
                encoder.finish()
            }),
        };
        encoded.map_err(|source| SinkError::Encode {
            sink_id: self.id.clone(),
            source,
        })
    }

    async fn send_batch(&mut self) -> Result<(), SinkError> {
        let batch = self.batcher.get_batch();
        if batch.is_empty() {
            return Ok(());
        }
        let body = self.compress(batch)?;
        self.send(body).await
    }

    async fn send(&self, body: Vec<u8>) -> Result<(), SinkError> {
        let mut attempts = 0;

        loop {
            let time = Instant::now();
            attempts += 1;
            let resp = self
                .client
                .post(&self.url)
                .headers(self.headers.clone())
                .body(body.clone())
                .send()
                .await;
            let elapsed = time.elapsed();

            let retryable = match resp {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        debug!(
                            "Sink {} delivered batch in {} ms",
                            self.id,
                            elapsed.as_millis()
                        );
                        return Ok(());
                    }
                    let body = resp.text().await.unwrap_or_default();
                    let failure = SinkError::Status {
                        sink_id: self.id.clone(),
                        status: status.as_u16(),
                        body,
                    };
                    if !status.is_server_error() {
                        error!("Sink {} rejected the batch: {}", self.id, failure);
                        return Err(failure);
                    }
                    failure
                }
                Err(source) => SinkError::Request {
                    sink_id: self.id.clone(),
                    attempts,
                    source,
                },
            };

            if attempts >= self.retry_count {
                error!(
                    "Sink {} failed to send batch after {} ms and {} attempts: {}",
                    self.id,
                    elapsed.as_millis(),
                    attempts,
                    retryable
                );
                return Err(retryable);
            }

            warn!(
                "Sink {} attempt {} failed, retrying: {}",
                self.id, attempts, retryable
            );
            let delay = self
                .retry_backoff
                .saturating_mul(u32::try_from(attempts).unwrap_or(u32::MAX));
            tokio::time::sleep(delay).await;
        }
    }
}

fn build_headers(api_key: &str, compression: Compression) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    match HeaderValue::from_str(&format!("Api-Token {api_key}")) {
        Ok(mut value) => {
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Err(_) => error!("API key contains characters not allowed in a header, sending without it"),
    }
    match compression {
        Compression::None => {}
        Compression::Gzip => {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        }
        Compression::Zstd => {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("zstd"));
        }
    }
    headers
}

#[async_trait]
impl Sink for HttpSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn reset(&mut self) {
        self.batcher.clear();
    }

    async fn push(&mut self, record: &NormalizedRecord) -> Result<(), SinkError> {
        self.batcher.add(record.to_json()?);
        while self.batcher.has_full_batch() {
            self.send_batch().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        while !self.batcher.is_empty() {
            self.send_batch().await?;
        }
        Ok(())
    }

    fn buffered(&self) -> usize {
        self.batcher.len()
    }
}
