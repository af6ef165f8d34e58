// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use log_forwarder_core::config::{Compression, Config, SinkConfig, SinkKind};
use log_forwarder_core::http::get_client;
use log_forwarder_core::sinks::http::HttpSink;
use log_forwarder_core::sinks::{Sink, SinkError};
use log_forwarder_core::NormalizedRecord;
use mockito::{Matcher, Server};

fn sink(url: String, compression: Compression, config: &Config) -> HttpSink {
    let sink_config = SinkConfig {
        id: "1".to_string(),
        kind: SinkKind::Http,
        url,
        api_key: Some("mock-api-key".to_string()),
        api_key_env: None,
        compression,
    };
    HttpSink::new(
        &sink_config,
        "mock-api-key".to_string(),
        get_client(config),
        config,
    )
    .with_retry_backoff(Duration::ZERO)
}

fn record(content: &str) -> NormalizedRecord {
    let mut record = NormalizedRecord::new(content.to_string());
    record.extend_attributes([("aws.s3.bucket", "app-logs")]);
    record
}

#[tokio::test]
async fn http_sink_posts_json_array() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v2/logs/ingest")
        .match_header("authorization", "Api-Token mock-api-key")
        .match_header("content-type", "application/json; charset=utf-8")
        .match_body(Matcher::Json(serde_json::json!([
            {"content": "first", "aws.s3.bucket": "app-logs"},
            {"content": "second", "aws.s3.bucket": "app-logs"}
        ])))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let config = Config::default();
    let mut sink = sink(
        format!("{}/api/v2/logs/ingest", server.url()),
        Compression::None,
        &config,
    );
    sink.push(&record("first")).await.unwrap();
    sink.push(&record("second")).await.unwrap();
    sink.flush().await.unwrap();

    mock.assert_async().await;
    assert_eq!(sink.buffered(), 0);
}

#[tokio::test]
async fn http_sink_retries_server_errors() {
    let mut server = Server::new_async().await;
    let failure = server
        .mock("POST", "/ingest")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;
    let success = server
        .mock("POST", "/ingest")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let config = Config::default();
    let mut sink = sink(format!("{}/ingest", server.url()), Compression::None, &config);
    sink.push(&record("retried")).await.unwrap();
    sink.flush().await.unwrap();

    failure.assert_async().await;
    success.assert_async().await;
}

#[tokio::test]
async fn http_sink_gives_up_after_retry_count() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/ingest")
        .with_status(500)
        .expect(2)
        .create_async()
        .await;

    let config = Config {
        flush_retry_count: 2,
        ..Default::default()
    };
    let mut sink = sink(format!("{}/ingest", server.url()), Compression::None, &config);
    sink.push(&record("lost")).await.unwrap();
    let result = sink.flush().await;

    assert!(matches!(result, Err(SinkError::Status { status: 500, .. })));
    mock.assert_async().await;
}

#[tokio::test]
async fn http_sink_does_not_retry_client_errors() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/ingest")
        .with_status(400)
        .with_body("bad request")
        .expect(1)
        .create_async()
        .await;

    let config = Config::default();
    let mut sink = sink(format!("{}/ingest", server.url()), Compression::None, &config);
    sink.push(&record("rejected")).await.unwrap();
    let result = sink.flush().await;

    match result {
        Err(SinkError::Status { status, body, .. }) => {
            assert_eq!(status, 400);
            assert_eq!(body, "bad request");
        }
        other => panic!("expected a status error, got {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn http_sink_splits_batches_at_entry_limit() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/ingest")
        .with_status(204)
        .expect(3)
        .create_async()
        .await;

    let config = Config {
        max_batch_entries: 2,
        ..Default::default()
    };
    let mut sink = sink(format!("{}/ingest", server.url()), Compression::None, &config);
    for i in 0..5 {
        sink.push(&record(&format!("record {i}"))).await.unwrap();
    }
    // Two full batches were sent while pushing.
    assert_eq!(sink.buffered(), 1);
    sink.flush().await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn http_sink_compresses_with_gzip() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/ingest")
        .match_header("content-encoding", "gzip")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let config = Config::default();
    let mut sink = sink(format!("{}/ingest", server.url()), Compression::Gzip, &config);
    sink.push(&record("compressed")).await.unwrap();
    sink.flush().await.unwrap();

    mock.assert_async().await;
}
