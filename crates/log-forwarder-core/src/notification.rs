// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Inbound batches of object-created notifications and the batch outcome.
//!
//! A batch is a queue delivery of messages whose bodies are S3 event
//! notifications:
//!
//! ```json
//! {"Records": [{"messageId": "m1", "body": "{\"detail\": {\"bucket\": {\"name\": \"logs\"}, \"object\": {\"key\": \"app/1.log\"}, \"requester\": \"123456789012\"}}"}]}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct NotificationBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<RawMessage>,
}

/// One queue message, body not yet decoded.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RawMessage {
    #[serde(rename = "messageId")]
    pub message_id: String,
    #[serde(default)]
    pub body: String,
}

impl RawMessage {
    #[must_use]
    pub fn new(message_id: &str, body: &str) -> Self {
        Self {
            message_id: message_id.to_string(),
            body: body.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EventBody {
    detail: EventDetail,
}

#[derive(Debug, Deserialize)]
struct EventDetail {
    bucket: BucketRef,
    object: ObjectRef,
    #[serde(default)]
    requester: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BucketRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectRef {
    key: String,
}

/// A decoded notification: one object to consider for forwarding.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub message_id: String,
    pub bucket: String,
    pub key: String,
    pub requester: Option<String>,
}

impl Notification {
    /// Decodes the body of `message`. A body that is not JSON, or that lacks
    /// the bucket name or object key, is an [`EnvelopeError`].
    pub fn from_message(message: &RawMessage) -> Result<Notification, EnvelopeError> {
        let body: EventBody =
            serde_json::from_str(&message.body).map_err(|source| EnvelopeError {
                message_id: message.message_id.clone(),
                source,
            })?;
        Ok(Notification {
            message_id: message.message_id.clone(),
            bucket: body.detail.bucket.name,
            key: body.detail.object.key,
            requester: body.detail.requester,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchItemFailure {
    #[serde(rename = "itemIdentifier")]
    pub item_identifier: String,
}

/// Messages the upstream queue must redeliver.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchResponse {
    #[serde(rename = "batchItemFailures")]
    pub batch_item_failures: Vec<BatchItemFailure>,
}

impl BatchResponse {
    pub fn push(&mut self, message_id: &str) {
        self.batch_item_failures.push(BatchItemFailure {
            item_identifier: message_id.to_string(),
        });
    }

    #[must_use]
    pub fn failed_ids(&self) -> Vec<&str> {
        self.batch_item_failures
            .iter()
            .map(|failure| failure.item_identifier.as_str())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"version":"0","detail-type":"Object Created","detail":{"bucket":{"name":"logs"},"object":{"key":"app/1.log","size":12},"requester":"123456789012"}}"#;

    #[test]
    fn test_decode_batch() {
        let batch: NotificationBatch = serde_json::from_str(
            r#"{"Records":[{"messageId":"m1","body":"{}","receiptHandle":"x"}]}"#,
        )
        .unwrap();
        assert_eq!(batch.records, vec![RawMessage::new("m1", "{}")]);
    }

    #[test]
    fn test_decode_notification() {
        let notification = Notification::from_message(&RawMessage::new("m1", BODY)).unwrap();
        assert_eq!(notification.bucket, "logs");
        assert_eq!(notification.key, "app/1.log");
        assert_eq!(notification.requester.as_deref(), Some("123456789012"));
    }

    #[test]
    fn test_body_not_json() {
        let error = Notification::from_message(&RawMessage::new("m2", "not-json")).unwrap_err();
        assert_eq!(error.message_id, "m2");
    }

    #[test]
    fn test_body_missing_key() {
        let body = r#"{"detail":{"bucket":{"name":"logs"},"object":{}}}"#;
        assert!(Notification::from_message(&RawMessage::new("m3", body)).is_err());
    }

    #[test]
    fn test_batch_response_wire_format() {
        let mut response = BatchResponse::default();
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"batchItemFailures":[]}"#
        );
        response.push("m1");
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"batchItemFailures":[{"itemIdentifier":"m1"}]}"#
        );
        assert_eq!(response.failed_ids(), vec!["m1"]);
    }
}
