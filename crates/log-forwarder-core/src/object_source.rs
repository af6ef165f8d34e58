// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Access to the raw bytes of log objects.
//!
//! The forwarder only needs "give me the bytes of bucket/key". In production
//! that is S3, with one client per bucket created lazily; for local runs and
//! tests any [`ObjectStore`] can serve objects under `<bucket>/<key>`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Store(#[from] object_store::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// Downloads the whole object.
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes, FetchError>;
}

/// Builds the object source described by the configuration: the local
/// directory when `object_store_root` is set, S3 otherwise.
pub fn from_config(config: &Config) -> Result<Arc<dyn ObjectSource>, FetchError> {
    let timeout = Duration::from_secs(config.fetch_timeout);
    match &config.object_store_root {
        Some(root) => {
            let store = LocalFileSystem::new_with_prefix(root)?;
            Ok(Arc::new(StoreObjectSource::new(Arc::new(store), timeout)))
        }
        None => Ok(Arc::new(S3ObjectSource::new(
            config.s3_endpoint.clone(),
            timeout,
        ))),
    }
}

async fn get_with_timeout(
    store: &dyn ObjectStore,
    location: &ObjectPath,
    timeout: Duration,
) -> Result<Bytes, FetchError> {
    let download = async {
        let result = store.get(location).await?;
        result.bytes().await
    };
    match tokio::time::timeout(timeout, download).await {
        Ok(bytes) => Ok(bytes?),
        Err(_) => Err(FetchError::Timeout(timeout)),
    }
}

/// S3 backed source. Credentials and region come from the standard AWS
/// environment variables.
pub struct S3ObjectSource {
    endpoint: Option<String>,
    timeout: Duration,
    clients: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl S3ObjectSource {
    #[must_use]
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Self {
        Self {
            endpoint,
            timeout,
            clients: Mutex::new(HashMap::new()),
        }
    }

    async fn client(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, FetchError> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(bucket) {
            return Ok(Arc::clone(client));
        }

        debug!("Creating S3 client for bucket {bucket}");
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(endpoint) = &self.endpoint {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }
        let client: Arc<dyn ObjectStore> = Arc::new(builder.build()?);
        clients.insert(bucket.to_string(), Arc::clone(&client));
        Ok(client)
    }
}

#[async_trait]
impl ObjectSource for S3ObjectSource {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes, FetchError> {
        let client = self.client(bucket).await?;
        get_with_timeout(client.as_ref(), &ObjectPath::from(key), self.timeout).await
    }
}

/// Serves every bucket from a single store, objects living at `<bucket>/<key>`.
pub struct StoreObjectSource {
    store: Arc<dyn ObjectStore>,
    timeout: Duration,
}

impl StoreObjectSource {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    #[must_use]
    pub fn location(bucket: &str, key: &str) -> ObjectPath {
        ObjectPath::from(format!("{bucket}/{key}"))
    }
}

#[async_trait]
impl ObjectSource for StoreObjectSource {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes, FetchError> {
        get_with_timeout(
            self.store.as_ref(),
            &Self::location(bucket, key),
            self.timeout,
        )
        .await
    }
}
