//! Blob storage for archive bytes and tongue images (MinIO/S3 compatible).

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{aws::AmazonS3Builder, path::Path, ObjectStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

use pulse_common::error::BlobError;
use pulse_common::gateway::BlobStore;

/// Configuration for object storage connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    /// S3/MinIO endpoint URL
    pub endpoint: String,
    /// Bucket name
    pub bucket: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// AWS region (use "us-east-1" for MinIO)
    pub region: String,
    /// Allow HTTP (for local MinIO)
    pub allow_http: bool,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://minio:9000".to_string(),
            bucket: "pulse-archives".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
            allow_http: true,
        }
    }
}

/// Object storage client holding uploaded archives and extracted images.
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStorage {
    /// Create a new object storage client from config.
    pub fn new(config: &ObjectStorageConfig) -> Result<Self, BlobError> {
        let mut builder = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_region(&config.region);

        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| BlobError(format!("failed to create S3 client: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            bucket: config.bucket.clone(),
        })
    }

    /// Read bytes from a path.
    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn get(&self, path: &str) -> Result<Bytes, BlobError> {
        let location = Path::from(path);

        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| BlobError(format!("failed to read {path}: {e}")))?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| BlobError(format!("failed to read bytes: {e}")))?;

        debug!(size = bytes.len(), "read object");
        Ok(bytes)
    }

    /// Write bytes to a path in the bucket.
    #[instrument(skip(self, data), fields(bucket = %self.bucket, path = %path))]
    pub async fn put(&self, path: &str, data: Bytes) -> Result<(), BlobError> {
        let location = Path::from(path);
        debug!(size = data.len(), "writing object");

        self.store
            .put(&location, data.into())
            .await
            .map_err(|e| BlobError(format!("failed to write {path}: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl BlobStore for ObjectStorage {
    async fn fetch(&self, path: &str) -> Result<Bytes, BlobError> {
        self.get(path).await
    }

    async fn store(&self, path: &str, bytes: Bytes) -> Result<(), BlobError> {
        self.put(path, bytes).await
    }
}
