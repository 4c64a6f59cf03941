use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::primitives::ByteStream;
use std::sync::Arc;

use super::object_store::ObjectStore;
use super::uri::StorageUri;

/// ObjectStore implementation for an S3 bucket and optional key prefix
#[derive(Clone)]
pub struct S3ObjectStore {
    s3_client: Arc<S3Client>,
    bucket: String,
    prefix: String,
    base: StorageUri,
}

impl S3ObjectStore {
    /// Create a new S3ObjectStore
    pub fn new(s3_client: Arc<S3Client>, bucket: String, prefix: String) -> Self {
        Self {
            base: StorageUri::S3 {
                bucket: bucket.clone(),
                prefix: prefix.clone(),
            },
            s3_client,
            bucket,
            prefix,
        }
    }

    fn full_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix, key)
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        // PutObject replaces any existing object under the same key
        self.s3_client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .content_type("text/csv")
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("Failed to upload {}", self.location(key)))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .s3_client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .with_context(|| format!("Failed to read {}", self.location(key)))?;

        let bytes = response
            .body
            .collect()
            .await
            .context("Failed to collect S3 response body")?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let result = self
            .s3_client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false) =>
            {
                Ok(false)
            }
            Err(err) => Err(anyhow::Error::new(err))
                .with_context(|| format!("Failed to stat {}", self.location(key))),
        }
    }

    fn base(&self) -> &StorageUri {
        &self.base
    }
}
