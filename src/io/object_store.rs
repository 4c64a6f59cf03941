use anyhow::Result;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::Client as S3Client;
use std::sync::Arc;

use super::{LocalObjectStore, S3ObjectStore, StorageUri};

/// Abstraction over the storage holding the landing and transformed areas.
///
/// Keys are '/'-separated paths relative to the store's base URI, e.g.
/// `bronze/Loan/202403/Loan_monthly_data_extract.csv`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `body` at `key`, replacing any existing object
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()>;

    /// Read the full object at `key`
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Base URI of this store
    fn base(&self) -> &StorageUri;

    /// Fully qualified location of `key`, for logs
    fn location(&self, key: &str) -> String {
        self.base().display_key(key)
    }
}

/// Open the store matching the scheme of `uri`
pub fn open_store(uri: &StorageUri, aws_config: &SdkConfig) -> Arc<dyn ObjectStore> {
    match uri {
        StorageUri::Local(root) => Arc::new(LocalObjectStore::new(root)) as Arc<dyn ObjectStore>,
        StorageUri::S3 { bucket, prefix } => {
            let client = Arc::new(S3Client::new(aws_config));
            Arc::new(S3ObjectStore::new(client, bucket.clone(), prefix.clone()))
                as Arc<dyn ObjectStore>
        }
    }
}
