//! Per-run resources: the source database pool and the object store.

use anyhow::Context;
use async_trait::async_trait;
use aws_config::SdkConfig;
use std::sync::Arc;
use tracing::info;

use crate::config::JobConfig;
use crate::db::{self, ConnectionProperties, Pool};
use crate::error::JobError;
use crate::io::{ObjectStore, StorageLayout, StorageUri, open_store};
use crate::secrets::DbCredentials;

/// Resources shared by the extract and transform stages of one run.
///
/// Must be closed with [`JobSession::close`] once the run is over.
pub struct JobSession {
    pool: Pool,
    store: Arc<dyn ObjectStore>,
    layout: StorageLayout,
}

impl JobSession {
    /// Connect to the source database and open the store under the
    /// configured base URI
    pub async fn open(
        config: &JobConfig,
        credentials: &DbCredentials,
        aws_config: &SdkConfig,
    ) -> Result<Self, JobError> {
        let props = ConnectionProperties::from_credentials(
            credentials,
            config.port,
            config.database.as_deref(),
        );

        let uri = StorageUri::parse(&config.base_uri)
            .with_context(|| format!("Invalid base URI '{}'", config.base_uri))
            .map_err(JobError::session)?;

        let pool = db::pool::pool(&props).await.map_err(JobError::session)?;
        let store = open_store(&uri, aws_config);

        info!(url = %props.url(), base = %config.base_uri, "job session opened");
        Ok(Self::from_parts(pool, store, layout_for(config)))
    }

    pub fn from_parts(pool: Pool, store: Arc<dyn ObjectStore>, layout: StorageLayout) -> Self {
        Self {
            pool,
            store,
            layout,
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub async fn close(self) {
        self.pool.close().await;
        info!("job session closed");
    }
}

pub fn layout_for(config: &JobConfig) -> StorageLayout {
    StorageLayout::new(&config.landing_area, &config.transform_area)
}

/// Opens a [`JobSession`] once credentials are known
#[async_trait]
pub trait SessionOpener: Send + Sync {
    async fn open(
        &self,
        config: &JobConfig,
        credentials: &DbCredentials,
    ) -> Result<JobSession, JobError>;
}

/// Opener for real runs: MySQL pool plus local or S3 storage
pub struct AwsSessionOpener {
    aws_config: SdkConfig,
}

impl AwsSessionOpener {
    pub fn new(aws_config: SdkConfig) -> Self {
        Self { aws_config }
    }
}

#[async_trait]
impl SessionOpener for AwsSessionOpener {
    async fn open(
        &self,
        config: &JobConfig,
        credentials: &DbCredentials,
    ) -> Result<JobSession, JobError> {
        JobSession::open(config, credentials, &self.aws_config).await
    }
}
