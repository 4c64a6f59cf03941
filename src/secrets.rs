//! Database credential lookup from a secret store

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use aws_sdk_secretsmanager::Client as SecretsClient;
use serde::{Deserialize, Deserializer};
use std::fmt;
use tracing::{error, info};

use crate::error::JobError;

/// Source of raw secret payloads, keyed by secret identifier
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Fetch the secret's string payload. `None` means the secret exists but
    /// carries no string value.
    async fn secret_string(&self, secret_id: &str) -> Result<Option<String>>;
}

/// Resolver backed by AWS Secrets Manager
pub struct SecretsManagerResolver {
    client: SecretsClient,
}

impl SecretsManagerResolver {
    pub fn new(aws_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: SecretsClient::new(aws_config),
        }
    }
}

#[async_trait]
impl SecretResolver for SecretsManagerResolver {
    async fn secret_string(&self, secret_id: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .context("GetSecretValue request failed")?;

        Ok(response.secret_string().map(str::to_string))
    }
}

/// Credentials and endpoint of the source database
#[derive(Clone, Deserialize)]
pub struct DbCredentials {
    #[serde(alias = "host")]
    pub endpoint: String,
    pub username: String,
    pub password: String,
    #[serde(default, deserialize_with = "port_from_number_or_string")]
    pub port: Option<u16>,
    #[serde(default)]
    pub dbname: Option<String>,
}

impl fmt::Debug for DbCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbCredentials")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .finish()
    }
}

// RDS-generated secrets store the port as a number, hand-written ones often as a string.
fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPort {
        Number(u16),
        Text(String),
    }

    match Option::<RawPort>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawPort::Number(port)) => Ok(Some(port)),
        Some(RawPort::Text(text)) => text
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl DbCredentials {
    /// Parse and validate a secret payload
    pub fn from_secret_string(payload: &str) -> Result<Self> {
        let credentials: DbCredentials =
            serde_json::from_str(payload).context("Secret payload is not valid credentials JSON")?;

        if credentials.endpoint.trim().is_empty() {
            bail!("Database endpoint not found in secret");
        }
        if credentials.username.trim().is_empty() {
            bail!("Database username not found in secret");
        }

        Ok(credentials)
    }
}

/// Fetch and validate the database credentials stored under `secret_id`
pub async fn resolve_credentials(
    resolver: &dyn SecretResolver,
    secret_id: &str,
) -> Result<DbCredentials, JobError> {
    let outcome: Result<DbCredentials> = async {
        let payload = resolver
            .secret_string(secret_id)
            .await?
            .ok_or_else(|| anyhow!("Secret has no string value"))?;
        DbCredentials::from_secret_string(&payload)
    }
    .await;

    match outcome {
        Ok(credentials) => {
            info!(secret_id, endpoint = %credentials.endpoint, "resolved database credentials");
            Ok(credentials)
        }
        Err(e) => {
            error!(secret_id, "error while retrieving secrets: {:#}", e);
            Err(JobError::secret(secret_id, e))
        }
    }
}
