//! Connection pool over the MySQL-compatible source database.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use std::fmt;

use super::RowSet;
use super::rows;
use crate::config::{CONNECT_TIMEOUT, DEFAULT_DATABASE, DEFAULT_DB_PORT, MAX_POOL_CONNECTIONS};
use crate::secrets::DbCredentials;

pub const MYSQL_DRIVER: &str = "mysql";

/// Everything needed to open a connection to the source database
#[derive(Clone)]
pub struct ConnectionProperties {
    pub driver: &'static str,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl ConnectionProperties {
    /// Combine secret-store credentials with job-level overrides.
    ///
    /// Port and database resolve in the order: explicit override, secret,
    /// built-in default.
    pub fn from_credentials(
        credentials: &DbCredentials,
        port_override: Option<u16>,
        database_override: Option<&str>,
    ) -> Self {
        Self {
            driver: MYSQL_DRIVER,
            host: credentials.endpoint.trim().to_string(),
            port: port_override
                .or(credentials.port)
                .unwrap_or(DEFAULT_DB_PORT),
            database: database_override
                .map(str::to_string)
                .or_else(|| credentials.dbname.clone())
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            user: credentials.username.clone(),
            password: credentials.password.clone(),
        }
    }

    /// Connection URL without credentials, safe to log
    pub fn url(&self) -> String {
        format!(
            "{}://{}:{}/{}",
            self.driver, self.host, self.port, self.database
        )
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
    }
}

impl fmt::Debug for ConnectionProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProperties")
            .field("driver", &self.driver)
            .field("url", &self.url())
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Inner pool variants
#[derive(Debug, Clone)]
enum PoolInner {
    MySql(sqlx::MySqlPool),
    #[cfg(test)]
    Sqlite(sqlx::SqlitePool),
}

// Wrap pool implementations so the extractor does not care which backend it talks to.
#[derive(Debug, Clone)]
pub struct Pool {
    inner: PoolInner,
}

pub async fn pool(props: &ConnectionProperties) -> Result<Pool> {
    tracing::info!(url = %props.url(), user = %props.user, "connecting to source database");

    let mysql_pool = MySqlPoolOptions::new()
        .min_connections(0)
        .max_connections(MAX_POOL_CONNECTIONS)
        .acquire_timeout(CONNECT_TIMEOUT)
        .connect_with(props.connect_options())
        .await
        .with_context(|| format!("Failed to connect to {}", props.url()))?;

    Ok(Pool {
        inner: PoolInner::MySql(mysql_pool),
    })
}

impl Pool {
    /// Create an in-memory SQLite pool for testing
    #[cfg(test)]
    pub async fn sqlite_in_memory() -> Result<Self, sqlx::Error> {
        // Every connection to `sqlite::memory:` is its own database, so keep exactly one.
        let sqlite_pool = sqlx::sqlite::SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Ok(Pool {
            inner: PoolInner::Sqlite(sqlite_pool),
        })
    }

    /// Execute a statement without results (test fixtures)
    #[cfg(test)]
    pub async fn execute_query(&self, sql: &str) -> Result<(), sqlx::Error> {
        match &self.inner {
            PoolInner::MySql(pool) => {
                sqlx::query(sql).execute(pool).await?;
                Ok(())
            }
            PoolInner::Sqlite(pool) => {
                sqlx::query(sql).execute(pool).await?;
                Ok(())
            }
        }
    }

    /// Run a query taking `start` and `end` as its two positional parameters
    /// and render every row to strings - works for both MySQL and SQLite
    pub async fn fetch_date_range(
        &self,
        sql: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RowSet, sqlx::Error> {
        match &self.inner {
            PoolInner::MySql(pool) => {
                let rows = sqlx::query(sql)
                    .bind(start)
                    .bind(end)
                    .fetch_all(pool)
                    .await?;
                Ok(rows::render_mysql_rows(&rows))
            }
            #[cfg(test)]
            PoolInner::Sqlite(pool) => {
                let rows = sqlx::query(sql)
                    .bind(start)
                    .bind(end)
                    .fetch_all(pool)
                    .await?;
                Ok(rows::render_sqlite_rows(&rows))
            }
        }
    }

    pub async fn close(&self) {
        match &self.inner {
            PoolInner::MySql(pool) => pool.close().await,
            #[cfg(test)]
            PoolInner::Sqlite(pool) => pool.close().await,
        }
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        match &self.inner {
            PoolInner::MySql(pool) => pool.is_closed(),
            #[cfg(test)]
            PoolInner::Sqlite(pool) => pool.is_closed(),
        }
    }
}
