//! Monthly extraction of one source table into the landing area.

use anyhow::{Context, Result, bail};
use std::fmt;
use std::time::Instant;
use tracing::{error, info, warn};

use super::frame::Frame;
use crate::calendar::DateWindow;
use crate::config::QUERY_TIMEOUT;
use crate::db::Pool;
use crate::error::JobError;
use crate::io::{ObjectStore, StorageLayout};

/// Validated SQL identifier naming a source table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        validate_identifier(name).with_context(|| format!("Invalid table name '{}'", name))?;
        Ok(TableName(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifiers are interpolated into SQL and object keys, so only plain
/// `[A-Za-z_][A-Za-z0-9_]*` names are accepted.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    match chars.next() {
        None => bail!("identifier is empty"),
        Some(c) if !(c.is_ascii_alphabetic() || c == '_') => {
            bail!("identifier must start with a letter or underscore")
        }
        _ => {}
    }
    if let Some(c) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        bail!("identifier contains invalid character '{}'", c);
    }
    Ok(())
}

/// `SELECT *` bounded to `[start, end)` on the date column. Both bounds are
/// bound as parameters.
pub fn build_query(table: &TableName, date_column: &str) -> String {
    format!(
        "SELECT * FROM `{table}` WHERE `{col}` >= ? AND `{col}` < ?",
        table = table,
        col = date_column
    )
}

/// Result of extracting one table
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractSummary {
    pub table: String,
    pub key: String,
    pub rows: usize,
    pub bytes: usize,
    pub duration_ms: u64,
}

/// Extracts one month of a table into `{landing}/{table}/{YYYYMM}/...`
pub struct MonthlyExtractor<'a> {
    pool: &'a Pool,
    store: &'a dyn ObjectStore,
    layout: &'a StorageLayout,
    date_column: &'a str,
}

impl<'a> MonthlyExtractor<'a> {
    pub fn new(
        pool: &'a Pool,
        store: &'a dyn ObjectStore,
        layout: &'a StorageLayout,
        date_column: &'a str,
    ) -> Self {
        Self {
            pool,
            store,
            layout,
            date_column,
        }
    }

    /// Extract `table` for `window`, replacing any previous landing object
    /// for the same month
    pub async fn extract(
        &self,
        table: &TableName,
        window: &DateWindow,
    ) -> Result<ExtractSummary, JobError> {
        info!(table = %table, window = %window, "starting data extraction");

        let result = self.try_extract(table, window).await;
        match &result {
            Ok(summary) => info!(
                table = %table,
                rows = summary.rows,
                location = %self.store.location(&summary.key),
                "data saved to landing area"
            ),
            Err(e) => error!(table = %table, "error during data extraction: {:#}", e),
        }
        info!(table = %table, "data extraction process completed");

        result.map_err(|e| JobError::extract(table.as_str(), e))
    }

    async fn try_extract(&self, table: &TableName, window: &DateWindow) -> Result<ExtractSummary> {
        let start_time = Instant::now();
        let sql = build_query(table, self.date_column);

        let row_set = tokio::time::timeout(
            QUERY_TIMEOUT,
            self.pool.fetch_date_range(&sql, window.start, window.end),
        )
        .await
        .with_context(|| format!("Query timed out after {:?}", QUERY_TIMEOUT))?
        .context("Failed to query source table")?;

        info!(table = %table, rows = row_set.len(), "data loaded from source database");
        if row_set.is_empty() {
            warn!(table = %table, "no rows in window; landing object will be empty");
        }

        // Canonical row order so a rerun over unchanged data writes identical bytes
        let mut rows = row_set.rows;
        rows.sort();
        let frame = Frame::new(row_set.columns, rows);
        let body = frame.to_csv()?;
        let bytes = body.len();

        let key = self.layout.landing_key(table.as_str(), &window.year_month());
        self.store
            .put(&key, body)
            .await
            .context("Failed to write landing object")?;

        Ok(ExtractSummary {
            table: table.to_string(),
            key,
            rows: frame.len(),
            bytes,
            duration_ms: start_time.elapsed().as_millis() as u64,
        })
    }
}
