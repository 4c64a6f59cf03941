//! Configuration for the monthly banking ETL job
//!
//! Fixed tunables are constants. Everything that varies between runs or
//! environments (storage base, area names, run date) is carried by
//! [`JobConfig`] and handed to each component at call time.

use chrono::NaiveDate;
use derive_builder::Builder;
use std::time::Duration;

use crate::pipeline::TransformPlan;

// ============================================================================
// Connection Pool Configuration
// ============================================================================

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(45);

/// Extraction is sequential, so the pool never needs more than a couple of
/// connections.
pub const MAX_POOL_CONNECTIONS: u32 = 2;

/// Upper bound for a single monthly `SELECT *`.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(600); // 10 minutes

pub const DEFAULT_DB_PORT: u16 = 3306;

pub const DEFAULT_DATABASE: &str = "BankingDB";

// ============================================================================
// Storage Layout
// ============================================================================

pub const DEFAULT_BASE_URI: &str = "s3://banking-data";

pub const DEFAULT_LANDING_AREA: &str = "bronze";

pub const DEFAULT_TRANSFORM_AREA: &str = "silver";

/// Suffix of every landing object: `{table}_monthly_data_extract.csv`
pub const EXTRACT_FILE_SUFFIX: &str = "monthly_data_extract.csv";

// ============================================================================
// Job Defaults
// ============================================================================

pub const DEFAULT_SECRET_ID: &str = "banking-aurora-credentials";

/// Column every source table is filtered on during extraction
pub const DEFAULT_DATE_COLUMN: &str = "date";

/// Everything a single run needs to know
#[derive(Debug, Clone, Builder)]
pub struct JobConfig {
    /// Source tables to extract, in order
    #[builder(default)]
    pub tables: Vec<String>,

    #[builder(setter(into), default = "DEFAULT_SECRET_ID.to_string()")]
    pub secret_id: String,

    /// AWS region; the default provider chain is used when unset
    #[builder(setter(into, strip_option), default)]
    pub region: Option<String>,

    #[builder(setter(into), default = "DEFAULT_BASE_URI.to_string()")]
    pub base_uri: String,

    #[builder(setter(into), default = "DEFAULT_LANDING_AREA.to_string()")]
    pub landing_area: String,

    #[builder(setter(into), default = "DEFAULT_TRANSFORM_AREA.to_string()")]
    pub transform_area: String,

    /// Overrides the database named by the secret; falls back to
    /// [`DEFAULT_DATABASE`] when neither is set
    #[builder(setter(into, strip_option), default)]
    pub database: Option<String>,

    /// Overrides the port carried by the secret, if any
    #[builder(setter(strip_option), default)]
    pub port: Option<u16>,

    #[builder(setter(into), default = "DEFAULT_DATE_COLUMN.to_string()")]
    pub date_column: String,

    /// Day the job runs "as of"; determines the month window
    #[builder(default = "chrono::Local::now().date_naive()")]
    pub run_date: NaiveDate,

    /// Continue with the remaining tables after an extraction failure
    #[builder(default)]
    pub keep_going: bool,

    #[builder(default)]
    pub skip_extract: bool,

    #[builder(default)]
    pub skip_transform: bool,

    #[builder(default)]
    pub transform: TransformPlan,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_match_storage_layout() {
        let config = JobConfigBuilder::default()
            .tables(vec!["Loan".to_string()])
            .build()
            .unwrap();

        assert_eq!(config.base_uri, "s3://banking-data");
        assert_eq!(config.landing_area, "bronze");
        assert_eq!(config.transform_area, "silver");
        assert!(config.database.is_none());
        assert_eq!(config.date_column, "date");
        assert!(config.port.is_none());
        assert!(!config.keep_going);
    }

    #[test]
    fn test_builder_overrides() {
        let run_date = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        let config = JobConfigBuilder::default()
            .tables(vec!["Bank".to_string(), "Branch".to_string()])
            .base_uri("/tmp/lake")
            .port(3307)
            .run_date(run_date)
            .keep_going(true)
            .build()
            .unwrap();

        assert_eq!(config.tables.len(), 2);
        assert_eq!(config.base_uri, "/tmp/lake");
        assert_eq!(config.port, Some(3307));
        assert_eq!(config.run_date, run_date);
        assert!(config.keep_going);
    }
}
