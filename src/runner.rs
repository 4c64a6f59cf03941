//! High-level runner API for the monthly banking ETL job.
//!
//! This module drives one run end to end: resolve database credentials, work
//! out the month window, open the session, extract every requested table into
//! the landing area, then transform the landed month into per-bank outputs.
//!
//! This is the primary API for external users and for the CLI.

use anyhow::Context;
use aws_config::{BehaviorVersion, Region};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::calendar::DateWindow;
use crate::config::JobConfig;
use crate::error::JobError;
use crate::io::StorageUri;
use crate::pipeline::extract::validate_identifier;
use crate::pipeline::{MonthlyExtractor, MonthlyTransformer, TableName};
use crate::secrets::{SecretsManagerResolver, resolve_credentials};
use crate::session::{AwsSessionOpener, JobSession};
use crate::telemetry::StageEvent;

pub use crate::pipeline::{ExtractSummary, TransformOutcome, TransformPlan, TransformedFile};
pub use crate::pipeline::transform::JoinStep;
pub use crate::secrets::{DbCredentials, SecretResolver};
pub use crate::session::SessionOpener;
pub use crate::telemetry::RunStats;

/// Stages of a run, in the order they are entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Start,
    ResolveSecrets,
    ComputeWindow,
    Extract,
    Transform,
    Stop,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStage::Start => "START",
            JobStage::ResolveSecrets => "RESOLVE_SECRETS",
            JobStage::ComputeWindow => "COMPUTE_WINDOW",
            JobStage::Extract => "EXTRACT",
            JobStage::Transform => "TRANSFORM",
            JobStage::Stop => "STOP",
        };
        f.write_str(name)
    }
}

/// Result of a completed run
#[derive(Debug)]
pub struct JobReport {
    pub run_id: String,
    pub window: DateWindow,
    pub extracts: Vec<ExtractSummary>,
    /// `None` when the transform was skipped
    pub transform: Option<TransformOutcome>,
    pub stats: RunStats,
    pub duration: Duration,
}

/// Run the job against AWS: Secrets Manager for credentials, MySQL for the
/// source tables, and local or S3 storage for the output areas.
///
/// # Example
///
/// ```no_run
/// use bank_loan_etl::config::JobConfigBuilder;
/// use bank_loan_etl::runner::run;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = JobConfigBuilder::default()
///     .tables(vec!["Bank".to_string(), "Loan".to_string()])
///     .region("us-east-1")
///     .build()?;
///
/// let report = run(&config).await?;
/// println!("Wrote {} bank files", report.stats.files_written);
/// # Ok(())
/// # }
/// ```
pub async fn run(config: &JobConfig) -> Result<JobReport, JobError> {
    // Fail on bad input before touching the network
    validate_config(config)?;

    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }
    let aws_config = loader.load().await;

    let resolver = SecretsManagerResolver::new(&aws_config);
    let opener = AwsSessionOpener::new(aws_config);

    run_job(config, &resolver, &opener).await
}

/// Run the job with the given credential source and session factory.
///
/// The session is closed on every path once it has been opened. An extract
/// failure stops the run unless `keep_going` is set, in which case all
/// failing tables are reported together and the transform is not attempted.
pub async fn run_job(
    config: &JobConfig,
    resolver: &dyn SecretResolver,
    opener: &dyn SessionOpener,
) -> Result<JobReport, JobError> {
    let run_id = Uuid::new_v4().to_string();
    let start_time = Instant::now();
    enter(&run_id, JobStage::Start);

    let tables = validate_config(config)?;

    enter(&run_id, JobStage::ResolveSecrets);
    let credentials = resolve_credentials(resolver, &config.secret_id).await?;

    enter(&run_id, JobStage::ComputeWindow);
    let window = DateWindow::month_of(config.run_date)
        .map_err(|e| JobError::Config(format!("{:#}", e)))?;
    info!(run_id = %run_id, window = %window, year_month = %window.year_month(), "computed date window");

    let session = opener.open(config, &credentials).await?;

    let mut stats = RunStats::new();
    let mut extracts = Vec::new();
    let outcome = run_stages(
        config,
        &session,
        &tables,
        &window,
        &run_id,
        &mut extracts,
        &mut stats,
    )
    .await;
    session.close().await;

    enter(&run_id, JobStage::Stop);
    let transform = match outcome {
        Ok(transform) => transform,
        Err(e) => {
            warn!(run_id = %run_id, "run failed after partial progress: {}", partial_progress(&extracts, &stats));
            return Err(e);
        }
    };

    Ok(JobReport {
        run_id,
        window,
        extracts,
        transform,
        stats,
        duration: start_time.elapsed(),
    })
}

/// What a failed run still left behind in the landing area
fn partial_progress(extracts: &[ExtractSummary], stats: &RunStats) -> String {
    let landed: Vec<String> = extracts
        .iter()
        .map(|e| format!("{} -> {}", e.table, e.key))
        .collect();
    format!(
        "{} table(s) landed [{}], {} failed, {} rows / {} bytes written",
        stats.tables_extracted,
        landed.join(", "),
        stats.tables_failed,
        stats.rows_extracted,
        stats.bytes_written
    )
}

fn enter(run_id: &str, stage: JobStage) {
    info!(run_id, stage = %stage, "entering stage");
}

/// Check everything that can be checked without a network call
fn validate_config(config: &JobConfig) -> Result<Vec<TableName>, JobError> {
    if config.tables.is_empty() {
        return Err(JobError::Config(
            "at least one table name is required".to_string(),
        ));
    }
    if config.skip_extract && config.skip_transform {
        return Err(JobError::Config(
            "--skip-extract and --skip-transform leave nothing to run".to_string(),
        ));
    }

    let tables = config
        .tables
        .iter()
        .map(|t| TableName::parse(t))
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(|e| JobError::Config(format!("{:#}", e)))?;

    validate_identifier(&config.date_column)
        .with_context(|| format!("Invalid date column '{}'", config.date_column))
        .map_err(|e| JobError::Config(format!("{:#}", e)))?;

    StorageUri::parse(&config.base_uri)
        .with_context(|| format!("Invalid base URI '{}'", config.base_uri))
        .map_err(|e| JobError::Config(format!("{:#}", e)))?;

    Ok(tables)
}

async fn run_stages(
    config: &JobConfig,
    session: &JobSession,
    tables: &[TableName],
    window: &DateWindow,
    run_id: &str,
    extracts: &mut Vec<ExtractSummary>,
    stats: &mut RunStats,
) -> Result<Option<TransformOutcome>, JobError> {

    if config.skip_extract {
        warn!(run_id, "skipping extraction; transforming existing landing data");
    } else {
        enter(run_id, JobStage::Extract);
        let extractor = MonthlyExtractor::new(
            session.pool(),
            session.store(),
            session.layout(),
            &config.date_column,
        );

        let mut failed = Vec::new();
        for table in tables {
            match extractor.extract(table, window).await {
                Ok(summary) => {
                    stats.update(&StageEvent::TableExtracted {
                        rows: summary.rows as u64,
                        bytes: summary.bytes as u64,
                        duration_ms: summary.duration_ms,
                    });
                    extracts.push(summary);
                }
                Err(e) if config.keep_going => {
                    stats.update(&StageEvent::TableFailed);
                    failed.push(table.to_string());
                    warn!(run_id, table = %table, "continuing after failure: {}", e);
                }
                Err(e) => {
                    stats.update(&StageEvent::TableFailed);
                    return Err(e);
                }
            }
        }

        if !failed.is_empty() {
            error!(run_id, failed = ?failed, "extraction incomplete; not transforming");
            return Err(JobError::ExtractMany { tables: failed });
        }
    }

    if config.skip_transform {
        warn!(run_id, "skipping transform");
        return Ok(None);
    }

    enter(run_id, JobStage::Transform);
    let transformer = MonthlyTransformer::new(session.store(), session.layout(), &config.transform);
    let outcome = transformer
        .transform(&window.year_month(), config.run_date)
        .await?;

    stats.update(&StageEvent::TransformCompleted {
        joined_rows: outcome.joined_rows as u64,
        files_written: outcome.files.len(),
        duration_ms: outcome.duration_ms,
    });

    Ok(Some(outcome))
}
