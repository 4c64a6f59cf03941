//! Monthly transform: join the landed tables and write per-bank rolling
//! loan averages into the transformed area.

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use futures::future::try_join_all;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{error, info, warn};

use super::frame::Frame;
use super::window::{parse_amount, parse_period, trailing_average};
use crate::calendar::YearMonth;
use crate::error::JobError;
use crate::io::{ObjectStore, StorageLayout};

pub const LOAN_DATE_COLUMN: &str = "loan_date";

pub const AVG_LOAN_AMOUNT_COLUMN: &str = "avgLoanAmount";

/// One inner join against a further landed table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinStep {
    pub table: String,
    /// Resolved against everything joined so far
    pub left_key: String,
    pub right_key: String,
}

impl JoinStep {
    pub fn new(table: &str, left_key: &str, right_key: &str) -> Self {
        Self {
            table: table.to_string(),
            left_key: left_key.to_string(),
            right_key: right_key.to_string(),
        }
    }
}

/// Which tables to join and which columns feed the aggregate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformPlan {
    pub base_table: String,
    pub joins: Vec<JoinStep>,
    /// Looked up on the last joined table first, since earlier tables keep
    /// the bare name on a collision
    pub sort_column: String,
    /// `yyyy-MM` loan period, parsed into `loan_date`
    pub period_column: String,
    pub partition_column: String,
    pub amount_column: String,
    pub bank_name_column: String,
    pub branch_id_column: String,
    /// Rows before the current one inside the averaging window
    pub rows_preceding: usize,
}

impl Default for TransformPlan {
    fn default() -> Self {
        Self {
            base_table: "Bank".to_string(),
            joins: vec![
                JoinStep::new("Branch", "idBank", "Bank_idBank"),
                JoinStep::new("Client", "idBranch", "Branch_idBranch"),
                JoinStep::new("Account", "idClient", "Client_idClient"),
                JoinStep::new("Loan", "idAccount", "Account_idAccount"),
            ],
            sort_column: "date".to_string(),
            period_column: "year_month".to_string(),
            partition_column: "idBranch".to_string(),
            amount_column: "Amount".to_string(),
            bank_name_column: "Name".to_string(),
            branch_id_column: "idBranch".to_string(),
            rows_preceding: 2,
        }
    }
}

impl TransformPlan {
    /// Base table followed by every joined table, in join order
    pub fn source_tables(&self) -> Vec<&str> {
        std::iter::once(self.base_table.as_str())
            .chain(self.joins.iter().map(|j| j.table.as_str()))
            .collect()
    }

    /// Table holding one row per loan event; the last one joined
    pub fn detail_table(&self) -> &str {
        self.joins
            .last()
            .map(|j| j.table.as_str())
            .unwrap_or(&self.base_table)
    }
}

/// One per-bank output object
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedFile {
    pub bank_name: String,
    pub key: String,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutcome {
    pub joined_rows: usize,
    pub files: Vec<TransformedFile>,
    pub duration_ms: u64,
}

/// Join the five source tables in plan order. Rows without a match at any
/// step are dropped.
pub fn join_sources(plan: &TransformPlan, sources: &[(String, Frame)]) -> Result<Frame> {
    let lookup = |table: &str| -> Result<&Frame> {
        sources
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, frame)| frame)
            .with_context(|| format!("No landing data loaded for table {}", table))
    };

    let mut joined = lookup(&plan.base_table)?.clone();
    for step in &plan.joins {
        let right = lookup(&step.table)?;
        joined = joined
            .inner_join(right, &step.table, &step.left_key, &step.right_key)
            .with_context(|| {
                format!(
                    "Failed to join {} on {} = {}",
                    step.table, step.left_key, step.right_key
                )
            })?;
    }

    Ok(joined)
}

/// `{detail_table}.{sort_column}` when the join renamed it, else the bare name
fn sort_column_name(plan: &TransformPlan, frame: &Frame) -> Result<String> {
    let qualified = format!("{}.{}", plan.detail_table(), plan.sort_column);
    if frame.column_index(&qualified).is_some() {
        return Ok(qualified);
    }
    frame.require_column(&plan.sort_column)?;
    Ok(plan.sort_column.clone())
}

/// Sort by the loan date column, then add `loan_date` and `avgLoanAmount`
pub fn add_rolling_average(plan: &TransformPlan, frame: &mut Frame) -> Result<()> {
    let sort_column = sort_column_name(plan, frame)?;
    frame.sort_by_column(&sort_column)?;

    let period_idx = frame.require_column(&plan.period_column)?;
    let partition_idx = frame.require_column(&plan.partition_column)?;
    let amount_idx = frame.require_column(&plan.amount_column)?;

    let loan_dates: Vec<Option<NaiveDate>> = (0..frame.len())
        .map(|row| parse_period(frame.cell(row, period_idx)))
        .collect();
    let partitions: Vec<&str> = (0..frame.len())
        .map(|row| frame.cell(row, partition_idx))
        .collect();
    let amounts: Vec<Option<f64>> = (0..frame.len())
        .map(|row| parse_amount(frame.cell(row, amount_idx)))
        .collect();

    let averages = trailing_average(&partitions, &loan_dates, &amounts, plan.rows_preceding);

    let loan_date_values = loan_dates
        .iter()
        .map(|d| d.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default())
        .collect();
    let average_values = averages
        .iter()
        .map(|a| a.map(|a| a.to_string()).unwrap_or_default())
        .collect();

    frame.push_column(LOAN_DATE_COLUMN, loan_date_values)?;
    frame.push_column(AVG_LOAN_AMOUNT_COLUMN, average_values)?;
    Ok(())
}

/// One `(branch id, avgLoanAmount)` frame per distinct bank name, sorted by name
pub fn split_by_bank(plan: &TransformPlan, frame: &Frame) -> Result<Vec<(String, Frame)>> {
    let bank_idx = frame.require_column(&plan.bank_name_column)?;
    let projection = vec![
        plan.branch_id_column.clone(),
        AVG_LOAN_AMOUNT_COLUMN.to_string(),
    ];

    frame
        .distinct(bank_idx)
        .into_iter()
        .map(|bank| {
            let output = frame.filter_eq(bank_idx, &bank).project(&projection)?;
            Ok((bank, output))
        })
        .collect()
}

/// Reads the landing area for a month and writes the transformed area
pub struct MonthlyTransformer<'a> {
    store: &'a dyn ObjectStore,
    layout: &'a StorageLayout,
    plan: &'a TransformPlan,
}

impl<'a> MonthlyTransformer<'a> {
    pub fn new(store: &'a dyn ObjectStore, layout: &'a StorageLayout, plan: &'a TransformPlan) -> Self {
        Self {
            store,
            layout,
            plan,
        }
    }

    /// Run the transform. Failures are logged and returned as
    /// [`JobError::Transform`]; the caller decides what they mean for the run.
    pub async fn transform(
        &self,
        year_month: &YearMonth,
        run_date: NaiveDate,
    ) -> Result<TransformOutcome, JobError> {
        info!(year_month = %year_month, tables = ?self.plan.source_tables(), "starting transform");

        match self.try_transform(year_month, run_date).await {
            Ok(outcome) => {
                info!(
                    joined_rows = outcome.joined_rows,
                    files = outcome.files.len(),
                    "transform completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!("an error occurred during transform: {:#}", e);
                Err(JobError::transform(e))
            }
        }
    }

    async fn try_transform(&self, year_month: &YearMonth, run_date: NaiveDate) -> Result<TransformOutcome> {
        let start_time = Instant::now();
        let sources = self.load_sources(year_month).await?;

        let mut joined = join_sources(self.plan, &sources)?;
        info!(rows = joined.len(), "joined landing tables");
        if joined.is_empty() {
            warn!(year_month = %year_month, "join produced no rows; no bank outputs will be written");
        }

        add_rolling_average(self.plan, &mut joined)?;
        let per_bank = split_by_bank(self.plan, &joined)?;

        // Bank names are cleaned into path segments; distinct names must not share a key
        let mut claimed: HashMap<String, String> = HashMap::new();
        let mut planned = Vec::with_capacity(per_bank.len());
        for (bank, frame) in per_bank {
            let key = self.layout.transform_key(&bank, year_month, run_date);
            if let Some(other) = claimed.insert(key.clone(), bank.clone()) {
                bail!(
                    "Banks '{}' and '{}' both map to output key {}",
                    other,
                    bank,
                    key
                );
            }
            planned.push((bank, key, frame));
        }

        let writes = planned.into_iter().map(|(bank, key, frame)| async move {
            let body = frame.to_csv()?;
            self.store
                .put(&key, body)
                .await
                .with_context(|| format!("Failed to write output for bank {}", bank))?;
            info!(bank = %bank, rows = frame.len(), location = %self.store.location(&key), "wrote bank output");
            Ok::<_, anyhow::Error>(TransformedFile {
                bank_name: bank,
                key,
                rows: frame.len(),
            })
        });
        let files = try_join_all(writes).await?;

        Ok(TransformOutcome {
            joined_rows: joined.len(),
            files,
            duration_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    async fn load_sources(&self, year_month: &YearMonth) -> Result<Vec<(String, Frame)>> {
        let mut sources = Vec::new();
        for table in self.plan.source_tables() {
            let key = self.layout.landing_key(table, year_month);
            if !self.store.exists(&key).await? {
                bail!(
                    "Landing object {} not found for table {}",
                    self.store.location(&key),
                    table
                );
            }
            let body = self
                .store
                .get(&key)
                .await
                .with_context(|| format!("Failed to load landing data for {}", table))?;
            let frame = Frame::from_csv(&body)
                .with_context(|| format!("Failed to parse {}", self.store.location(&key)))?;
            if frame.columns.is_empty() {
                bail!("Landing data for {} is empty", table);
            }
            sources.push((table.to_string(), frame));
        }
        Ok(sources)
    }
}
