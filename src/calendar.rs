//! Month window and year-month key computation

use anyhow::{Result, anyhow};
use chrono::{Datelike, NaiveDate};
use std::fmt;

/// `YYYYMM` partition key shared by landing and transformed storage paths
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth(String);

impl YearMonth {
    pub fn from_date(date: NaiveDate) -> Self {
        YearMonth(date.format("%Y%m").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Half-open `[start, end)` window covering one calendar month.
///
/// `end` is the first day of the following month, so a `< end` filter keeps
/// rows dated on the month's last day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Window for the month containing `date`
    pub fn month_of(date: NaiveDate) -> Result<Self> {
        let start = date
            .with_day(1)
            .ok_or_else(|| anyhow!("Cannot compute first day of month for {date}"))?;
        let end = if start.month() == 12 {
            NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
        }
        .ok_or_else(|| anyhow!("Month after {start} is out of range"))?;

        Ok(Self { start, end })
    }

    /// Last calendar day included in the window
    pub fn last_day(&self) -> NaiveDate {
        self.end.pred_opt().unwrap_or(self.start)
    }

    pub fn year_month(&self) -> YearMonth {
        YearMonth::from_date(self.start)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Parse a `YYYY-MM-DD` run date supplied on the command line
pub fn parse_run_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| anyhow!("Invalid run date '{}': {} (expected YYYY-MM-DD)", value, e))
}
