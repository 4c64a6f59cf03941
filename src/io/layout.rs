//! Deterministic object keys for the landing and transformed areas.

use chrono::NaiveDate;

use crate::calendar::YearMonth;
use crate::config::EXTRACT_FILE_SUFFIX;

/// Area names under the storage base
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub landing_area: String,
    pub transform_area: String,
}

impl StorageLayout {
    pub fn new(landing_area: impl Into<String>, transform_area: impl Into<String>) -> Self {
        Self {
            landing_area: landing_area.into().trim_matches('/').to_string(),
            transform_area: transform_area.into().trim_matches('/').to_string(),
        }
    }

    /// `{landing}/{table}/{YYYYMM}/{table}_monthly_data_extract.csv`
    pub fn landing_key(&self, table: &str, year_month: &YearMonth) -> String {
        format!(
            "{}/{}/{}/{}_{}",
            self.landing_area, table, year_month, table, EXTRACT_FILE_SUFFIX
        )
    }

    /// `{transform}/{bank}/{YYYYMM}/{bank}_{YYYYMMDD}.csv`
    pub fn transform_key(&self, bank_name: &str, year_month: &YearMonth, run_date: NaiveDate) -> String {
        let bank = path_segment(bank_name);
        format!(
            "{}/{}/{}/{}_{}.csv",
            self.transform_area,
            bank,
            year_month,
            bank,
            run_date.format("%Y%m%d")
        )
    }
}

/// Bank names are free text; keep them from introducing extra path levels.
fn path_segment(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "_".repeat(cleaned.len().max(1)),
        _ => cleaned,
    }
}
