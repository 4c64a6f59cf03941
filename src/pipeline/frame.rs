//! Header-bearing in-memory table loaded from and written to CSV.
//!
//! Cells are kept as strings, the way a header-only CSV read sees them.
//! Column lookup prefers an exact name and falls back to a case-insensitive
//! match.

use anyhow::{Context, Result, anyhow};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Frame {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Parse CSV bytes whose first record is the header. Empty input yields an
    /// empty frame with no columns.
    pub fn from_csv(data: &[u8]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(data);

        let columns: Vec<String> = reader
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result.with_context(|| format!("CSV parse error at record {}", idx + 1))?;
            rows.push(record.iter().map(|s| s.to_string()).collect());
        }

        Ok(Self { columns, rows })
    }

    /// Serialize with a header row. A frame without columns serializes to
    /// nothing at all.
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        if self.columns.is_empty() {
            return Ok(Vec::new());
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.columns)
            .context("Failed to write CSV header")?;
        for row in &self.rows {
            writer.write_record(row).context("Failed to write CSV record")?;
        }

        writer
            .into_inner()
            .map_err(|e| anyhow!("Failed to flush CSV buffer: {}", e))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| {
            anyhow!(
                "Column '{}' not found (available: {})",
                name,
                self.columns.join(", ")
            )
        })
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows[row].get(col).map(String::as_str).unwrap_or("")
    }

    /// Inner join with `right`, matching `left_key` in this frame against
    /// `right_key` in `right`.
    ///
    /// Output rows follow this frame's order, then `right`'s order for
    /// multiple matches. Empty keys never match. A right column whose name is
    /// already taken is renamed to `{right_table}.{column}`.
    pub fn inner_join(
        &self,
        right: &Frame,
        right_table: &str,
        left_key: &str,
        right_key: &str,
    ) -> Result<Frame> {
        let left_idx = self
            .require_column(left_key)
            .context("Left join key missing")?;
        let right_idx = right
            .require_column(right_key)
            .with_context(|| format!("Join key missing in {}", right_table))?;

        let mut index: HashMap<&str, Vec<usize>> = HashMap::new();
        for (row_idx, row) in right.rows.iter().enumerate() {
            let key = row.get(right_idx).map(|s| s.trim()).unwrap_or("");
            if !key.is_empty() {
                index.entry(key).or_default().push(row_idx);
            }
        }

        let mut columns = self.columns.clone();
        for name in &right.columns {
            let taken = columns.iter().any(|c| c.eq_ignore_ascii_case(name));
            columns.push(if taken {
                format!("{}.{}", right_table, name)
            } else {
                name.clone()
            });
        }

        let right_width = right.columns.len();
        let mut rows = Vec::new();
        for left_row in &self.rows {
            let key = left_row.get(left_idx).map(|s| s.trim()).unwrap_or("");
            if key.is_empty() {
                continue;
            }
            if let Some(matches) = index.get(key) {
                for &m in matches {
                    let mut row = left_row.clone();
                    row.resize(self.columns.len(), String::new());
                    let mut right_row = right.rows[m].clone();
                    right_row.resize(right_width, String::new());
                    row.extend(right_row);
                    rows.push(row);
                }
            }
        }

        Ok(Frame { columns, rows })
    }

    /// Stable sort by the string value of `column`
    pub fn sort_by_column(&mut self, column: &str) -> Result<()> {
        let idx = self.require_column(column)?;
        self.rows
            .sort_by(|a, b| a.get(idx).map(String::as_str).cmp(&b.get(idx).map(String::as_str)));
        Ok(())
    }

    /// Append a column; `values` must hold one entry per row
    pub fn push_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.rows.len() {
            anyhow::bail!(
                "Column '{}' has {} values for {} rows",
                name,
                values.len(),
                self.rows.len()
            );
        }
        let width = self.columns.len();
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.resize(width, String::new());
            row.push(value);
        }
        Ok(())
    }

    /// Keep only `names`, in that order, under the requested names
    pub fn project(&self, names: &[String]) -> Result<Frame> {
        let indices = names
            .iter()
            .map(|n| self.require_column(n))
            .collect::<Result<Vec<_>>>()?;

        let rows = self
            .rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|&i| row.get(i).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        Ok(Frame {
            columns: names.to_vec(),
            rows,
        })
    }

    /// Rows whose `column` equals `value`
    pub fn filter_eq(&self, column: usize, value: &str) -> Frame {
        Frame {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| row.get(column).map(String::as_str) == Some(value))
                .cloned()
                .collect(),
        }
    }

    /// Distinct values of `column`, sorted
    pub fn distinct(&self, column: usize) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.get(column).cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
