//! Rendering of dynamically typed result rows into CSV-ready strings.
//!
//! `SELECT *` over arbitrary tables gives no compile-time row type, so each
//! cell is decoded by trying the supported Rust types in turn. NULL renders
//! as an empty field.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::{Column, ColumnIndex, Decode, Row, Type};

/// Column names plus rendered rows of a query result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Try to decode a cell as `T`, honoring the driver's type compatibility check
fn try_render<'r, R, T>(row: &'r R, idx: usize, render: impl Fn(T) -> String) -> Option<String>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<Option<T>, _>(idx)
        .ok()
        .map(|value| value.map(&render).unwrap_or_default())
}

/// Types both backends understand, most specific first
fn render_common<R>(row: &R, idx: usize) -> Option<String>
where
    R: Row,
    usize: ColumnIndex<R>,
    for<'r> i64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> f64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveDate: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveDateTime: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
{
    try_render::<R, i64>(row, idx, |v| v.to_string())
        .or_else(|| try_render::<R, f64>(row, idx, |v| v.to_string()))
        .or_else(|| try_render::<R, NaiveDate>(row, idx, |v| v.format("%Y-%m-%d").to_string()))
        .or_else(|| {
            try_render::<R, NaiveDateTime>(row, idx, |v| v.format("%Y-%m-%d %H:%M:%S").to_string())
        })
        .or_else(|| try_render::<R, String>(row, idx, |v| v))
}

/// Last resort: read the raw value as text without the type check. DECIMAL
/// travels as text on the MySQL wire, and SQLite converts any value to text.
fn render_unchecked<R>(row: &R, idx: usize) -> String
where
    R: Row,
    usize: ColumnIndex<R>,
    for<'r> String: Decode<'r, R::Database>,
{
    match row.try_get_unchecked::<Option<String>, _>(idx) {
        Ok(value) => value.unwrap_or_default(),
        Err(e) => {
            tracing::debug!(column = idx, "unrenderable cell left empty: {}", e);
            String::new()
        }
    }
}

fn column_names<R: Row>(row: &R) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

pub fn render_mysql_rows(rows: &[sqlx::mysql::MySqlRow]) -> RowSet {
    let Some(first) = rows.first() else {
        return RowSet::default();
    };

    let columns = column_names(first);
    let rendered = rows
        .iter()
        .map(|row| {
            (0..row.columns().len())
                .map(|idx| {
                    render_common(row, idx)
                        .or_else(|| try_render::<_, u64>(row, idx, |v| v.to_string()))
                        .or_else(|| {
                            try_render::<_, NaiveTime>(row, idx, |v| v.format("%H:%M:%S").to_string())
                        })
                        .unwrap_or_else(|| render_unchecked(row, idx))
                })
                .collect()
        })
        .collect();

    RowSet {
        columns,
        rows: rendered,
    }
}

#[cfg(test)]
pub fn render_sqlite_rows(rows: &[sqlx::sqlite::SqliteRow]) -> RowSet {
    let Some(first) = rows.first() else {
        return RowSet::default();
    };

    let columns = column_names(first);
    let rendered = rows
        .iter()
        .map(|row| {
            (0..row.columns().len())
                .map(|idx| render_common(row, idx).unwrap_or_else(|| render_unchecked(row, idx)))
                .collect()
        })
        .collect();

    RowSet {
        columns,
        rows: rendered,
    }
}
