//! In-memory result table: column labels plus rows of cells.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One cell as returned by the data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
}

impl CellValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "NULL"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Int(n) => write!(f, "{n}"),
            CellValue::Float(x) => write!(f, "{x}"),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            CellValue::Date(d) => write!(f, "{d}"),
        }
    }
}

pub type Row = Vec<CellValue>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("row {row} has {actual} values but there are {expected} column labels")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

/// Column-labelled rows. Every row is exactly as wide as `labels`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    labels: Vec<String>,
    rows: Vec<Row>,
}

impl ResultTable {
    /// Shape raw rows into a table.
    ///
    /// Zero rows means there is no table to build: `Ok(None)`.
    pub fn assemble(labels: Vec<String>, rows: Vec<Row>) -> Result<Option<Self>, TableError> {
        if rows.is_empty() {
            return Ok(None);
        }
        Self::new(labels, rows).map(Some)
    }

    /// Build a table, empty or not, checking row widths.
    pub fn new(labels: Vec<String>, rows: Vec<Row>) -> Result<Self, TableError> {
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != labels.len())
        {
            return Err(TableError::RaggedRow {
                row: i,
                expected: labels.len(),
                actual: row.len(),
            });
        }
        Ok(Self { labels, rows })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == name)
    }

    /// All cells of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&CellValue>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }
}
