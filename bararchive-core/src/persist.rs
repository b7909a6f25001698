//! Parquet persistence for result tables.
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place; existing files are replaced)
//! - Intermediate directories created on demand
//! - Column types inferred per column from the first non-null cell
//! - Inverse reader for round-tripping archived tables
//! - JSON metadata sidecar per archive file (hash, interval, row count)

use crate::table::{CellValue, ResultTable, Row};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("column '{column}' mixes {first} and {other} values")]
    MixedColumn {
        column: String,
        first: &'static str,
        other: &'static str,
    },

    #[error("parquet encode error: {0}")]
    Encode(String),

    #[error("parquet decode error: {0}")]
    Decode(String),

    #[error("metadata error: {0}")]
    Meta(String),
}

fn fs_err(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError + '_ {
    move |source| PersistError::Filesystem {
        path: path.to_path_buf(),
        source,
    }
}

/// Storage type of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int,
    Float,
    Text,
    Timestamp,
    Date,
}

impl ColumnKind {
    fn of(cell: &CellValue) -> Option<Self> {
        match cell {
            CellValue::Null => None,
            CellValue::Bool(_) => Some(Self::Bool),
            CellValue::Int(_) => Some(Self::Int),
            CellValue::Float(_) => Some(Self::Float),
            CellValue::Text(_) => Some(Self::Text),
            CellValue::Timestamp(_) => Some(Self::Timestamp),
            CellValue::Date(_) => Some(Self::Date),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Bool => "boolean",
            Self::Int => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
            Self::Date => "date",
        }
    }
}

/// Write a table to `path` as Parquet, creating parent directories.
pub fn write_table(table: &ResultTable, path: &Path) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(fs_err(parent))?;
    }

    let mut df = table_to_dataframe(table)?;

    let tmp_path = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp_path).map_err(fs_err(&tmp_path))?;
    if let Err(e) = ParquetWriter::new(file).finish(&mut df) {
        let _ = fs::remove_file(&tmp_path);
        return Err(PersistError::Encode(format!("write parquet: {e}")));
    }

    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        PersistError::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Read an archived table back.
pub fn read_table(path: &Path) -> Result<ResultTable, PersistError> {
    let file = fs::File::open(path).map_err(fs_err(path))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| PersistError::Decode(format!("read: {e}")))?;
    dataframe_to_table(&df)
}

// ── DataFrame conversion ────────────────────────────────────────────

fn table_to_dataframe(table: &ResultTable) -> Result<DataFrame, PersistError> {
    let mut columns = Vec::with_capacity(table.labels().len());
    for (idx, label) in table.labels().iter().enumerate() {
        let cells: Vec<&CellValue> = table.rows().iter().map(|row| &row[idx]).collect();
        columns.push(build_column(label, &cells)?);
    }
    DataFrame::new(columns).map_err(|e| PersistError::Encode(format!("dataframe creation: {e}")))
}

fn column_kind(label: &str, cells: &[&CellValue]) -> Result<ColumnKind, PersistError> {
    let mut kinds = cells.iter().filter_map(|c| ColumnKind::of(c));
    // An all-null column is stored as nullable text.
    let Some(first) = kinds.next() else {
        return Ok(ColumnKind::Text);
    };
    if let Some(other) = kinds.find(|k| *k != first) {
        return Err(PersistError::MixedColumn {
            column: label.to_string(),
            first: first.name(),
            other: other.name(),
        });
    }
    Ok(first)
}

fn build_column(label: &str, cells: &[&CellValue]) -> Result<Column, PersistError> {
    let name: PlSmallStr = label.into();
    let column = match column_kind(label, cells)? {
        ColumnKind::Bool => {
            let values: Vec<Option<bool>> = cells
                .iter()
                .map(|c| match c {
                    CellValue::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect();
            Column::new(name, values)
        }
        ColumnKind::Int => {
            let values: Vec<Option<i64>> = cells.iter().map(|c| c.as_i64()).collect();
            Column::new(name, values)
        }
        ColumnKind::Float => {
            let values: Vec<Option<f64>> = cells
                .iter()
                .map(|c| match c {
                    CellValue::Float(x) => Some(*x),
                    _ => None,
                })
                .collect();
            Column::new(name, values)
        }
        ColumnKind::Text => {
            let values: Vec<Option<String>> = cells
                .iter()
                .map(|c| c.as_str().map(str::to_string))
                .collect();
            Column::new(name, values)
        }
        ColumnKind::Timestamp => {
            let mut values: Vec<Option<i64>> = Vec::with_capacity(cells.len());
            for cell in cells {
                values.push(match cell {
                    CellValue::Timestamp(ts) => Some(ts.timestamp_nanos_opt().ok_or_else(|| {
                        PersistError::Encode(format!(
                            "timestamp {ts} in column '{label}' exceeds nanosecond range"
                        ))
                    })?),
                    _ => None,
                });
            }
            Column::new(name, values)
                .cast(&DataType::Datetime(TimeUnit::Nanoseconds, None))
                .map_err(|e| PersistError::Encode(format!("datetime cast: {e}")))?
        }
        ColumnKind::Date => {
            let mut values: Vec<Option<i32>> = Vec::with_capacity(cells.len());
            for cell in cells {
                values.push(match cell {
                    CellValue::Date(d) => Some(days_since_epoch(*d).ok_or_else(|| {
                        PersistError::Encode(format!(
                            "date {d} in column '{label}' is outside the storable range"
                        ))
                    })?),
                    _ => None,
                });
            }
            Column::new(name, values)
                .cast(&DataType::Date)
                .map_err(|e| PersistError::Encode(format!("date cast: {e}")))?
        }
    };
    Ok(column)
}

fn dataframe_to_table(df: &DataFrame) -> Result<ResultTable, PersistError> {
    let labels: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    let mut columns: Vec<Vec<CellValue>> = Vec::with_capacity(labels.len());
    for column in df.get_columns() {
        columns.push(column_cells(column)?);
    }

    let rows: Vec<Row> = (0..df.height())
        .map(|i| columns.iter().map(|col| col[i].clone()).collect())
        .collect();

    ResultTable::new(labels, rows).map_err(|e| PersistError::Decode(e.to_string()))
}

fn column_cells(column: &Column) -> Result<Vec<CellValue>, PersistError> {
    let type_err = |e: PolarsError| {
        PersistError::Decode(format!("column '{}' type: {e}", column.name()))
    };
    let n = column.len();

    let cells = match column.dtype() {
        DataType::Null => vec![CellValue::Null; n],
        DataType::Boolean => {
            let ca = column.bool().map_err(type_err)?;
            (0..n)
                .map(|i| ca.get(i).map_or(CellValue::Null, CellValue::Bool))
                .collect()
        }
        DataType::String => {
            let ca = column.str().map_err(type_err)?;
            (0..n)
                .map(|i| {
                    ca.get(i)
                        .map_or(CellValue::Null, |s| CellValue::Text(s.to_string()))
                })
                .collect()
        }
        DataType::Datetime(unit, _) => {
            let scale = match unit {
                TimeUnit::Nanoseconds => 1,
                TimeUnit::Microseconds => 1_000,
                TimeUnit::Milliseconds => 1_000_000,
            };
            let physical = column.cast(&DataType::Int64).map_err(type_err)?;
            let ca = physical.i64().map_err(type_err)?;
            let mut cells = Vec::with_capacity(n);
            for i in 0..n {
                cells.push(match ca.get(i) {
                    None => CellValue::Null,
                    Some(v) => {
                        let nanos = v.checked_mul(scale).ok_or_else(|| {
                            PersistError::Decode(format!(
                                "column '{}': timestamp {v} ({unit:?}) exceeds nanosecond range",
                                column.name()
                            ))
                        })?;
                        CellValue::Timestamp(DateTime::<Utc>::from_timestamp_nanos(nanos))
                    }
                });
            }
            cells
        }
        DataType::Date => {
            let physical = column.cast(&DataType::Int32).map_err(type_err)?;
            let ca = physical.i32().map_err(type_err)?;
            let mut cells = Vec::with_capacity(n);
            for i in 0..n {
                cells.push(match ca.get(i) {
                    None => CellValue::Null,
                    Some(days) => CellValue::Date(date_from_epoch_days(days).ok_or_else(|| {
                        PersistError::Decode(format!(
                            "column '{}': day {days} is outside the calendar range",
                            column.name()
                        ))
                    })?),
                });
            }
            cells
        }
        dt if dt.is_integer() => {
            let physical = column.cast(&DataType::Int64).map_err(type_err)?;
            let ca = physical.i64().map_err(type_err)?;
            (0..n)
                .map(|i| ca.get(i).map_or(CellValue::Null, CellValue::Int))
                .collect()
        }
        dt if dt.is_float() => {
            let physical = column.cast(&DataType::Float64).map_err(type_err)?;
            let ca = physical.f64().map_err(type_err)?;
            (0..n)
                .map(|i| ca.get(i).map_or(CellValue::Null, CellValue::Float))
                .collect()
        }
        other => {
            return Err(PersistError::Decode(format!(
                "column '{}' has unsupported type {other}",
                column.name()
            )))
        }
    };
    Ok(cells)
}

/// Polars stores dates as days since 1970-01-01.
fn days_since_epoch(date: NaiveDate) -> Option<i32> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    i32::try_from(date.signed_duration_since(epoch).num_days()).ok()
}

fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    epoch.checked_add_signed(TimeDelta::try_days(i64::from(days))?)
}

// ── Metadata sidecar ────────────────────────────────────────────────

/// Metadata sidecar written next to each archive file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveMeta {
    pub symbol: String,
    pub source: String,
    pub timeframe: String,
    pub start_ns: i64,
    pub end_ns: i64,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub data_hash: String,
    pub archived_at: DateTime<Utc>,
}

/// `{stem}.meta.json` next to the archive file.
pub fn meta_path(archive: &Path) -> PathBuf {
    archive.with_extension("meta.json")
}

/// BLAKE3 hex digest of a file's bytes.
pub fn file_hash(path: &Path) -> Result<String, PersistError> {
    let bytes = fs::read(path).map_err(fs_err(path))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Write the sidecar for `archive`, replacing any previous one atomically.
pub fn write_meta(archive: &Path, meta: &ArchiveMeta) -> Result<PathBuf, PersistError> {
    let path = meta_path(archive);
    let json = serde_json::to_string_pretty(meta)
        .map_err(|e| PersistError::Meta(format!("serialize: {e}")))?;

    let tmp_path = archive.with_extension("meta.json.tmp");
    fs::write(&tmp_path, json).map_err(fs_err(&tmp_path))?;
    fs::rename(&tmp_path, &path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        PersistError::Filesystem {
            path: path.clone(),
            source,
        }
    })?;
    Ok(path)
}

pub fn read_meta(archive: &Path) -> Result<ArchiveMeta, PersistError> {
    let path = meta_path(archive);
    let content = fs::read_to_string(&path).map_err(fs_err(&path))?;
    serde_json::from_str(&content).map_err(|e| PersistError::Meta(format!("parse: {e}")))
}
