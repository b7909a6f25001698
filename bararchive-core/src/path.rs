//! Archive layout.
//!
//! Layout: `{data_root}/{SYMBOL}/{source}/{timeframe}/{start}_{end}.parquet`
//! with both timestamps rendered as `YYYY-MM-DD_HH-MM-SS` in UTC.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extension of archive files.
pub const ARCHIVE_EXTENSION: &str = "parquet";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

const FORBIDDEN_CHARS: [char; 4] = ['/', '\\', ':', '\0'];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("{field} '{value}' cannot be used as a directory name")]
    InvalidSegment { field: &'static str, value: String },
}

/// The five values that identify one archive file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveKey {
    symbol: String,
    source: String,
    timeframe: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl ArchiveKey {
    pub fn new(
        symbol: &str,
        source: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, PathError> {
        Ok(Self {
            symbol: checked_segment("symbol", symbol)?,
            source: checked_segment("source", source)?,
            timeframe: checked_segment("timeframe", timeframe)?,
            start,
            end,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn timeframe(&self) -> &str {
        &self.timeframe
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// `{start}_{end}.parquet`
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.{ARCHIVE_EXTENSION}",
            format_instant(self.start),
            format_instant(self.end)
        )
    }
}

fn checked_segment(field: &'static str, value: &str) -> Result<String, PathError> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(FORBIDDEN_CHARS);
    if bad {
        return Err(PathError::InvalidSegment {
            field,
            value: value.to_string(),
        });
    }
    Ok(value.to_string())
}

/// Filesystem-safe UTC rendering: `2018-07-14_07-30-00`.
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}

/// Directory holding every archive for one symbol/source/timeframe.
pub fn partition_dir(data_root: &Path, key: &ArchiveKey) -> PathBuf {
    data_root
        .join(&key.symbol)
        .join(&key.source)
        .join(&key.timeframe)
}

/// Full path of the archive file for `key`.
pub fn archive_path(data_root: &Path, key: &ArchiveKey) -> PathBuf {
    partition_dir(data_root, key).join(key.file_name())
}
