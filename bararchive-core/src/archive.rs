//! Fetch-and-archive orchestration.
//!
//! One invocation: load config → build query → fetch → assemble → derive
//! path → persist. Configuration, request, and filesystem problems are
//! fatal and returned as [`ArchiveError`]. Connection and query problems
//! are logged and reported through [`ArchiveStatus`] instead.

use crate::config::{load_connection_params, ConfigError};
use crate::path::{archive_path, ArchiveKey, PathError};
use crate::persist::{file_hash, meta_path, write_meta, write_table, ArchiveMeta, PersistError};
use crate::postgres::PgGateway;
use crate::query::{QueryError, RangeQuery};
use crate::source::{FetchOutcome, RecordSource, SourceError};
use crate::table::{ResultTable, TableError};
use crate::time::{QueryInterval, TimeError};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Default data source label.
pub const DEFAULT_SOURCE: &str = "bitstamp";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid time bound: {0}")]
    Time(#[from] TimeError),

    #[error("invalid query: {0}")]
    Query(#[from] QueryError),

    #[error("invalid archive key: {0}")]
    Path(#[from] PathError),

    #[error("malformed result set: {0}")]
    Table(#[from] TableError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// What to fetch and how to file it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRequest {
    pub symbol: String,
    pub source: String,
    pub timeframe: String,
    pub interval: QueryInterval,
}

impl ArchiveRequest {
    pub fn new(
        symbol: impl Into<String>,
        source: impl Into<String>,
        timeframe: impl Into<String>,
        interval: QueryInterval,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            source: source.into(),
            timeframe: timeframe.into(),
            interval,
        }
    }

    /// Build a request from ISO-8601 bounds.
    pub fn from_iso(
        symbol: impl Into<String>,
        source: impl Into<String>,
        timeframe: impl Into<String>,
        start: &str,
        end: &str,
    ) -> Result<Self, ArchiveError> {
        let interval = QueryInterval::from_iso(start, end)?;
        Ok(Self::new(symbol, source, timeframe, interval))
    }

    pub fn archive_key(&self) -> Result<ArchiveKey, PathError> {
        ArchiveKey::new(
            &self.symbol,
            &self.source,
            &self.timeframe,
            self.interval.start(),
            self.interval.end(),
        )
    }
}

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveStatus {
    /// A table was fetched and written.
    Archived { rows: usize },
    /// The query ran and matched nothing.
    NoData,
    /// Connected, but the query failed.
    QueryFailed(SourceError),
    /// Could not connect.
    Unreachable(SourceError),
}

#[derive(Debug, Clone)]
pub struct ArchiveReport {
    pub status: ArchiveStatus,
    /// Present only when `status` is `Archived`.
    pub table: Option<ResultTable>,
    pub path: Option<PathBuf>,
}

impl ArchiveReport {
    fn without_table(status: ArchiveStatus) -> Self {
        Self {
            status,
            table: None,
            path: None,
        }
    }
}

/// Load the connection config, then fetch and archive through PostgreSQL.
///
/// Configuration errors surface before any connection is attempted.
pub fn run_archive(
    request: &ArchiveRequest,
    config_path: &Path,
    data_root: &Path,
) -> Result<ArchiveReport, ArchiveError> {
    let params = load_connection_params(config_path)?;
    let gateway = PgGateway::new(&params);
    fetch_and_archive(&gateway, request, data_root)
}

/// Fetch one range from `source` and archive it under `data_root`.
pub fn fetch_and_archive(
    source: &dyn RecordSource,
    request: &ArchiveRequest,
    data_root: &Path,
) -> Result<ArchiveReport, ArchiveError> {
    let query = RangeQuery::new(&request.symbol, &request.timeframe, request.interval)?;
    // Validate the layout before touching the source.
    let key = request.archive_key()?;

    info!(
        source = source.name(),
        symbol = %request.symbol,
        timeframe = %request.timeframe,
        start = %request.interval.start(),
        end = %request.interval.end(),
        "fetching bars"
    );

    let raw = match source.fetch(&query) {
        FetchOutcome::Unreachable(err) => {
            return Ok(ArchiveReport::without_table(ArchiveStatus::Unreachable(err)));
        }
        FetchOutcome::QueryFailed(err) => {
            warn!("No data returned from the query.");
            return Ok(ArchiveReport::without_table(ArchiveStatus::QueryFailed(err)));
        }
        FetchOutcome::Rows(raw) => raw,
    };

    let Some(table) = ResultTable::assemble(raw.labels, raw.rows)? else {
        warn!("No data returned from the query.");
        return Ok(ArchiveReport::without_table(ArchiveStatus::NoData));
    };
    info!(
        "Fetched {} rows for {}-{}.",
        table.len(),
        request.symbol,
        request.timeframe
    );

    let path = archive_path(data_root, &key);
    write_table(&table, &path)?;
    // An archive is only left behind together with its sidecar.
    if let Err(e) = record_meta(request, &table, &path) {
        let _ = fs::remove_file(&path);
        let _ = fs::remove_file(meta_path(&path));
        return Err(e.into());
    }
    info!("Data saved to: {}", path.display());

    Ok(ArchiveReport {
        status: ArchiveStatus::Archived { rows: table.len() },
        table: Some(table),
        path: Some(path),
    })
}

fn record_meta(
    request: &ArchiveRequest,
    table: &ResultTable,
    path: &Path,
) -> Result<PathBuf, PersistError> {
    let meta = ArchiveMeta {
        symbol: request.symbol.clone(),
        source: request.source.clone(),
        timeframe: request.timeframe.clone(),
        start_ns: request.interval.start_ns,
        end_ns: request.interval.end_ns,
        row_count: table.len(),
        columns: table.labels().to_vec(),
        data_hash: file_hash(path)?,
        archived_at: Utc::now(),
    };
    write_meta(path, &meta)
}
