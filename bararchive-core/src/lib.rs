//! bararchive core: fetch a bounded range of bars from PostgreSQL and archive
//! it as a Parquet file under a deterministic, partitioned path.
//!
//! Pipeline, leaf-first:
//! - `config`: connection parameters from a JSON/TOML file
//! - `time`: ISO-8601 → epoch nanoseconds, half-open query interval
//! - `query`: parameterized range selection over `bitstamp_data`
//! - `source` / `postgres`: the record source seam and its PostgreSQL gateway
//! - `table`: raw rows → column-labelled table
//! - `path`: `{root}/{symbol}/{source}/{timeframe}/{start}_{end}.parquet`
//! - `persist`: Parquet writer/reader and metadata sidecar
//! - `archive`: the fetch-and-archive orchestrator

pub mod archive;
pub mod config;
pub mod path;
pub mod persist;
pub mod postgres;
pub mod query;
pub mod source;
pub mod table;
pub mod time;

pub use archive::{
    fetch_and_archive, run_archive, ArchiveError, ArchiveReport, ArchiveRequest, ArchiveStatus,
    DEFAULT_SOURCE,
};
pub use config::{load_connection_params, ConfigError, ConnectionParams};
pub use path::{archive_path, format_instant, ArchiveKey, PathError};
pub use persist::{read_meta, read_table, write_table, ArchiveMeta, PersistError};
pub use postgres::PgGateway;
pub use query::{QueryError, QueryParam, RangeQuery, SampleQuery, BAR_TABLE};
pub use source::{FetchOutcome, RawRows, RecordSource, SourceError};
pub use table::{CellValue, ResultTable, Row, TableError};
pub use time::{nanos_to_utc, parse_instant, parse_instant_ns, QueryInterval, TimeError};
