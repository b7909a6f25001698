//! End-to-end tests for the fetch-and-archive pipeline.
//!
//! An in-memory bar table stands in for PostgreSQL and applies the same
//! selection the SQL expresses, so these run without a database.

use bararchive_core::{
    fetch_and_archive, read_meta, read_table, run_archive, ArchiveError, ArchiveRequest,
    ArchiveStatus, CellValue, ConfigError, FetchOutcome, RangeQuery, RawRows, RecordSource,
    DEFAULT_SOURCE,
};
use std::cell::Cell;
use std::path::{Path, PathBuf};

const T0: i64 = 1_531_553_400_000_000_000; // 2018-07-14T07:30:00Z
const MINUTE: i64 = 60_000_000_000;

struct StoredBar {
    symbol: &'static str,
    timeframe: &'static str,
    open_time: i64,
    close: f64,
}

/// In-memory stand-in for the bar table.
struct MemoryBars {
    bars: Vec<StoredBar>,
    fetches: Cell<usize>,
}

impl MemoryBars {
    fn new(bars: Vec<StoredBar>) -> Self {
        Self {
            bars,
            fetches: Cell::new(0),
        }
    }
}

impl RecordSource for MemoryBars {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(&self, query: &RangeQuery) -> FetchOutcome {
        self.fetches.set(self.fetches.get() + 1);
        let mut hits: Vec<&StoredBar> = self
            .bars
            .iter()
            .filter(|b| query.matches(b.symbol, b.timeframe, b.open_time))
            .collect();
        hits.sort_by_key(|b| b.open_time);

        FetchOutcome::Rows(RawRows {
            labels: vec![
                "symbol".into(),
                "timeframe".into(),
                "epoch_open_time".into(),
                "close".into(),
            ],
            rows: hits
                .into_iter()
                .map(|b| {
                    vec![
                        CellValue::Text(b.symbol.into()),
                        CellValue::Text(b.timeframe.into()),
                        CellValue::Int(b.open_time),
                        CellValue::Float(b.close),
                    ]
                })
                .collect(),
        })
    }
}

fn bar(symbol: &'static str, timeframe: &'static str, open_time: i64, close: f64) -> StoredBar {
    StoredBar {
        symbol,
        timeframe,
        open_time,
        close,
    }
}

/// Three BTCUSD 1m bars inside 07:30–07:40, plus neighbours that must not match.
fn seeded_source() -> MemoryBars {
    MemoryBars::new(vec![
        bar("BTCUSD", "1m", T0 + 2 * MINUTE, 6_252.0),
        bar("BTCUSD", "1m", T0, 6_250.0),
        bar("BTCUSD", "1m", T0 + MINUTE, 6_251.0),
        bar("BTCUSD", "1m", T0 - MINUTE, 6_249.0),
        bar("BTCUSD", "1m", T0 + 10 * MINUTE, 6_260.0),
        bar("BTCUSD", "5m", T0, 6_250.0),
        bar("ETHUSD", "1m", T0, 450.0),
    ])
}

fn request(start: &str, end: &str) -> ArchiveRequest {
    ArchiveRequest::from_iso("BTCUSD", DEFAULT_SOURCE, "1m", start, end).unwrap()
}

fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir(root) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.extend(files_under(&path));
        } else {
            out.push(path);
        }
    }
    out
}

#[test]
fn archives_three_bars_at_the_partitioned_path() {
    let dir = tempfile::tempdir().unwrap();
    let source = seeded_source();

    let report = fetch_and_archive(
        &source,
        &request("2018-07-14T07:30:00Z", "2018-07-14T07:40:00Z"),
        dir.path(),
    )
    .unwrap();

    assert_eq!(report.status, ArchiveStatus::Archived { rows: 3 });
    let expected = dir
        .path()
        .join("BTCUSD/bitstamp/1m/2018-07-14_07-30-00_2018-07-14_07-40-00.parquet");
    assert_eq!(report.path.as_deref(), Some(expected.as_path()));
    assert!(expected.exists());

    let table = report.table.unwrap();
    let open_times: Vec<i64> = table
        .column("epoch_open_time")
        .unwrap()
        .into_iter()
        .filter_map(|c| c.as_i64())
        .collect();
    assert_eq!(open_times, vec![T0, T0 + MINUTE, T0 + 2 * MINUTE]);

    let on_disk = read_table(&expected).unwrap();
    assert_eq!(on_disk, table);
}

#[test]
fn sidecar_describes_the_archive() {
    let dir = tempfile::tempdir().unwrap();
    let report = fetch_and_archive(
        &seeded_source(),
        &request("2018-07-14T07:30:00Z", "2018-07-14T07:40:00Z"),
        dir.path(),
    )
    .unwrap();

    let path = report.path.unwrap();
    let meta = read_meta(&path).unwrap();
    assert_eq!(meta.symbol, "BTCUSD");
    assert_eq!(meta.source, "bitstamp");
    assert_eq!(meta.timeframe, "1m");
    assert_eq!(meta.start_ns, T0);
    assert_eq!(meta.end_ns, T0 + 10 * MINUTE);
    assert_eq!(meta.row_count, 3);
    assert_eq!(
        meta.columns,
        vec!["symbol", "timeframe", "epoch_open_time", "close"]
    );
}

#[test]
fn zero_width_interval_finds_nothing_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let source = seeded_source();

    let report = fetch_and_archive(
        &source,
        &request("2018-07-14T07:30:00Z", "2018-07-14T07:30:00Z"),
        dir.path(),
    )
    .unwrap();

    assert_eq!(report.status, ArchiveStatus::NoData);
    assert!(report.table.is_none());
    assert!(files_under(dir.path()).is_empty());
    assert_eq!(source.fetches.get(), 1);
}

#[test]
fn rerun_overwrites_the_same_file() {
    let dir = tempfile::tempdir().unwrap();
    let req = request("2018-07-14T07:30:00Z", "2018-07-14T07:40:00Z");

    let first = fetch_and_archive(&seeded_source(), &req, dir.path()).unwrap();
    let second = fetch_and_archive(&seeded_source(), &req, dir.path()).unwrap();

    assert_eq!(first.path, second.path);
    let parquet_files: Vec<PathBuf> = files_under(dir.path())
        .into_iter()
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("parquet"))
        .collect();
    assert_eq!(parquet_files.len(), 1);
}

#[test]
fn source_label_only_affects_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let req = ArchiveRequest::from_iso(
        "BTCUSD",
        "kraken",
        "1m",
        "2018-07-14T07:30:00Z",
        "2018-07-14T07:40:00Z",
    )
    .unwrap();

    let report = fetch_and_archive(&seeded_source(), &req, dir.path()).unwrap();

    assert_eq!(report.status, ArchiveStatus::Archived { rows: 3 });
    assert!(report
        .path
        .unwrap()
        .starts_with(dir.path().join("BTCUSD/kraken/1m")));
}

#[test]
fn config_missing_password_fails_before_any_connection() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("db_config.json");
    std::fs::write(
        &config,
        r#"{"host":"127.0.0.1","port":5432,"dbname":"market","user":"reader"}"#,
    )
    .unwrap();
    let data_root = dir.path().join("data");

    let err = run_archive(
        &request("2018-07-14T07:30:00Z", "2018-07-14T07:40:00Z"),
        &config,
        &data_root,
    )
    .unwrap_err();

    match err {
        ArchiveError::Config(ConfigError::Invalid { missing }) => {
            assert_eq!(missing, vec!["password"]);
        }
        other => panic!("expected ConfigInvalid, got {other:?}"),
    }
    assert!(!data_root.exists());
}

#[test]
fn unreachable_database_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("db_config.json");
    // Nothing listens on port 1.
    std::fs::write(
        &config,
        r#"{"host":"127.0.0.1","port":1,"dbname":"market","user":"reader","password":"x"}"#,
    )
    .unwrap();
    let data_root = dir.path().join("data");

    let report = run_archive(
        &request("2018-07-14T07:30:00Z", "2018-07-14T07:40:00Z"),
        &config,
        &data_root,
    )
    .unwrap();

    assert!(matches!(report.status, ArchiveStatus::Unreachable(_)));
    assert!(report.table.is_none());
    assert!(!data_root.exists());
}

/// Bars carrying extra columns beyond the three the query filters on.
struct WideBars;

impl RecordSource for WideBars {
    fn name(&self) -> &str {
        "wide"
    }

    fn fetch(&self, _query: &RangeQuery) -> FetchOutcome {
        let day = chrono::NaiveDate::from_ymd_opt(2018, 7, 14).unwrap();
        FetchOutcome::Rows(RawRows {
            labels: vec![
                "symbol".into(),
                "epoch_open_time".into(),
                "trade_date".into(),
                "open".into(),
            ],
            rows: vec![
                vec![
                    CellValue::Text("BTCUSD".into()),
                    CellValue::Int(T0),
                    CellValue::Date(day),
                    CellValue::Text("6250.123456789012345678".into()),
                ],
                vec![
                    CellValue::Text("BTCUSD".into()),
                    CellValue::Int(T0 + MINUTE),
                    CellValue::Date(day),
                    CellValue::Text("NaN".into()),
                ],
            ],
        })
    }
}

#[test]
fn extra_columns_pass_through_unchanged() {
    let dir = tempfile::tempdir().unwrap();

    let report = fetch_and_archive(
        &WideBars,
        &request("2018-07-14T07:30:00Z", "2018-07-14T07:40:00Z"),
        dir.path(),
    )
    .unwrap();

    assert_eq!(report.status, ArchiveStatus::Archived { rows: 2 });
    let on_disk = read_table(report.path.as_deref().unwrap()).unwrap();
    assert_eq!(Some(on_disk), report.table);
}
