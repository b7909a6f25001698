//! Record source trait and fetch outcomes.
//!
//! The PostgreSQL gateway is the production implementation; tests plug in
//! in-memory sources. Sources never raise: connection and query problems
//! come back as outcomes so the caller can tell "unreachable" apart from
//! "reachable but nothing usable".

use crate::query::RangeQuery;
use crate::table::Row;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("failed to connect to the database: {0}")]
    ConnectionFailed(String),

    #[error("error executing query: {0}")]
    QueryFailed(String),
}

/// Rows exactly as fetched, with the column labels of the result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRows {
    pub labels: Vec<String>,
    pub rows: Vec<Row>,
}

impl RawRows {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// What a single fetch produced.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// No connection could be opened. There is no table.
    Unreachable(SourceError),
    /// Connected, but the query failed. Treated as zero rows.
    QueryFailed(SourceError),
    /// The query ran; `rows` may be empty.
    Rows(RawRows),
}

/// Anything that can answer a range query over the bar table.
pub trait RecordSource {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Run one range query. Must release any connection before returning.
    fn fetch(&self, query: &RangeQuery) -> FetchOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::CellValue;

    #[test]
    fn header_only_result_is_empty() {
        let raw = RawRows {
            labels: vec!["symbol".into(), "epoch_open_time".into()],
            rows: Vec::new(),
        };
        assert!(raw.is_empty());
        assert!(RawRows::default().is_empty());
    }

    #[test]
    fn rows_are_not_empty() {
        let raw = RawRows {
            labels: vec!["x".into()],
            rows: vec![vec![CellValue::Int(1)]],
        };
        assert!(!raw.is_empty());
    }

    #[test]
    fn error_messages_name_the_stage() {
        assert_eq!(
            SourceError::ConnectionFailed("refused".into()).to_string(),
            "failed to connect to the database: refused"
        );
    }
}
