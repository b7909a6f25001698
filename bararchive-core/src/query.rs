//! Query construction against the bar table.
//!
//! Every value reaches the database as a bound parameter; the SQL text is
//! fixed per query shape.

use crate::time::QueryInterval;
use std::fmt;
use thiserror::Error;

/// Logical table holding the aggregated bars.
pub const BAR_TABLE: &str = "bitstamp_data";

const RANGE_SQL: &str = "SELECT * FROM bitstamp_data \
     WHERE symbol = $1 AND timeframe = $2 \
     AND epoch_open_time >= $3 AND epoch_open_time < $4 \
     ORDER BY epoch_open_time ASC";

const SAMPLE_SQL: &str = "SELECT * FROM bitstamp_data LIMIT $1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("symbol must not be empty")]
    EmptySymbol,

    #[error("timeframe must not be empty")]
    EmptyTimeframe,
}

/// A value bound to a query placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryParam {
    Text(String),
    BigInt(i64),
}

impl fmt::Display for QueryParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryParam::Text(s) => write!(f, "'{s}'"),
            QueryParam::BigInt(n) => write!(f, "{n}"),
        }
    }
}

/// Selects every bar for one symbol and timeframe whose open time falls in
/// a half-open interval, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeQuery {
    symbol: String,
    timeframe: String,
    interval: QueryInterval,
}

impl RangeQuery {
    pub fn new(
        symbol: impl Into<String>,
        timeframe: impl Into<String>,
        interval: QueryInterval,
    ) -> Result<Self, QueryError> {
        let symbol = symbol.into();
        let timeframe = timeframe.into();
        if symbol.is_empty() {
            return Err(QueryError::EmptySymbol);
        }
        if timeframe.is_empty() {
            return Err(QueryError::EmptyTimeframe);
        }
        Ok(Self {
            symbol,
            timeframe,
            interval,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> &str {
        &self.timeframe
    }

    pub fn interval(&self) -> QueryInterval {
        self.interval
    }

    pub fn sql(&self) -> &'static str {
        RANGE_SQL
    }

    /// Parameters in placeholder order (`$1..$4`).
    pub fn params(&self) -> Vec<QueryParam> {
        vec![
            QueryParam::Text(self.symbol.clone()),
            QueryParam::Text(self.timeframe.clone()),
            QueryParam::BigInt(self.interval.start_ns),
            QueryParam::BigInt(self.interval.end_ns),
        ]
    }

    /// The row predicate the SQL expresses.
    pub fn matches(&self, symbol: &str, timeframe: &str, open_time_ns: i64) -> bool {
        symbol == self.symbol && timeframe == self.timeframe && self.interval.contains(open_time_ns)
    }
}

/// First `limit` rows of the bar table, in whatever order the server returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleQuery {
    limit: i64,
}

impl SampleQuery {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: i64::from(limit),
        }
    }

    pub fn sql(&self) -> &'static str {
        SAMPLE_SQL
    }

    pub fn params(&self) -> Vec<QueryParam> {
        vec![QueryParam::BigInt(self.limit)]
    }
}

/// Render SQL and its bound values for debug logs.
pub fn describe(sql: &str, params: &[QueryParam]) -> String {
    let bound: Vec<String> = params
        .iter()
        .enumerate()
        .map(|(i, p)| format!("${}={p}", i + 1))
        .collect();
    format!("{sql} [{}]", bound.join(", "))
}
