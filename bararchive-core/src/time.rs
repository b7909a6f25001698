//! Time bounds: ISO-8601 parsing and the half-open nanosecond interval.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeError {
    #[error("not an ISO-8601 timestamp: '{0}'")]
    Unparseable(String),

    #[error("timestamp '{0}' is outside the representable nanosecond range")]
    OutOfRange(String),
}

/// Parse an ISO-8601 timestamp into a UTC instant.
///
/// Offsets (`Z`, `+02:00`, ...) are honoured and normalized to UTC. A
/// timestamp without an offset, or a bare date, is read as UTC.
pub fn parse_instant(text: &str) -> Result<DateTime<Utc>, TimeError> {
    let s = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive_part = s
        .strip_suffix('Z')
        .or_else(|| s.strip_suffix('z'))
        .unwrap_or(s);

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(naive_part, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(naive_part, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    Err(TimeError::Unparseable(text.to_string()))
}

/// Convert an ISO-8601 timestamp to nanoseconds since the Unix epoch.
///
/// `"2018-07-14T07:30:00Z"` becomes `1_531_553_400_000_000_000`.
pub fn parse_instant_ns(text: &str) -> Result<i64, TimeError> {
    parse_instant(text)?
        .timestamp_nanos_opt()
        .ok_or_else(|| TimeError::OutOfRange(text.to_string()))
}

/// Nanoseconds since the epoch back to a UTC instant.
pub fn nanos_to_utc(ns: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(ns)
}

/// Half-open `[start_ns, end_ns)` range of epoch nanoseconds.
///
/// `start_ns < end_ns` is the caller's business; an interval with
/// `start_ns >= end_ns` simply contains nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryInterval {
    pub start_ns: i64,
    pub end_ns: i64,
}

impl QueryInterval {
    pub fn new(start_ns: i64, end_ns: i64) -> Self {
        Self { start_ns, end_ns }
    }

    /// Build an interval from two ISO-8601 strings.
    pub fn from_iso(start: &str, end: &str) -> Result<Self, TimeError> {
        Ok(Self::new(parse_instant_ns(start)?, parse_instant_ns(end)?))
    }

    pub fn contains(&self, ns: i64) -> bool {
        self.start_ns <= ns && ns < self.end_ns
    }

    pub fn is_empty(&self) -> bool {
        self.start_ns >= self.end_ns
    }

    pub fn start(&self) -> DateTime<Utc> {
        nanos_to_utc(self.start_ns)
    }

    pub fn end(&self) -> DateTime<Utc> {
        nanos_to_utc(self.end_ns)
    }
}
