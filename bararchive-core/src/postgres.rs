//! PostgreSQL record source.
//!
//! Each fetch opens one connection, runs one statement, reads every row,
//! and closes the connection whether or not the statement succeeded. The
//! surface is synchronous: sqlx runs on a private current-thread runtime
//! that lives only for the duration of the call.

use crate::config::ConnectionParams;
use crate::query::{describe, QueryParam, RangeQuery, SampleQuery};
use crate::source::{FetchOutcome, RawRows, RecordSource, SourceError};
use crate::table::{CellValue, Row};
use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use sqlx::error::BoxDynError;
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow, PgValueFormat};
use sqlx::types::{JsonValue, Uuid};
use sqlx::{Column, Connection, Postgres, Row as _, TypeInfo, ValueRef};
use tracing::{debug, error, info, warn};

/// Gateway to the bar table in PostgreSQL.
pub struct PgGateway {
    options: PgConnectOptions,
    name: String,
}

impl PgGateway {
    pub fn new(params: &ConnectionParams) -> Self {
        let options = PgConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .database(&params.dbname)
            .username(&params.user)
            .password(&params.password);
        let name = format!(
            "postgres://{}@{}:{}/{}",
            params.user, params.host, params.port, params.dbname
        );
        Self { options, name }
    }

    /// First rows of the bar table, for eyeballing what the database holds.
    pub fn sample(&self, query: &SampleQuery) -> FetchOutcome {
        self.execute(query.sql(), query.params())
    }

    fn execute(&self, sql: &'static str, params: Vec<QueryParam>) -> FetchOutcome {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                let err = SourceError::ConnectionFailed(format!("async runtime: {e}"));
                error!("{err}");
                return FetchOutcome::Unreachable(err);
            }
        };
        runtime.block_on(self.execute_async(sql, params))
    }

    async fn execute_async(&self, sql: &'static str, params: Vec<QueryParam>) -> FetchOutcome {
        let mut conn = match PgConnection::connect_with(&self.options).await {
            Ok(conn) => conn,
            Err(e) => {
                let err = SourceError::ConnectionFailed(e.to_string());
                error!(source = %self.name, "{err}");
                return FetchOutcome::Unreachable(err);
            }
        };
        debug!(source = %self.name, "executing SQL: {}", describe(sql, &params));

        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                QueryParam::Text(s) => query.bind(s),
                QueryParam::BigInt(n) => query.bind(n),
            };
        }
        let fetched = query.fetch_all(&mut conn).await;

        if let Err(e) = conn.close().await {
            warn!(source = %self.name, "error closing connection: {e}");
        }

        let rows = match fetched {
            Ok(rows) => rows,
            Err(e) => {
                let err = SourceError::QueryFailed(e.to_string());
                error!(source = %self.name, "{err}");
                return FetchOutcome::QueryFailed(err);
            }
        };

        match decode_rows(&rows) {
            Ok(raw) => {
                info!(source = %self.name, rows = raw.rows.len(), "query complete");
                FetchOutcome::Rows(raw)
            }
            Err(reason) => {
                let err = SourceError::QueryFailed(reason);
                error!(source = %self.name, "{err}");
                FetchOutcome::QueryFailed(err)
            }
        }
    }
}

impl RecordSource for PgGateway {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, query: &RangeQuery) -> FetchOutcome {
        self.execute(query.sql(), query.params())
    }
}

fn decode_rows(rows: &[PgRow]) -> Result<RawRows, String> {
    let Some(first) = rows.first() else {
        return Ok(RawRows::default());
    };
    let mut labels = Vec::with_capacity(first.columns().len());
    let mut plan = Vec::with_capacity(first.columns().len());
    for col in first.columns() {
        let type_name = col.type_info().name();
        let decoder = ColumnDecoder::for_type(type_name);
        if decoder == ColumnDecoder::Raw {
            warn!(
                column = col.name(),
                pg_type = type_name,
                "no typed decoder for column; storing its raw value as text"
            );
        }
        labels.push(col.name().to_string());
        plan.push(decoder);
    }
    let rows = rows
        .iter()
        .map(|row| decode_row(row, &plan))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RawRows { labels, rows })
}

fn decode_row(row: &PgRow, plan: &[ColumnDecoder]) -> Result<Row, String> {
    row.columns()
        .iter()
        .zip(plan)
        .map(|(col, decoder)| {
            decoder.decode(row, col.ordinal()).map_err(|e| {
                format!(
                    "decode column '{}' ({}): {e}",
                    col.name(),
                    col.type_info().name()
                )
            })
        })
        .collect()
}

/// How one result column is turned into cells, chosen from its PostgreSQL type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnDecoder {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    /// Exact decimal text; `NaN` and `Infinity` included.
    Numeric,
    Text,
    /// PostgreSQL's internal single-byte `"char"`.
    InternalChar,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,
    Uuid,
    Json,
    Bytea,
    /// Anything else: the server's text rendering, or hex of the binary form.
    Raw,
}

impl ColumnDecoder {
    fn for_type(type_name: &str) -> Self {
        match type_name {
            "BOOL" => Self::Bool,
            "INT2" => Self::Int2,
            "INT4" => Self::Int4,
            "INT8" => Self::Int8,
            "FLOAT4" => Self::Float4,
            "FLOAT8" => Self::Float8,
            "NUMERIC" => Self::Numeric,
            // sqlx names BPCHAR "CHAR" and the internal type "\"CHAR\"".
            "TEXT" | "VARCHAR" | "CHAR" | "NAME" => Self::Text,
            "\"CHAR\"" => Self::InternalChar,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "TIMESTAMP" => Self::Timestamp,
            "TIMESTAMPTZ" => Self::TimestampTz,
            "INTERVAL" => Self::Interval,
            "UUID" => Self::Uuid,
            "JSON" | "JSONB" => Self::Json,
            "BYTEA" => Self::Bytea,
            _ => Self::Raw,
        }
    }

    fn decode(self, row: &PgRow, idx: usize) -> Result<CellValue, sqlx::Error> {
        match self {
            Self::Bool => cell(row, idx, CellValue::Bool),
            Self::Int2 => cell(row, idx, |n: i16| CellValue::Int(i64::from(n))),
            Self::Int4 => cell(row, idx, |n: i32| CellValue::Int(i64::from(n))),
            Self::Int8 => cell(row, idx, CellValue::Int),
            Self::Float4 => cell(row, idx, |x: f32| CellValue::Float(f64::from(x))),
            Self::Float8 => cell(row, idx, CellValue::Float),
            Self::Numeric => raw_cell(row, idx, numeric_text),
            Self::Text => cell(row, idx, CellValue::Text),
            Self::InternalChar => cell(row, idx, |c: i8| {
                CellValue::Text(char::from(c.to_ne_bytes()[0]).to_string())
            }),
            Self::Date => cell(row, idx, CellValue::Date),
            Self::Time => cell(row, idx, |t: NaiveTime| CellValue::Text(t.to_string())),
            Self::Timestamp => cell(row, idx, |ts: NaiveDateTime| {
                CellValue::Timestamp(ts.and_utc())
            }),
            Self::TimestampTz => cell::<DateTime<Utc>>(row, idx, CellValue::Timestamp),
            Self::Interval => cell(row, idx, |iv: PgInterval| {
                CellValue::Text(interval_text(&iv))
            }),
            Self::Uuid => cell(row, idx, |id: Uuid| CellValue::Text(id.to_string())),
            Self::Json => cell(row, idx, |v: JsonValue| CellValue::Text(v.to_string())),
            Self::Bytea => cell(row, idx, |bytes: Vec<u8>| CellValue::Text(hex_text(&bytes))),
            Self::Raw => raw_cell(row, idx, |bytes| Ok(hex_text(bytes))),
        }
    }
}

fn cell<'r, T>(
    row: &'r PgRow,
    idx: usize,
    wrap: impl FnOnce(T) -> CellValue,
) -> Result<CellValue, sqlx::Error>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    Ok(row
        .try_get::<Option<T>, _>(idx)?
        .map_or(CellValue::Null, wrap))
}

/// Undecoded value as text. Text-format values are kept as sent; binary ones
/// go through `from_binary`.
fn raw_cell(
    row: &PgRow,
    idx: usize,
    from_binary: impl FnOnce(&[u8]) -> Result<String, String>,
) -> Result<CellValue, sqlx::Error> {
    let value = row.try_get_raw(idx)?;
    if value.is_null() {
        return Ok(CellValue::Null);
    }
    let text = match value.format() {
        PgValueFormat::Text => value.as_str().map(str::to_string),
        PgValueFormat::Binary => value
            .as_bytes()
            .and_then(|bytes| from_binary(bytes).map_err(BoxDynError::from)),
    };
    text.map(CellValue::Text).map_err(sqlx::Error::Decode)
}

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Render PostgreSQL's binary NUMERIC exactly as the server would print it.
///
/// Layout: `ndigits`, `weight`, `sign`, `dscale` (all 16-bit big-endian),
/// then `ndigits` base-10000 digits, most significant first.
fn numeric_text(buf: &[u8]) -> Result<String, String> {
    let word = |i: usize| -> Result<u16, String> {
        buf.get(i * 2..i * 2 + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| format!("numeric value truncated at byte {}", i * 2))
    };
    let ndigits = usize::from(word(0)?);
    let weight = i64::from(i16::from_be_bytes(word(1)?.to_be_bytes()));
    let sign = word(2)?;
    let dscale = usize::from(word(3)?);
    let digits = (0..ndigits)
        .map(|i| word(4 + i))
        .collect::<Result<Vec<u16>, _>>()?;
    let digit = |pos: i64| -> u16 {
        usize::try_from(pos)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        NUMERIC_NEG => out.push('-'),
        NUMERIC_POS => {}
        other => return Err(format!("invalid numeric sign {other:#06x}")),
    }

    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&digit(0).to_string());
        for pos in 1..=weight {
            out.push_str(&format!("{:04}", digit(pos)));
        }
    }

    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut pos = weight + 1;
        while frac.len() < dscale {
            frac.push_str(&format!("{:04}", digit(pos)));
            pos += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }
    Ok(out)
}

/// ISO-8601 duration, e.g. `P1M2DT3.5S`.
fn interval_text(iv: &PgInterval) -> String {
    let sign = if iv.microseconds < 0 { "-" } else { "" };
    let micros = iv.microseconds.unsigned_abs();
    let (secs, frac) = (micros / 1_000_000, micros % 1_000_000);
    let mut out = format!("P{}M{}DT{sign}{secs}", iv.months, iv.days);
    if frac != 0 {
        out.push('.');
        out.push_str(format!("{frac:06}").trim_end_matches('0'));
    }
    out.push('S');
    out
}

/// PostgreSQL's hex output for byte strings: `\x` then two digits per byte.
fn hex_text(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
