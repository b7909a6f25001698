//! Property tests for the pipeline's pure parts.
//!
//! Uses proptest to verify:
//! 1. Path derivation is deterministic and never renders a colon
//! 2. The range predicate is exactly `start <= t < end` on matching keys
//! 3. Epoch nanoseconds survive the trip through ISO-8601 text

use bararchive_core::{
    archive_path, nanos_to_utc, parse_instant_ns, ArchiveKey, QueryInterval, RangeQuery,
};
use chrono::SecondsFormat;
use proptest::prelude::*;
use std::path::Path;

// ── Strategies (proptest) ────────────────────────────────────────────

/// Epoch nanoseconds between 1970 and 2200.
fn arb_nanos() -> impl Strategy<Value = i64> {
    0..7_258_118_400_000_000_000_i64
}

fn arb_segment() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{1,12}"
}

// ── 1. Path derivation ───────────────────────────────────────────────

proptest! {
    #[test]
    fn path_is_deterministic_and_colon_free(
        symbol in arb_segment(),
        source in arb_segment(),
        timeframe in arb_segment(),
        start in arb_nanos(),
        end in arb_nanos(),
    ) {
        let key = ArchiveKey::new(
            &symbol, &source, &timeframe, nanos_to_utc(start), nanos_to_utc(end),
        ).unwrap();
        let root = Path::new("data");

        let first = archive_path(root, &key);
        let second = archive_path(root, &key);
        prop_assert_eq!(&first, &second);

        let file_name = first.file_name().unwrap().to_str().unwrap().to_string();
        prop_assert!(!file_name.contains(':'));
        prop_assert!(file_name.ends_with(".parquet"));
        prop_assert!(first.starts_with(root.join(&symbol).join(&source).join(&timeframe)));
    }
}

// ── 2. Range predicate ───────────────────────────────────────────────

proptest! {
    #[test]
    fn predicate_is_half_open(start in arb_nanos(), end in arb_nanos(), t in arb_nanos()) {
        let q = RangeQuery::new("BTCUSD", "1m", QueryInterval::new(start, end)).unwrap();
        prop_assert_eq!(q.matches("BTCUSD", "1m", t), start <= t && t < end);
        prop_assert!(!q.matches("BTCUSD", "1m", end));
        prop_assert!(!q.matches("ETHUSD", "1m", t));
        prop_assert!(!q.matches("BTCUSD", "5m", t));
    }

    #[test]
    fn equal_bounds_match_nothing(start in arb_nanos(), t in arb_nanos()) {
        let q = RangeQuery::new("BTCUSD", "1m", QueryInterval::new(start, start)).unwrap();
        prop_assert!(!q.matches("BTCUSD", "1m", t));
    }
}

// ── 3. ISO-8601 conversion ───────────────────────────────────────────

proptest! {
    #[test]
    fn nanos_survive_iso_text(ns in arb_nanos()) {
        let text = nanos_to_utc(ns).to_rfc3339_opts(SecondsFormat::Nanos, true);
        prop_assert_eq!(parse_instant_ns(&text).unwrap(), ns);
    }
}
