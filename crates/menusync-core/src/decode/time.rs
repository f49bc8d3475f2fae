//! Timestamp parsing with an ordered list of accepted formats.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Epoch values above this are taken to be milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Formats tried, in order, after RFC 3339 / ISO-8601 with offset.
/// Naive forms are interpreted as UTC.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y/%m/%d %H:%M:%S %z"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];

/// Which parser accepted a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    /// ISO-8601 with offset and optional fractional seconds.
    Iso8601,
    WithOffset(&'static str),
    Naive(&'static str),
    DateOnly(&'static str),
    EpochSeconds,
    EpochMillis,
}

/// Parse a timestamp string, reporting which format matched.
pub fn parse_str(raw: &str) -> Option<(TimestampFormat, DateTime<Utc>)> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some((TimestampFormat::Iso8601, dt.with_timezone(&Utc)));
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some((TimestampFormat::WithOffset(fmt), dt.with_timezone(&Utc)));
        }
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some((TimestampFormat::Naive(fmt), Utc.from_utc_datetime(&naive)));
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return Some((TimestampFormat::DateOnly(fmt), Utc.from_utc_datetime(&midnight)));
            }
        }
    }

    if s.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(epoch) = s.parse::<i64>() {
            return from_epoch(epoch);
        }
    }

    None
}

fn from_epoch(epoch: i64) -> Option<(TimestampFormat, DateTime<Utc>)> {
    if epoch.unsigned_abs() >= EPOCH_MILLIS_THRESHOLD.unsigned_abs() {
        Utc.timestamp_millis_opt(epoch)
            .single()
            .map(|dt| (TimestampFormat::EpochMillis, dt))
    } else {
        Utc.timestamp_opt(epoch, 0)
            .single()
            .map(|dt| (TimestampFormat::EpochSeconds, dt))
    }
}

/// Floats outside the `i64` range would saturate, so they are rejected.
fn float_epoch(f: f64) -> Option<i64> {
    (f.is_finite() && f > i64::MIN as f64 && f < i64::MAX as f64).then(|| f as i64)
}

/// Coercion used by field probes: strings through [`parse_str`], numbers as
/// epoch seconds or milliseconds.
pub fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_str(s).map(|(_, dt)| dt),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(float_epoch))
            .and_then(from_epoch)
            .map(|(_, dt)| dt),
        _ => None,
    }
}
