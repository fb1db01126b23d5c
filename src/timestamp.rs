//! Timestamp parsing and formatting.
//!
//! Everything inside the crate compares `DateTime<Utc>`. Feeds and stores
//! hand us strings in a handful of shapes; these helpers normalise them.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{Error, Result};

/// Layouts tried, in order, for timestamps that carry no UTC offset.
/// Such values are taken to already be in UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse an ISO-8601 timestamp as written to the stores.
///
/// Accepts RFC 3339 (`2024-01-15T12:00:00+00:00`, `...Z`) and the naive
/// `2024-01-15T12:00:00` form produced by tools that do not record an offset.
pub fn parse_iso8601(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    parse_naive(value).ok_or_else(|| Error::InvalidTimestamp(value.to_string()))
}

/// Format a watermark for storage.
pub fn to_iso8601(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

/// Parse a publication date found in a feed.
///
/// RSS mandates RFC 2822 but real feeds are sloppy, so RFC 3339 and a bare
/// `YYYY-MM-DD HH:MM:SS` are accepted too. Returns `None` rather than an
/// error: an unparseable date is treated like a missing one.
pub fn parse_feed_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_naive(value))
}

fn parse_naive(value: &str) -> Option<DateTime<Utc>> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}
