//! Timestamp and duration conversions.
//!
//! Backends deliver timestamps as text, frequently zone-less and with more
//! fractional digits than a millisecond clock keeps. Durations arrive either as
//! raw nanoseconds or as labels that were already formatted upstream; the two
//! shapes round differently and each has its own parser here.
//!
//! Nothing in this module fails: malformed input maps to 0 (or the
//! [`NO_VALUE`] placeholder when formatting).

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use tracelens_core::NO_VALUE;

static ZONE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:[Zz]|[+-]\d{2}:?\d{2})$").expect("zone suffix pattern"));

static FRACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\d{2}\.(\d+)").expect("fraction pattern"));

const NANOS_PER_MS: f64 = 1_000_000.0;

/// Parses a textual timestamp into epoch milliseconds, keeping sub-millisecond digits.
///
/// `"2025-01-01 00:00:00.123456"` is read as `2025-01-01T00:00:00.123456Z`.
/// Returns 0 for empty or unparseable input.
pub fn parse_timestamp_ms(value: &str) -> f64 {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let Some(base_ms) = whole_second_ms(trimmed) else {
        return 0.0;
    };

    base_ms + fraction_ms(trimmed)
}

/// Formats a nanosecond duration as a short label.
///
/// Below one second: whole milliseconds when exact, otherwise two decimals.
/// From one second: seconds with two decimals. Non-positive or NaN input
/// yields [`NO_VALUE`].
pub fn format_duration_from_nanos(nanos: f64) -> String {
    if nanos.is_nan() || nanos <= 0.0 {
        return NO_VALUE.to_string();
    }

    let ms = nanos / NANOS_PER_MS;
    if ms < 1000.0 {
        if nanos % NANOS_PER_MS == 0.0 {
            format!("{}ms", ms as u64)
        } else {
            format!("{:.2}ms", ms)
        }
    } else {
        format!("{:.2}s", ms / 1000.0)
    }
}

/// Reads a pre-formatted latency label ("12.5ms", "1.20s") back into milliseconds.
///
/// Bare numbers are taken as milliseconds. The placeholder, empty labels and
/// anything unparseable yield 0.
pub fn parse_latency_ms_from_label(label: &str) -> f64 {
    let label = label.trim();
    if label.is_empty() || label == NO_VALUE {
        return 0.0;
    }

    let (number, scale) = if let Some(prefix) = label.strip_suffix("ms") {
        (prefix, 1.0)
    } else if let Some(prefix) = label.strip_suffix('s') {
        (prefix, 1000.0)
    } else {
        (label, 1.0)
    };

    match number.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value * scale,
        _ => 0.0,
    }
}

/// Whole-second part of the timestamp in milliseconds, read as UTC when zone-less.
fn whole_second_ms(text: &str) -> Option<f64> {
    let normalized = if text.contains(' ') && !text.contains('T') {
        text.replacen(' ', "T", 1)
    } else {
        text.to_string()
    };

    let Some((date, time)) = normalized.split_once('T') else {
        let date = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d").ok()?;
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp() as f64 * 1000.0);
    };

    if ZONE_SUFFIX.is_match(time) {
        // `%z` takes "+0200" and "+02:00" but not "Z".
        let numeric = match normalized.strip_suffix(|c: char| c == 'Z' || c == 'z') {
            Some(base) => format!("{base}+0000"),
            None => normalized.clone(),
        };
        let parsed = DateTime::parse_from_rfc3339(&normalized)
            .or_else(|_| DateTime::parse_from_str(&numeric, "%Y-%m-%dT%H:%M:%S%.f%z"))
            .or_else(|_| DateTime::parse_from_str(&numeric, "%Y-%m-%dT%H:%M%z"))
            .ok()?;
        return Some(parsed.timestamp() as f64 * 1000.0);
    }

    let local = format!("{date}T{time}");
    let parsed = NaiveDateTime::parse_from_str(&local, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(&local, "%Y-%m-%dT%H:%M"))
        .ok()?;
    Some(parsed.and_utc().timestamp() as f64 * 1000.0)
}

/// Fractional seconds read straight from the text, in milliseconds.
fn fraction_ms(text: &str) -> f64 {
    let Some(digits) = FRACTION.captures(text).and_then(|c| c.get(1)) else {
        return 0.0;
    };
    format!("0.{}", digits.as_str())
        .parse::<f64>()
        .map(|fraction| fraction * 1000.0)
        .unwrap_or(0.0)
}
