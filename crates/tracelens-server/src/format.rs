//! Display rendering of raw span timestamps.

use std::fmt::Write;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use tracelens_cache::TimestampFormatter;
use tracelens_core::NO_VALUE;
use tracelens_engine::parse_timestamp_ms;

/// Renders timestamps in a fixed UTC offset using a chrono format string.
///
/// Empty input renders as the placeholder; unparseable input (or an invalid
/// format string) is passed through unchanged.
pub fn display_formatter(utc_offset_minutes: i32, format: &str) -> TimestampFormatter {
    let offset = FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60))
        .unwrap_or_else(|| Utc.fix());
    let format = format.to_string();

    Arc::new(move |raw: &str| {
        if raw.trim().is_empty() {
            return NO_VALUE.to_string();
        }
        render(raw, offset, &format).unwrap_or_else(|| raw.to_string())
    })
}

fn render(raw: &str, offset: FixedOffset, format: &str) -> Option<String> {
    let ms = parse_timestamp_ms(raw);
    if ms <= 0.0 {
        return None;
    }

    let secs = (ms / 1000.0).floor();
    let nanos = ((ms - secs * 1000.0) * 1_000_000.0).round().min(999_999_999.0);
    let utc = DateTime::from_timestamp(secs as i64, nanos as u32)?;

    let mut out = String::new();
    write!(out, "{}", utc.with_timezone(&offset).format(format)).ok()?;
    Some(out)
}
