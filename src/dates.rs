//! Date parsing for `--lastmod` expressions and EPrints record timestamps.
//!
//! The `--lastmod` option accepts human-friendly descriptions: absolute dates
//! in common formats ("2014-08-29", "12 Dec 2014", "July 4, 2013"), RFC 3339
//! / RFC 2822 timestamps, and simple relative expressions ("2 weeks ago",
//! "yesterday"). EPrints `lastmod` field values use the server's
//! `YYYY-MM-DD HH:MM:SS` form and are treated as UTC.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Error returned when a date expression cannot be understood.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unable to parse date/time expression: \"{expression}\"")]
pub struct DateParseError {
    /// The expression that failed to parse.
    pub expression: String,
}

/// Absolute formats tried, in order, for `--lastmod` values.
const ABSOLUTE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Date-only formats tried for `--lastmod` values (midnight UTC assumed).
const ABSOLUTE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d %b %Y", "%b %d, %Y", "%B %d, %Y", "%d %B %Y"];

fn relative_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::expect_used)]
        let pattern =
            Regex::new(r"(?i)^(\d+)\s+(day|week|month|year)s?\s+ago$").expect("valid regex literal");
        pattern
    })
}

/// Parses a human-written `--lastmod` expression into a UTC instant.
///
/// # Errors
///
/// Returns [`DateParseError`] when no supported format matches.
pub fn parse_lastmod(expression: &str) -> Result<DateTime<Utc>, DateParseError> {
    let text = expression.trim();
    let lowered = text.to_ascii_lowercase();

    match lowered.as_str() {
        "today" | "now" => return Ok(Utc::now()),
        "yesterday" => return Ok(Utc::now() - ChronoDuration::days(1)),
        _ => {}
    }

    if let Some(captures) = relative_pattern().captures(text) {
        let amount: i64 = captures[1].parse().map_err(|_| DateParseError {
            expression: expression.to_string(),
        })?;
        let delta = match captures[2].to_ascii_lowercase().as_str() {
            "day" => ChronoDuration::days(amount),
            "week" => ChronoDuration::weeks(amount),
            "month" => ChronoDuration::days(30 * amount),
            _ => ChronoDuration::days(365 * amount),
        };
        return Ok(Utc::now() - delta);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(text) {
        return Ok(parsed.with_timezone(&Utc));
    }

    parse_absolute(text).ok_or_else(|| DateParseError {
        expression: expression.to_string(),
    })
}

/// Parses an EPrints record timestamp (e.g. a `lastmod` field value).
///
/// Returns `None` for absent or unrecognised values; records without a
/// parseable timestamp are not filtered out.
#[must_use]
pub fn parse_record_datetime(value: &str) -> Option<DateTime<Utc>> {
    parse_absolute(value.trim())
}

fn parse_absolute(text: &str) -> Option<DateTime<Utc>> {
    for format in ABSOLUTE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for format in ABSOLUTE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
        }
    }
    None
}
