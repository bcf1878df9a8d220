//! Shared utility functions

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;

/// Format a timestamp as fixed-width RFC 3339 text
///
/// Nine fractional digits are always written so that stored timestamps sort
/// lexicographically in the same order as chronologically, which the
/// `BETWEEN` predicates and `ORDER BY` clauses rely on.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse an RFC 3339 timestamp into UTC
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// Format a calendar date as `YYYY-MM-DD`
pub fn format_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse a `YYYY-MM-DD` calendar date
pub fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
}

/// Encode a list column as a JSON array
pub fn encode_list(items: &[String]) -> String {
    to_json_text(&items)
}

/// Decode a JSON array list column
pub fn decode_list(s: &str) -> Result<Vec<String>, serde_json::Error> {
    serde_json::from_str(s)
}

/// Escape `LIKE` wildcards so `s` matches literally under `ESCAPE '\'`
pub fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Serialize a nested value into embedded JSON text
pub fn to_json_text<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Check that a table or column name is a plain SQL identifier
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
