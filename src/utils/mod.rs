//! Utility functions and helpers.

pub mod http;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{AppError, Result};

/// Deserialize a loosely-typed upstream scalar into its string form.
///
/// The panel mixes `"123"`, `123` and `null` for the same field.
pub fn loose_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(if b { "1" } else { "0" }.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Parse a required numeric field.
pub fn parse_field<T: FromStr>(
    record: &'static str,
    field: &'static str,
    raw: Option<&str>,
) -> Result<T> {
    let text = non_empty(raw).ok_or_else(|| AppError::field(record, field, "<missing>"))?;
    text.parse()
        .map_err(|_| AppError::field(record, field, text))
}

/// Parse an optional numeric field; missing or blank yields `None`.
pub fn parse_optional<T: FromStr>(
    record: &'static str,
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<T>> {
    match non_empty(raw) {
        None => Ok(None),
        Some(text) => text
            .parse()
            .map(Some)
            .map_err(|_| AppError::field(record, field, text)),
    }
}

/// Parse a `"1"`/`"0"` style flag. Missing means `false`.
pub fn parse_flag(record: &'static str, field: &'static str, raw: Option<&str>) -> Result<bool> {
    match non_empty(raw).map(str::to_ascii_lowercase).as_deref() {
        None | Some("0") | Some("false") => Ok(false),
        Some("1") | Some("true") => Ok(true),
        Some(other) => Err(AppError::field(record, field, other)),
    }
}

/// Parse a Unix epoch seconds string into a UTC timestamp.
pub fn parse_epoch(
    record: &'static str,
    field: &'static str,
    raw: Option<&str>,
) -> Result<DateTime<Utc>> {
    let secs: i64 = parse_field(record, field, raw)?;
    DateTime::from_timestamp(secs, 0).ok_or_else(|| AppError::field(record, field, secs))
}

/// Trimmed, non-empty text field.
pub fn parse_text(raw: Option<&str>) -> Option<String> {
    non_empty(raw).map(str::to_string)
}
