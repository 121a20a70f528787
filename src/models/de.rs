//! Deserialization helpers shared by the record models.
//!
//! Raw records are derived `Deserialize` structs; [`from_value`] runs them
//! through `serde_path_to_error` so a type error names the field it came
//! from, e.g. `answers[1].value_numeric`.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::SchemaError;

/// Latest year a stored timestamp may carry; later years do not survive an
/// RFC 3339 round trip.
const MAX_YEAR: i32 = 9999;

// ---

/// Deserialize `value` as `T`, reporting failures with their field path.
pub(crate) fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, SchemaError> {
    // ---
    serde_path_to_error::deserialize(value).map_err(|e| {
        let path = e.path().to_string();
        let field = if path == "." { "<record>".to_string() } else { path };
        SchemaError::validation(field, e.into_inner().to_string())
    })
}

/// `deserialize_with` target for optional datetimes in any form
/// [`parse_datetime`] accepts. `null` and absent both give `None`.
pub(crate) fn opt_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    match Option::<Value>::deserialize(deserializer)? {
        None => Ok(None),
        Some(value) => parse_datetime(&value).map(Some).ok_or_else(|| {
            D::Error::custom(format!("must be a datetime in years 0 to {MAX_YEAR}"))
        }),
    }
}

/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS` (taken as UTC), a bare
/// date, or integer epoch seconds. Years outside `0..=9999` are rejected.
pub(crate) fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    // ---
    let parsed = match value {
        Value::Number(n) => n.as_i64().and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        Value::String(s) => parse_datetime_str(s),
        _ => None,
    };
    parsed.filter(|t| (0..=MAX_YEAR).contains(&t.year()))
}

fn parse_datetime_str(s: &str) -> Option<DateTime<Utc>> {
    // ---
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Require a field that the raw record left optional.
pub(crate) fn required<T>(value: Option<T>, field: &str) -> Result<T, SchemaError> {
    value.ok_or_else(|| SchemaError::validation(field, "field required"))
}

/// Trim and bound a required text field.
pub(crate) fn bounded_text(field: &str, raw: String, max_chars: usize) -> Result<String, SchemaError> {
    // ---
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SchemaError::validation(field, "must not be empty"));
    }
    if trimmed.chars().count() > max_chars {
        return Err(SchemaError::validation(
            field,
            format!("must be at most {max_chars} characters"),
        ));
    }
    Ok(trimmed.to_string())
}
