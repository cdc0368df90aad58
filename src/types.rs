//! Common types used throughout the crate
//!
//! Shared type aliases, the dotted field-path accessor, and order-key
//! normalization used by offsets, queries and archive grouping.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

// ============================================================================
// Backoff Type
// ============================================================================

/// Type of backoff for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Constant delay between retries
    Constant,
    /// Linear increase in delay
    Linear,
    /// Exponential increase in delay
    #[default]
    Exponential,
}

// ============================================================================
// Field paths
// ============================================================================

/// Resolve a dotted field path (`"cluster.id"`) inside a JSON document.
///
/// Returns `None` as soon as a segment is missing or the current value is
/// not an object. A present `null` is returned as `Some(Value::Null)`.
pub fn get_path<'a>(doc: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    path.split('.')
        .try_fold(doc, |current, segment| current.as_object()?.get(segment))
}

/// Resolve a dotted path and render the value as a plain string key.
///
/// Strings are returned as-is, numbers and booleans via `to_string`;
/// null, missing, arrays and objects yield `None`.
pub fn get_path_string(doc: &JsonValue, path: &str) -> Option<String> {
    match get_path(doc, path)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ============================================================================
// Order keys
// ============================================================================

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse an order-key value into a UTC instant.
///
/// Accepts RFC 3339, naive date-times (interpreted as UTC) and bare dates.
pub fn parse_order_key(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Compare two order-key values.
///
/// When both sides parse as timestamps they are compared as instants, so
/// `2022-01-01` and `2022-01-01T00:00:00Z` are equal regardless of format.
/// A timestamp orders after any unparseable value; two unparseable values
/// compare as raw strings.
pub fn compare_order_keys(a: &str, b: &str) -> Ordering {
    match (parse_order_key(a), parse_order_key(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

/// Canonical UTC RFC 3339 form of an order-key value.
///
/// `None` when the value is not a recognisable timestamp; such values must
/// never become a cursor.
pub fn canonical_order_key(value: &str) -> Option<String> {
    parse_order_key(value).map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Calendar day (`YYYY-MM-DD`) of an order-key value
pub fn order_key_day(value: &str) -> Option<String> {
    parse_order_key(value).map(|dt| dt.format("%Y-%m-%d").to_string())
}
