//! Utility functions and extension traits for reading loosely typed rows.
//!
//! The remote table API returns almost every scalar as a string, and
//! reference columns as `{"link": ..., "value": ...}` objects. These helpers
//! centralize the lenient conversions the engine relies on.

use geojson::JsonValue;

/// Extension trait for lenient reads of JSON values returned by the remote store.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use snowgeo_core::utils::JsonValueExt;
///
/// assert_eq!(json!(" 12.5 ").as_lenient_f64(), Some(12.5));
/// assert_eq!(json!("").as_lenient_f64(), None);
/// assert_eq!(json!({"link": "x", "value": "task"}).reference_value(), Some("task"));
/// ```
pub trait JsonValueExt {
    /// Returns the string if the value is a non-empty string.
    fn as_non_empty_str(&self) -> Option<&str>;

    /// Returns the `value` member of a reference object, or the string itself.
    fn reference_value(&self) -> Option<&str>;

    /// Parses a finite number from a number or a trimmed, non-empty string.
    fn as_lenient_f64(&self) -> Option<f64>;

    /// Parses an integer from a number or a trimmed, non-empty string.
    fn as_lenient_i64(&self) -> Option<i64>;
}

impl JsonValueExt for JsonValue {
    fn as_non_empty_str(&self) -> Option<&str> {
        self.as_str().filter(|s| !s.is_empty())
    }

    fn reference_value(&self) -> Option<&str> {
        match self {
            JsonValue::Object(map) => map.get("value").and_then(JsonValue::as_non_empty_str),
            other => other.as_non_empty_str(),
        }
    }

    fn as_lenient_f64(&self) -> Option<f64> {
        let number = match self {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    trimmed.parse::<f64>().ok()
                }
            },
            _ => None,
        };
        number.filter(|n| n.is_finite())
    }

    fn as_lenient_i64(&self) -> Option<i64> {
        match self {
            JsonValue::Number(n) => n.as_i64(),
            JsonValue::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }
}

/// Reads an optional positive length from a dictionary `max_length` cell.
#[must_use]
pub fn parse_max_length(value: Option<&JsonValue>) -> Option<u32> {
    value
        .and_then(JsonValue::as_lenient_i64)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
}
