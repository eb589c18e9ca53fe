//! Form value model and dynamic-value coercions.
//!
//! Field values are plain JSON values. A [`FormValues`] map uses key
//! absence for "undefined" and `Value::Null` for "null"; every helper in
//! this module takes `Option<&Value>` so the two stay distinguishable.
//!
//! Numeric coercion goes through `rust_decimal::Decimal`; a value that does
//! not coerce yields `None`, which plays the role of NaN (every ordered
//! comparison against it is false). That includes magnitudes beyond the
//! `Decimal` range of roughly ±7.9e28: `"1e29"` and `1e300` are NaN here.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

/// Current values of a form, keyed by field name.
pub type FormValues = BTreeMap<String, Value>;

/// Build a [`FormValues`] map from a JSON object. Non-objects yield an
/// empty map.
pub fn values_from_json(value: &Value) -> FormValues {
    value
        .as_object()
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

/// Convert a [`FormValues`] map into a JSON object.
pub fn values_to_json(values: &FormValues) -> Value {
    Value::Object(
        values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}

/// Dynamic truthiness: `false`, `0`, `""`, `null` and absent are falsy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Emptiness: absent, null, empty string, empty array, or empty object.
pub fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(Value::Bool(_)) | Some(Value::Number(_)) => false,
    }
}

/// Numeric cast. Returns `None` where a dynamic-language cast yields NaN.
pub fn to_number(value: Option<&Value>) -> Option<Decimal> {
    match value {
        None => None,
        Some(Value::Null) => Some(Decimal::ZERO),
        Some(Value::Bool(b)) => Some(if *b { Decimal::ONE } else { Decimal::ZERO }),
        Some(Value::Number(n)) => number_to_decimal(n),
        Some(Value::String(s)) => parse_decimal(s.trim()),
        Some(Value::Array(items)) => match items.as_slice() {
            [] => Some(Decimal::ZERO),
            [single] if !single.is_array() => to_number(Some(single)),
            _ => None,
        },
        Some(Value::Object(_)) => None,
    }
}

fn number_to_decimal(n: &serde_json::Number) -> Option<Decimal> {
    if let Some(i) = n.as_i64() {
        return Some(Decimal::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Some(Decimal::from(u));
    }
    n.as_f64().and_then(Decimal::from_f64)
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    if s.is_empty() {
        return Some(Decimal::ZERO);
    }
    // Digit separators are not numeric text.
    if s.contains('_') {
        return None;
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

/// Strict equality with numeric normalization: `1` equals `1.0`, absent
/// equals only absent, everything else compares structurally.
pub fn values_equal(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (None, None) => true,
        (None, Some(_)) | (Some(_), None) => false,
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            match (number_to_decimal(a), number_to_decimal(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        (Some(Value::Array(a)), Some(Value::Array(b))) => {
            a.len() == b.len()
                && a
                    .iter()
                    .zip(b.iter())
                    .all(|(x, y)| values_equal(Some(x), Some(y)))
        }
        (Some(a), Some(b)) => a == b,
    }
}

/// String form of a value as a dynamic language would print it.
///
/// Strings are returned verbatim; absent is `"undefined"`.
pub fn display_string(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::Null => String::new(),
                other => display_string(Some(other)),
            })
            .collect::<Vec<_>>()
            .join(","),
        Some(other) => other.to_string(),
    }
}

/// Number of characters (or items, for arrays) in a value, if it has a
/// length.
pub fn value_length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
