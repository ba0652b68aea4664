//! Conversion of native result values into JSON-safe values.
//!
//! The conversion is total: a well-formed [`Value`] always converts, never
//! errors. Rules follow the ClickHouse HTTP API conventions — timestamps
//! become ISO-8601 strings, decimals become floats (precision loss accepted),
//! binary blobs become lossy UTF-8 strings, containers convert element-wise.

use crate::value::Value;
use serde_json::{Number, Value as JsonValue};

/// Convert one native value into its JSON representation.
pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Int(v) => JsonValue::Number(Number::from(*v)),
        Value::UInt(v) => JsonValue::Number(Number::from(*v)),
        Value::Float(v) => float_to_json(*v),
        Value::Decimal { digits, scale } => float_to_json(Value::decimal_to_f64(*digits, *scale)),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Bytes(b) => JsonValue::String(String::from_utf8_lossy(b).into_owned()),
        Value::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
        Value::Timestamp(ts) => JsonValue::String(ts.to_rfc3339()),
        Value::Array(items) | Value::Nested(items) => {
            JsonValue::Array(items.iter().map(value_to_json).collect())
        }
    }
}

/// Convert a whole row.
pub fn row_to_json(row: &[Value]) -> JsonValue {
    JsonValue::Array(row.iter().map(value_to_json).collect())
}

// JSON numbers cannot carry NaN or infinity; those fall back to their
// default string form so the conversion stays total.
fn float_to_json(v: f64) -> JsonValue {
    match Number::from_f64(v) {
        Some(n) => JsonValue::Number(n),
        None => JsonValue::String(v.to_string()),
    }
}
