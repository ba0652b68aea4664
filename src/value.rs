//! Native result values.
//!
//! A closed tagged union over every kind of value a connection can hand back.
//! Keeping the union closed means the serializer converts it exhaustively —
//! there is no "unknown kind" branch that can fail at runtime.

use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

/// One cell of a query result
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Arbitrary-precision decimal as scaled integer digits:
    /// the numeric value is `digits * 10^-scale`.
    Decimal { digits: i128, scale: u32 },
    String(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Array(Vec<Value>),
    /// Tuple / nested row
    Nested(Vec<Value>),
}

impl Value {
    /// Decimal value as a float. Precision loss past ~15 significant digits
    /// is accepted; the JSON envelope carries decimals as numbers.
    pub fn decimal_to_f64(digits: i128, scale: u32) -> f64 {
        (digits as f64) / 10f64.powi(scale as i32)
    }

    /// UTF-8 byte length of the value's string form. Used for the
    /// `result_bytes` statistic, which is a per-value approximation of the
    /// result size rather than a wire-exact byte count.
    pub fn string_form_len(&self) -> usize {
        self.to_string().len()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Decimal { digits, scale } => {
                write!(f, "{}", Value::decimal_to_f64(*digits, *scale))
            }
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Array(items) | Value::Nested(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}
