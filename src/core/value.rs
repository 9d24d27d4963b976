// Copyright 2025 Rowdex Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Value type for Rowdex - runtime values with type information
//!
//! This module provides a unified Value enum that represents column
//! values with full type information, the coercion applied on column
//! assignment (and reused verbatim for key lookups), and the total
//! ordering the index layer sorts by.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use super::error::{Error, Result};
use super::types::DataType;

/// Timestamp formats supported for parsing
/// Order matters - more specific formats first
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z", // RFC3339 with fractional seconds
    "%Y-%m-%dT%H:%M:%S%:z",    // RFC3339
    "%Y-%m-%dT%H:%M:%SZ",      // RFC3339 UTC
    "%Y-%m-%dT%H:%M:%S",       // ISO without timezone
    "%Y-%m-%d %H:%M:%S%.f",    // SQL-style with fractional seconds
    "%Y-%m-%d %H:%M:%S",       // SQL-style
    "%Y-%m-%d",                // Date only
];

/// A runtime value with type information
///
/// Note: Text uses Arc<str> for cheap cloning during record copies.
#[derive(Debug, Clone)]
pub enum Value {
    /// NULL value with optional type hint
    Null(DataType),

    /// 64-bit signed integer
    Integer(i64),

    /// 64-bit floating point
    Float(f64),

    /// UTF-8 text string (Arc for cheap cloning)
    Text(Arc<str>),

    /// Boolean value
    Boolean(bool),

    /// Timestamp (UTC)
    Timestamp(DateTime<Utc>),
}

impl Value {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a NULL value with a type hint
    pub fn null(data_type: DataType) -> Self {
        Value::Null(data_type)
    }

    /// Create an integer value
    pub fn integer(value: i64) -> Self {
        Value::Integer(value)
    }

    /// Create a float value
    pub fn float(value: f64) -> Self {
        Value::Float(value)
    }

    /// Create a text value
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(Arc::from(value.into().as_str()))
    }

    /// Create a boolean value
    pub fn boolean(value: bool) -> Self {
        Value::Boolean(value)
    }

    /// Create a timestamp value
    pub fn timestamp(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }

    // =========================================================================
    // Type accessors
    // =========================================================================

    /// Returns the data type of this value
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null(dt) => *dt,
            Value::Integer(_) => DataType::Integer,
            Value::Float(_) => DataType::Float,
            Value::Text(_) => DataType::Text,
            Value::Boolean(_) => DataType::Boolean,
            Value::Timestamp(_) => DataType::Timestamp,
        }
    }

    /// Returns true if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    // =========================================================================
    // Value extractors
    // =========================================================================

    /// Extract as i64, with type coercion
    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Value::Null(_) => None,
            Value::Integer(v) => Some(*v),
            Value::Float(v) => Some(*v as i64),
            Value::Text(s) => s.parse::<i64>().ok(),
            Value::Boolean(b) => Some(if *b { 1 } else { 0 }),
            Value::Timestamp(t) => Some(t.timestamp()),
        }
    }

    /// Extract as f64, with type coercion
    pub fn as_float64(&self) -> Option<f64> {
        match self {
            Value::Null(_) => None,
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Text(s) => s.parse::<f64>().ok(),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Timestamp(_) => None,
        }
    }

    /// Extract as boolean, with type coercion
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Null(_) => None,
            Value::Integer(v) => Some(*v != 0),
            Value::Float(v) => Some(*v != 0.0),
            Value::Text(s) => {
                let s_ref: &str = s.as_ref();
                if s_ref.eq_ignore_ascii_case("true") || s_ref == "1" {
                    Some(true)
                } else if s_ref.eq_ignore_ascii_case("false") || s_ref == "0" {
                    Some(false)
                } else {
                    None
                }
            }
            Value::Boolean(b) => Some(*b),
            Value::Timestamp(_) => None,
        }
    }

    /// Extract as String, with type coercion
    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::Null(_) => None,
            Value::Integer(v) => Some(v.to_string()),
            Value::Float(v) => Some(format_float(*v)),
            Value::Text(s) => Some(s.to_string()),
            Value::Boolean(b) => Some(if *b { "true" } else { "false" }.to_string()),
            Value::Timestamp(t) => Some(t.to_rfc3339()),
        }
    }

    /// Extract as string reference (avoids clone for Text)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Extract as DateTime<Utc>
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(*t),
            Value::Text(s) => parse_timestamp(s),
            _ => None,
        }
    }

    // =========================================================================
    // Comparison
    // =========================================================================

    /// Total ordering used by the index layer
    ///
    /// NULL sorts before every non-NULL value and equal to NULL; numeric
    /// types compare cross-type through f64. Values of the same coerced
    /// column type always land in a same-type arm.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }

        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => compare_floats(*a, *b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            _ => {
                // Cross-type numeric comparison (integer vs float)
                if self.data_type().is_numeric() && other.data_type().is_numeric() {
                    let v1 = self.as_float64().unwrap_or(0.0);
                    let v2 = other.as_float64().unwrap_or(0.0);
                    return compare_floats(v1, v2);
                }
                // Fall back to string comparison for mixed types
                let s1 = self.as_string().unwrap_or_default();
                let s2 = other.as_string().unwrap_or_default();
                s1.cmp(&s2)
            }
        }
    }

    // =========================================================================
    // Type coercion
    // =========================================================================

    /// Coerce this value to the target data type
    ///
    /// This is the single coercion path: column assignment uses it, and
    /// so does key lookup, so that a key value compares against stored
    /// records in the exact representation assignment would have given
    /// it. Returns an error when no sensible conversion exists.
    pub fn coerce(&self, target: DataType) -> Result<Value> {
        if self.is_null() {
            return Ok(Value::Null(target));
        }
        if self.data_type() == target {
            return Ok(self.clone());
        }

        let fail = || Error::type_conversion(self.data_type().to_string(), target.to_string());

        match target {
            DataType::Integer => self.as_int64().map(Value::Integer).ok_or_else(fail),
            DataType::Float => self.as_float64().map(Value::Float).ok_or_else(fail),
            DataType::Text => self.as_string().map(Value::text).ok_or_else(fail),
            DataType::Boolean => self.as_boolean().map(Value::Boolean).ok_or_else(fail),
            DataType::Timestamp => self.as_timestamp().map(Value::Timestamp).ok_or_else(fail),
            DataType::Null => Ok(Value::Null(DataType::Null)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null(_) => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", format_float(*v)),
            Value::Text(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

/// Parse a timestamp from a string, trying known formats in order
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    for format in TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&dt));
        }
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(d) = NaiveDate::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0)?));
        }
    }
    None
}

/// Compare floats with a total order (NaN sorts last, -0.0 == 0.0)
fn compare_floats(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Format a float the way integers print when the fraction is zero
fn format_float(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.0}", v)
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_data_types() {
        assert_eq!(Value::integer(1).data_type(), DataType::Integer);
        assert_eq!(Value::float(1.5).data_type(), DataType::Float);
        assert_eq!(Value::text("x").data_type(), DataType::Text);
        assert_eq!(Value::boolean(true).data_type(), DataType::Boolean);
        assert_eq!(Value::null(DataType::Text).data_type(), DataType::Text);
        assert!(Value::null(DataType::Integer).is_null());
        assert!(!Value::integer(0).is_null());
    }

    #[test]
    fn test_total_cmp_nulls_first() {
        let null = Value::null(DataType::Integer);
        assert_eq!(null.total_cmp(&Value::integer(-100)), Ordering::Less);
        assert_eq!(Value::integer(-100).total_cmp(&null), Ordering::Greater);
        assert_eq!(null.total_cmp(&Value::null(DataType::Text)), Ordering::Equal);
    }

    #[test]
    fn test_total_cmp_same_type() {
        assert_eq!(Value::integer(1).total_cmp(&Value::integer(2)), Ordering::Less);
        assert_eq!(Value::text("b").total_cmp(&Value::text("a")), Ordering::Greater);
        assert_eq!(
            Value::boolean(false).total_cmp(&Value::boolean(true)),
            Ordering::Less
        );
        assert_eq!(Value::float(1.5).total_cmp(&Value::float(1.5)), Ordering::Equal);
    }

    #[test]
    fn test_total_cmp_cross_numeric() {
        assert_eq!(Value::integer(2).total_cmp(&Value::float(1.5)), Ordering::Greater);
        assert_eq!(Value::float(1.5).total_cmp(&Value::integer(2)), Ordering::Less);
        assert_eq!(Value::integer(2).total_cmp(&Value::float(2.0)), Ordering::Equal);
    }

    #[test]
    fn test_coerce_assignment_path() {
        // Integer column receiving assorted inputs
        assert_eq!(
            Value::text("42").coerce(DataType::Integer).unwrap(),
            Value::integer(42)
        );
        assert_eq!(
            Value::float(3.0).coerce(DataType::Integer).unwrap(),
            Value::integer(3)
        );
        assert_eq!(
            Value::boolean(true).coerce(DataType::Integer).unwrap(),
            Value::integer(1)
        );

        // Text column accepts anything
        assert_eq!(
            Value::integer(7).coerce(DataType::Text).unwrap(),
            Value::text("7")
        );

        // Nulls keep the target hint
        let n = Value::null(DataType::Text).coerce(DataType::Integer).unwrap();
        assert!(n.is_null());
        assert_eq!(n.data_type(), DataType::Integer);

        // Garbage text into a numeric column is an error
        assert!(Value::text("abc").coerce(DataType::Integer).is_err());
    }

    #[test]
    fn test_coerce_timestamp() {
        let v = Value::text("2024-03-01 12:30:00")
            .coerce(DataType::Timestamp)
            .unwrap();
        assert_eq!(v.data_type(), DataType::Timestamp);
        assert!(Value::boolean(true).coerce(DataType::Timestamp).is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-03-01").is_some());
        assert!(parse_timestamp("2024-03-01 12:30:00").is_some());
        assert!(parse_timestamp("2024-03-01T12:30:00").is_some());
        assert!(parse_timestamp("not a date").is_none());
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(Value::float(3.0).to_string(), "3");
        assert_eq!(Value::float(3.25).to_string(), "3.25");
    }
}
