//! Values of statement result rows.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::duration::Duration;

/// A single value in a result row.
///
/// Serialized untagged, so rows read naturally in JSON. Note that on the
/// way back in, timestamp- and duration-shaped strings decode into their
/// typed variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Time(DateTime<Utc>),
    Duration(Duration),
    String(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str(""),
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Integer(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Time(v) => write!(f, "{}", v.to_rfc3339()),
            FieldValue::Duration(v) => write!(f, "{v}"),
            FieldValue::String(v) => f.write_str(v),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Integer(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Time(v)
    }
}

impl From<Duration> for FieldValue {
    fn from(v: Duration) -> Self {
        FieldValue::Duration(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_json() {
        let row = vec![
            FieldValue::from("root"),
            FieldValue::from(true),
            FieldValue::from(Duration::from_hours(24)),
        ];
        let s = serde_json::to_string(&row).unwrap();
        assert_eq!(s, r#"["root",true,"1d"]"#);
    }

    #[test]
    fn test_display() {
        assert_eq!(FieldValue::Null.to_string(), "");
        assert_eq!(FieldValue::from(42i64).to_string(), "42");
        assert_eq!(FieldValue::from("x").to_string(), "x");
    }
}
