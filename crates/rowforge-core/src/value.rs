use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

/// Value drawn for a single field of a generated row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GeneratedValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Unsigned integer; row ids use the full `u64` range.
    UInt(u64),
    Float(f64),
    Text(String),
    Uuid(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl GeneratedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, GeneratedValue::Null)
    }

    /// Render the value as a single CSV field.
    pub fn to_csv(&self) -> String {
        match self {
            GeneratedValue::Null => String::new(),
            other => other.to_string(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            GeneratedValue::Int(value) => Some(*value as f64),
            GeneratedValue::UInt(value) => Some(*value as f64),
            GeneratedValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GeneratedValue::Int(value) => Some(*value),
            GeneratedValue::UInt(value) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            GeneratedValue::Text(value) | GeneratedValue::Uuid(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            GeneratedValue::Date(value) => Some(*value),
            GeneratedValue::Timestamp(value) => Some(value.date()),
            _ => None,
        }
    }
}

impl fmt::Display for GeneratedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratedValue::Null => f.write_str("null"),
            GeneratedValue::Bool(value) => write!(f, "{value}"),
            GeneratedValue::Int(value) => write!(f, "{value}"),
            GeneratedValue::UInt(value) => write!(f, "{value}"),
            GeneratedValue::Float(value) => write!(f, "{value}"),
            GeneratedValue::Text(value) | GeneratedValue::Uuid(value) => f.write_str(value),
            GeneratedValue::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            GeneratedValue::Time(value) => write!(f, "{}", value.format("%H:%M:%S")),
            GeneratedValue::Timestamp(value) => write!(f, "{}", value.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

impl From<i64> for GeneratedValue {
    fn from(value: i64) -> Self {
        GeneratedValue::Int(value)
    }
}

impl From<u64> for GeneratedValue {
    fn from(value: u64) -> Self {
        GeneratedValue::UInt(value)
    }
}

impl From<bool> for GeneratedValue {
    fn from(value: bool) -> Self {
        GeneratedValue::Bool(value)
    }
}

impl From<&str> for GeneratedValue {
    fn from(value: &str) -> Self {
        GeneratedValue::Text(value.to_string())
    }
}

impl From<String> for GeneratedValue {
    fn from(value: String) -> Self {
        GeneratedValue::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_rendering_leaves_null_empty() {
        assert_eq!(GeneratedValue::Null.to_csv(), "");
        assert_eq!(GeneratedValue::Int(42).to_csv(), "42");
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date");
        assert_eq!(GeneratedValue::Date(date).to_csv(), "2024-02-29");
    }

    #[test]
    fn serializes_untagged() {
        let json = serde_json::to_string(&vec![
            GeneratedValue::Null,
            GeneratedValue::Bool(true),
            GeneratedValue::Text("x".to_string()),
        ])
        .expect("serialize values");
        assert_eq!(json, r#"[null,true,"x"]"#);
    }

    #[test]
    fn unsigned_values_keep_high_bits() {
        let id = (1_u64 << 63) | 5;
        let value = GeneratedValue::from(id);
        assert_eq!(value.to_csv(), id.to_string());
        assert_eq!(value.as_i64(), None);
        assert_eq!(GeneratedValue::UInt(12).as_i64(), Some(12));
    }
}
