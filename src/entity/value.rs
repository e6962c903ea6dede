//! Typed property values

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Declared type of a property value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdmType {
    String,
    Int64,
    Double,
    Boolean,
    Binary,
    DateTime,
}

impl EdmType {
    /// Type name as used by table-storage wire formats
    pub fn name(&self) -> &'static str {
        match self {
            EdmType::String => "Edm.String",
            EdmType::Int64 => "Edm.Int64",
            EdmType::Double => "Edm.Double",
            EdmType::Boolean => "Edm.Boolean",
            EdmType::Binary => "Edm.Binary",
            EdmType::DateTime => "Edm.DateTime",
        }
    }
}

/// A property value; the variant is the declared type and survives round-trips
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EdmValue {
    String(String),
    Int64(i64),
    Double(f64),
    Boolean(bool),
    Binary(Bytes),
    DateTime(DateTime<Utc>),
}

impl EdmValue {
    pub fn edm_type(&self) -> EdmType {
        match self {
            EdmValue::String(_) => EdmType::String,
            EdmValue::Int64(_) => EdmType::Int64,
            EdmValue::Double(_) => EdmType::Double,
            EdmValue::Boolean(_) => EdmType::Boolean,
            EdmValue::Binary(_) => EdmType::Binary,
            EdmValue::DateTime(_) => EdmType::DateTime,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            EdmValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            EdmValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EdmValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            EdmValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            EdmValue::Binary(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            EdmValue::DateTime(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for EdmValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdmValue::String(s) => f.write_str(s),
            EdmValue::Int64(v) => write!(f, "{}", v),
            EdmValue::Double(v) => write!(f, "{}", v),
            EdmValue::Boolean(v) => write!(f, "{}", v),
            EdmValue::Binary(v) => write!(f, "<{} bytes>", v.len()),
            EdmValue::DateTime(v) => f.write_str(&v.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<String> for EdmValue {
    fn from(value: String) -> Self {
        EdmValue::String(value)
    }
}

impl From<&str> for EdmValue {
    fn from(value: &str) -> Self {
        EdmValue::String(value.to_string())
    }
}

impl From<i64> for EdmValue {
    fn from(value: i64) -> Self {
        EdmValue::Int64(value)
    }
}

impl From<i32> for EdmValue {
    fn from(value: i32) -> Self {
        EdmValue::Int64(value as i64)
    }
}

impl From<f64> for EdmValue {
    fn from(value: f64) -> Self {
        EdmValue::Double(value)
    }
}

impl From<bool> for EdmValue {
    fn from(value: bool) -> Self {
        EdmValue::Boolean(value)
    }
}

impl From<Vec<u8>> for EdmValue {
    fn from(value: Vec<u8>) -> Self {
        EdmValue::Binary(Bytes::from(value))
    }
}

impl From<Bytes> for EdmValue {
    fn from(value: Bytes) -> Self {
        EdmValue::Binary(value)
    }
}

impl From<DateTime<Utc>> for EdmValue {
    fn from(value: DateTime<Utc>) -> Self {
        EdmValue::DateTime(value)
    }
}
