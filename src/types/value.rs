//! Dynamic SQL value representation.
//!
//! This module provides the owned value enum used for parameter binding
//! and row extraction, together with the declared-type enum for typed NULLs.

use std::fmt;

/// Declared SQL type, used when binding a NULL without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    /// Boolean
    Boolean,
    /// 64-bit signed integer
    Integer,
    /// 64-bit floating point
    Float,
    /// Character data
    Text,
    /// Raw bytes
    Binary,
    /// JSON document
    Json,
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Boolean => write!(f, "BOOLEAN"),
            SqlType::Integer => write!(f, "INTEGER"),
            SqlType::Float => write!(f, "FLOAT"),
            SqlType::Text => write!(f, "TEXT"),
            SqlType::Binary => write!(f, "BINARY"),
            SqlType::Json => write!(f, "JSON"),
        }
    }
}

/// A dynamically typed SQL value.
///
/// `SqlValue` is the unit of exchange between the statement scope and the
/// driver: parameters are bound as `SqlValue`s and cursor rows are fetched
/// as `Vec<SqlValue>`.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL
    Null,
    /// Boolean value
    Boolean(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Float(f64),
    /// Character data
    Text(String),
    /// Raw bytes
    Binary(Vec<u8>),
    /// JSON document
    Json(serde_json::Value),
}

impl SqlValue {
    /// Name of the value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "NULL",
            SqlValue::Boolean(_) => "BOOLEAN",
            SqlValue::Integer(_) => "INTEGER",
            SqlValue::Float(_) => "FLOAT",
            SqlValue::Text(_) => "TEXT",
            SqlValue::Binary(_) => "BINARY",
            SqlValue::Json(_) => "JSON",
        }
    }

    /// Declared type of this value, `None` for NULL.
    pub fn sql_type(&self) -> Option<SqlType> {
        match self {
            SqlValue::Null => None,
            SqlValue::Boolean(_) => Some(SqlType::Boolean),
            SqlValue::Integer(_) => Some(SqlType::Integer),
            SqlValue::Float(_) => Some(SqlType::Float),
            SqlValue::Text(_) => Some(SqlType::Text),
            SqlValue::Binary(_) => Some(SqlType::Binary),
            SqlValue::Json(_) => Some(SqlType::Json),
        }
    }

    /// Check if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Get the boolean value if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the integer value if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the float value if this is a float or an integer.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Float(f) => Some(*f),
            SqlValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get the string slice if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get the byte slice if this is binary.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SqlValue::Binary(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    /// Get the JSON document if this is JSON.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            SqlValue::Json(j) => Some(j),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Boolean(b) => write!(f, "{}", b),
            SqlValue::Integer(i) => write!(f, "{}", i),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(s) => write!(f, "{}", s),
            SqlValue::Binary(b) => write!(f, "<{} bytes>", b.len()),
            SqlValue::Json(j) => write!(f, "{}", j),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Boolean(value)
    }
}

impl From<i16> for SqlValue {
    fn from(value: i16) -> Self {
        SqlValue::Integer(value as i64)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Integer(value as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        SqlValue::Integer(value as i64)
    }
}

impl From<f32> for SqlValue {
    fn from(value: f32) -> Self {
        SqlValue::Float(value as f64)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Binary(value)
    }
}

impl From<&[u8]> for SqlValue {
    fn from(value: &[u8]) -> Self {
        SqlValue::Binary(value.to_vec())
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(value: serde_json::Value) -> Self {
        SqlValue::Json(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}
