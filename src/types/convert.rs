//! Extraction-side value conversions.
//!
//! The mapping from SQL values to Rust types is authored here as a fixed
//! set of `FromSql` implementations. Nothing is discovered at runtime: a
//! type is extractable exactly when an implementation exists below.

use crate::error::ConversionError;
use crate::types::value::SqlValue;

/// Conversion from a dynamically typed SQL value to a concrete Rust type.
///
/// Used by [`Row::get`](crate::query::Row::get) and
/// [`Row::get_named`](crate::query::Row::get_named).
pub trait FromSql: Sized {
    /// Convert the value, or report why it cannot be converted.
    ///
    /// # Errors
    ///
    /// Returns `ConversionError` on NULL (for non-optional targets), type
    /// mismatch, or numeric overflow.
    fn from_sql(value: &SqlValue) -> Result<Self, ConversionError>;
}

impl FromSql for bool {
    fn from_sql(value: &SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Boolean(b) => Ok(*b),
            SqlValue::Null => Err(ConversionError::UnexpectedNull),
            other => Err(mismatch("bool", other)),
        }
    }
}

impl FromSql for i64 {
    fn from_sql(value: &SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Integer(i) => Ok(*i),
            SqlValue::Null => Err(ConversionError::UnexpectedNull),
            other => Err(mismatch("i64", other)),
        }
    }
}

impl FromSql for i32 {
    fn from_sql(value: &SqlValue) -> Result<Self, ConversionError> {
        narrow_integer(value, "i32")
    }
}

impl FromSql for i16 {
    fn from_sql(value: &SqlValue) -> Result<Self, ConversionError> {
        narrow_integer(value, "i16")
    }
}

impl FromSql for u32 {
    fn from_sql(value: &SqlValue) -> Result<Self, ConversionError> {
        narrow_integer(value, "u32")
    }
}

impl FromSql for u64 {
    fn from_sql(value: &SqlValue) -> Result<Self, ConversionError> {
        narrow_integer(value, "u64")
    }
}

impl FromSql for f64 {
    fn from_sql(value: &SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Float(f) => Ok(*f),
            SqlValue::Integer(i) => Ok(*i as f64),
            SqlValue::Null => Err(ConversionError::UnexpectedNull),
            other => Err(mismatch("f64", other)),
        }
    }
}

impl FromSql for String {
    fn from_sql(value: &SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Text(s) => Ok(s.clone()),
            SqlValue::Null => Err(ConversionError::UnexpectedNull),
            other => Err(mismatch("String", other)),
        }
    }
}

impl FromSql for Vec<u8> {
    fn from_sql(value: &SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Binary(b) => Ok(b.clone()),
            SqlValue::Null => Err(ConversionError::UnexpectedNull),
            other => Err(mismatch("Vec<u8>", other)),
        }
    }
}

impl FromSql for serde_json::Value {
    fn from_sql(value: &SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Json(j) => Ok(j.clone()),
            SqlValue::Null => Err(ConversionError::UnexpectedNull),
            other => Err(mismatch("serde_json::Value", other)),
        }
    }
}

impl FromSql for SqlValue {
    fn from_sql(value: &SqlValue) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

impl<T: FromSql> FromSql for Option<T> {
    fn from_sql(value: &SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql(other).map(Some),
        }
    }
}

fn mismatch(requested: &'static str, actual: &SqlValue) -> ConversionError {
    ConversionError::TypeMismatch {
        requested,
        actual: actual.type_name(),
    }
}

fn narrow_integer<T>(value: &SqlValue, requested: &'static str) -> Result<T, ConversionError>
where
    T: TryFrom<i64>,
{
    match value {
        SqlValue::Integer(i) => {
            T::try_from(*i).map_err(|_| ConversionError::OutOfRange { requested })
        }
        SqlValue::Null => Err(ConversionError::UnexpectedNull),
        other => Err(mismatch(requested, other)),
    }
}
