//! SQL value model and type conversions.
//!
//! This module provides the dynamically typed value enum exchanged with the
//! driver and the statically authored conversion table between SQL values
//! and Rust types:
//! - `value` - `SqlValue` and the declared-type enum `SqlType`
//! - `convert` - `FromSql` extraction conversions

pub mod convert;
pub mod value;

// Re-export commonly used types
pub use convert::FromSql;
pub use value::{SqlType, SqlValue};
