//! Driver abstraction for prepared-statement resources.
//!
//! This module defines the narrow interface the statement scope consumes.
//! Connection management, SQL preparation, and transaction demarcation live
//! with the caller; fluex only drives an already-prepared statement through
//! binding, execution, cursor traversal, and release.
//!
//! # Example
//!
//! ```rust,ignore
//! use fluex_rs::driver::{ExecOutcome, StatementDriver};
//! use fluex_rs::Statement;
//!
//! // A driver wraps the vendor's prepared-statement resource.
//! let driver = MyVendorDriver::prepare(&conn, "SELECT id, name FROM users")?;
//!
//! // The scope takes exclusive ownership of it.
//! let mut stmt = Statement::new(driver);
//! ```

pub mod protocol;

// Re-export commonly used types
pub use protocol::{
    ExecOutcome, FetchDirection, StatementAttrs, StatementDriver, DEFAULT_FETCH_SIZE,
};
