//! # fluex-rs
//!
//! Fluent statement-execution and resource-lifecycle core for SQL drivers.
//!
//! This library sits between a fluent query API and a vendor driver. It
//! owns one prepared-statement resource at a time, binds parameters,
//! stages batches, runs executions, and guarantees that cursors and the
//! statement handle are released exactly once no matter how an execution
//! ends. Drivers plug in through the [`driver::StatementDriver`] trait.
//!
//! ## Example
//!
//! ```no_run
//! # use fluex_rs::{FluexError, Statement};
//! # async fn example(driver: impl fluex_rs::driver::StatementDriver + 'static)
//! # -> Result<(), FluexError> {
//! // Wrap a driver-provided prepared statement
//! let mut stmt = Statement::new(driver);
//!
//! // Bind 1-based parameters
//! stmt.bind(1, 18).await?;
//! stmt.bind(2, "nl").await?;
//!
//! // Execute and extract; the statement closes itself afterwards
//! let names = stmt
//!     .query()
//!     .await?
//!     .list(|row| row.get::<String>(0))
//!     .await?;
//!
//! assert!(stmt.is_closed());
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod driver;
pub mod error;
pub mod query;
pub mod types;

// Re-export public API
pub use driver::{ExecOutcome, FetchDirection, StatementAttrs, StatementDriver};
pub use error::{ConversionError, DriverError, ErrorKind, FluexError, StatementError};
pub use query::{
    IntoSqlRow, KeyedUpdate, MultiResult, MultiResults, ResultSet, Row, RowStream, Statement,
};
pub use types::{FromSql, SqlType, SqlValue};
