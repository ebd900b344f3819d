//! Statement execution and result handling.
//!
//! This module provides the fluent execution surface of fluex-rs: the
//! statement scope, batch staging, cursor extraction, lazy row streams,
//! and multi-result walking.
//!
//! # Overview
//!
//! The query module is organized into:
//! - `statement` - Statement scope, parameter binding, and lifecycle
//! - `batch` - Typed row conversion for batch staging
//! - `results` - Cursor extraction and the borrowed row view
//! - `stream` - Lazy row streams with deferred execution
//! - `multi` - Walking executions that produce several results
//!
//! # Example
//!
//! ```rust,ignore
//! use fluex_rs::query::Statement;
//!
//! # async fn example(driver: impl fluex_rs::driver::StatementDriver + 'static)
//! # -> Result<(), fluex_rs::FluexError> {
//! let mut stmt = Statement::new(driver);
//! stmt.bind(1, 18).await?;
//!
//! // Extracting consumes the result set and releases the statement.
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

pub mod batch;
pub mod multi;
pub mod results;
pub mod statement;
pub mod stream;

// Re-export commonly used types
pub use batch::IntoSqlRow;
pub use multi::{MultiResult, MultiResults};
pub use results::{ResultSet, Row};
pub use statement::{CloseHandler, KeyedUpdate, Statement};
pub use stream::RowStream;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        // Verify that key types are exported and accessible
        // This is a compile-time check more than a runtime check
        let _: Option<MultiResult<i64>> = None;
        let _: Option<KeyedUpdate<i64>> = None;
        fn _takes_statement(_stmt: Statement) {}
        fn _takes_result_set(_results: ResultSet) {}
        fn _takes_stream(_rows: RowStream<String>) {}
    }
}
