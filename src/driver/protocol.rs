//! Statement driver abstraction trait.
//!
//! This module defines the `StatementDriver` trait that abstracts the
//! underlying prepared-statement resource. The statement scope drives a
//! single implementation of this trait; it never creates connections or
//! prepares SQL itself.

use crate::error::DriverError;
use crate::types::{SqlType, SqlValue};
use async_trait::async_trait;
use std::time::Duration;

/// Default fetch size applied by drivers that have no better value.
pub const DEFAULT_FETCH_SIZE: u32 = 1000;

/// Cursor traversal direction hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchDirection {
    /// Rows are fetched front to back
    #[default]
    Forward,
    /// Rows are fetched back to front
    Reverse,
    /// The driver has not decided a direction
    Unknown,
}

/// Snapshot of the driver-side statement attributes.
///
/// The statement scope reads this before its first override so the
/// original values can be restored on close.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatementAttrs {
    /// Rows fetched per cursor advance
    pub fetch_size: u32,
    /// Cursor traversal direction
    pub fetch_direction: FetchDirection,
    /// Upper bound on returned rows, 0 for unlimited
    pub max_rows: u64,
    /// Per-execution timeout, zero for none
    pub query_timeout: Duration,
}

impl StatementAttrs {
    /// Create attributes with the library defaults.
    pub fn new() -> Self {
        Self {
            fetch_size: DEFAULT_FETCH_SIZE,
            fetch_direction: FetchDirection::Forward,
            max_rows: 0,
            query_timeout: Duration::ZERO,
        }
    }

    /// Set the fetch size.
    pub fn with_fetch_size(mut self, rows: u32) -> Self {
        self.fetch_size = rows;
        self
    }

    /// Set the fetch direction.
    pub fn with_fetch_direction(mut self, direction: FetchDirection) -> Self {
        self.fetch_direction = direction;
        self
    }

    /// Set the row cap.
    pub fn with_max_rows(mut self, rows: u64) -> Self {
        self.max_rows = rows;
        self
    }

    /// Set the query timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }
}

impl Default for StatementAttrs {
    fn default() -> Self {
        Self::new()
    }
}

/// Narrow interface over a connection-scoped prepared-statement resource.
///
/// Implementations wrap a vendor driver's prepared statement. The scope
/// assumes exclusive ownership of the resource: one open cursor at a time,
/// repositioned by `execute`, `next_result`, and `generated_keys`.
#[async_trait]
pub trait StatementDriver: Send + Sync {
    /// Bind a value to a parameter slot.
    ///
    /// # Arguments
    ///
    /// * `index` - 1-based parameter index, already validated by the scope
    /// * `value` - Value to bind
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if the driver rejects the binding.
    fn bind_value(&mut self, index: usize, value: &SqlValue) -> Result<(), DriverError>;

    /// Bind a NULL with a declared type to a parameter slot.
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if the driver rejects the binding.
    fn bind_null(&mut self, index: usize, sql_type: SqlType) -> Result<(), DriverError>;

    /// Stage the currently bound parameters as one batch unit.
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if staging fails.
    fn add_batch(&mut self) -> Result<(), DriverError>;

    /// Current statement attribute values.
    fn attributes(&self) -> StatementAttrs;

    /// Set the number of rows fetched per cursor advance.
    fn set_fetch_size(&mut self, rows: u32) -> Result<(), DriverError>;

    /// Set the cursor traversal direction.
    fn set_fetch_direction(&mut self, direction: FetchDirection) -> Result<(), DriverError>;

    /// Cap the number of rows any cursor of this statement returns.
    fn set_max_rows(&mut self, rows: u64) -> Result<(), DriverError>;

    /// Set the per-execution timeout enforced by the driver.
    fn set_query_timeout(&mut self, timeout: Duration) -> Result<(), DriverError>;

    /// Execute the statement once.
    ///
    /// # Returns
    ///
    /// An open cursor (with its column names) or an affected-row count.
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if execution fails.
    async fn execute(&mut self) -> Result<ExecOutcome, DriverError>;

    /// Execute all staged batch units.
    ///
    /// # Returns
    ///
    /// Per-unit affected-row counts in staging order.
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if any unit fails.
    async fn execute_batch(&mut self) -> Result<Vec<u64>, DriverError>;

    /// Advance to the next result of a multi-result execution.
    ///
    /// The current cursor must already be closed. Returns `None` when the
    /// result chain is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if the advance fails.
    async fn next_result(&mut self) -> Result<Option<ExecOutcome>, DriverError>;

    /// Fetch the next row of the current cursor.
    ///
    /// # Returns
    ///
    /// The row values, or `None` once the cursor is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if the fetch fails.
    async fn fetch_row(&mut self) -> Result<Option<Vec<SqlValue>>, DriverError>;

    /// Close the current cursor.
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if the close fails.
    async fn close_cursor(&mut self) -> Result<(), DriverError>;

    /// Reposition the current cursor on the generated-key result of the
    /// last update, if the driver produced one.
    ///
    /// # Returns
    ///
    /// Column names of the key cursor, or `None` when no keys exist.
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if the reposition fails.
    async fn generated_keys(&mut self) -> Result<Option<Vec<String>>, DriverError>;

    /// Release the underlying statement resource.
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if the release fails.
    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Result of one statement execution.
#[derive(Debug, Clone)]
pub enum ExecOutcome {
    /// An open row cursor
    Cursor {
        /// Column names of the cursor, in result order
        columns: Vec<String>,
    },
    /// Affected-row count from a data modification
    Updated {
        /// Number of affected rows
        count: u64,
    },
}

impl ExecOutcome {
    /// Create a cursor outcome.
    pub fn cursor(columns: Vec<String>) -> Self {
        Self::Cursor { columns }
    }

    /// Create an update-count outcome.
    pub fn updated(count: u64) -> Self {
        Self::Updated { count }
    }

    /// Check if this outcome is an open cursor.
    pub fn is_cursor(&self) -> bool {
        matches!(self, Self::Cursor { .. })
    }

    /// Check if this outcome is an update count.
    pub fn is_update(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }

    /// Get the cursor column names if this is a cursor.
    pub fn column_names(&self) -> Option<&[String]> {
        match self {
            Self::Cursor { columns } => Some(columns.as_slice()),
            _ => None,
        }
    }

    /// Get the affected-row count if this is an update.
    pub fn update_count(&self) -> Option<u64> {
        match self {
            Self::Updated { count } => Some(*count),
            _ => None,
        }
    }
}
