//! Result-set extraction over an open driver cursor.
//!
//! This module provides the `ResultSet` type returned by a successful
//! cursor execution, plus the borrowed `Row` view handed to row mappers.
//! Every extraction consumes the result set and releases the cursor, on
//! success and on failure alike.

use crate::driver::protocol::StatementDriver;
use crate::error::{ConversionError, FluexError, StatementError};
use crate::query::statement::{close_scope, ScopeState};
use crate::types::{FromSql, SqlValue};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{trace, warn};

/// Borrowed view of one fetched row.
///
/// Column access is 0-based, either by position or by name.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    values: &'a [SqlValue],
}

impl<'a> Row<'a> {
    pub(crate) fn new(columns: &'a [String], values: &'a [SqlValue]) -> Self {
        Self { columns, values }
    }

    /// Number of columns in the row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column names, in cursor order.
    pub fn columns(&self) -> &[String] {
        self.columns
    }

    /// Raw values, in cursor order.
    pub fn values(&self) -> &[SqlValue] {
        self.values
    }

    /// Get a typed value by 0-based column position.
    ///
    /// # Errors
    ///
    /// Returns a conversion error if the position is out of bounds or the
    /// value does not convert to `T`.
    pub fn get<T: FromSql>(&self, index: usize) -> Result<T, FluexError> {
        let value = self
            .values
            .get(index)
            .ok_or(ConversionError::ColumnOutOfBounds(index))?;
        Ok(T::from_sql(value)?)
    }

    /// Get a typed value by column name.
    ///
    /// # Errors
    ///
    /// Returns a conversion error if no column carries the name or the
    /// value does not convert to `T`.
    pub fn get_named<T: FromSql>(&self, name: &str) -> Result<T, FluexError> {
        let index = self
            .columns
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| ConversionError::NoSuchColumn(name.to_string()))?;
        self.get(index)
    }

    /// Raw value by 0-based column position.
    pub fn raw(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Copy the row into a column-name-to-value map.
    pub fn to_map(&self) -> HashMap<String, SqlValue> {
        self.columns
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }
}

/// Open cursor produced by a cursor execution.
///
/// A `ResultSet` must be consumed by exactly one extraction method. Each
/// extraction drains what it needs, closes the cursor, and releases the
/// owning statement scope per its auto-close policy.
///
/// # Example
///
/// ```rust,ignore
/// let names = stmt
///     .query()
///     .await?
///     .list(|row| row.get::<String>(0))
///     .await?;
/// ```
pub struct ResultSet {
    driver: Arc<Mutex<dyn StatementDriver>>,
    scope: Arc<ScopeState>,
    columns: Vec<String>,
}

impl ResultSet {
    pub(crate) fn new(
        driver: Arc<Mutex<dyn StatementDriver>>,
        scope: Arc<ScopeState>,
        columns: Vec<String>,
    ) -> Self {
        Self {
            driver,
            scope,
            columns,
        }
    }

    /// Column names of the cursor, in database order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Extract at most one row.
    ///
    /// # Returns
    ///
    /// `None` for an empty cursor, `Some(mapped)` for exactly one row.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::NonUniqueResult` if a second row exists.
    /// The cursor is released either way.
    pub async fn optional<T, F>(mut self, mut map: F) -> Result<Option<T>, FluexError>
    where
        F: FnMut(&Row<'_>) -> Result<T, FluexError>,
    {
        let result = self.extract_optional(&mut map).await;
        self.release(result).await
    }

    /// Extract exactly one row.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::NoRows` for an empty cursor and
    /// `StatementError::NonUniqueResult` if a second row exists. The
    /// cursor is released either way.
    pub async fn single<T, F>(mut self, mut map: F) -> Result<T, FluexError>
    where
        F: FnMut(&Row<'_>) -> Result<T, FluexError>,
    {
        let result = match self.extract_optional(&mut map).await {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(StatementError::NoRows.into()),
            Err(e) => Err(e),
        };
        self.release(result).await
    }

    /// Extract every row in cursor order.
    pub async fn list<T, F>(mut self, mut map: F) -> Result<Vec<T>, FluexError>
    where
        F: FnMut(&Row<'_>) -> Result<T, FluexError>,
    {
        let result = self.extract_list(&mut map, &mut |_| true, None).await;
        self.release(result).await
    }

    /// Extract rows that pass a predicate, optionally capped.
    ///
    /// # Arguments
    ///
    /// * `map` - Row mapper applied to each fetched row
    /// * `keep` - Predicate over the mapped value
    /// * `cap` - Maximum kept values; `Some(0)` yields an empty list
    ///   without fetching
    ///
    /// Fetching stops as soon as the cap is reached.
    pub async fn list_filtered<T, F, P>(
        mut self,
        mut map: F,
        mut keep: P,
        cap: Option<usize>,
    ) -> Result<Vec<T>, FluexError>
    where
        F: FnMut(&Row<'_>) -> Result<T, FluexError>,
        P: FnMut(&T) -> bool,
    {
        let result = self.extract_list(&mut map, &mut keep, cap).await;
        self.release(result).await
    }

    /// Visit every row in cursor order.
    ///
    /// # Returns
    ///
    /// The number of rows visited.
    pub async fn for_each<F>(mut self, mut visit: F) -> Result<u64, FluexError>
    where
        F: FnMut(&Row<'_>) -> Result<(), FluexError>,
    {
        let result = self.extract_for_each(&mut visit).await;
        self.release(result).await
    }

    /// Count the remaining rows by draining the cursor.
    pub async fn count(mut self) -> Result<u64, FluexError> {
        let result = self.extract_for_each(&mut |_| Ok(())).await;
        self.release(result).await
    }

    /// Check whether the cursor has at least one row.
    ///
    /// Fetches at most one row.
    pub async fn exists(mut self) -> Result<bool, FluexError> {
        let result = match self.fetch().await {
            Ok(row) => Ok(row.is_some()),
            Err(e) => Err(e),
        };
        self.release(result).await
    }

    async fn extract_optional<T, F>(&mut self, map: &mut F) -> Result<Option<T>, FluexError>
    where
        F: FnMut(&Row<'_>) -> Result<T, FluexError>,
    {
        let first = match self.fetch().await? {
            Some(values) => values,
            None => return Ok(None),
        };
        let mapped = map(&Row::new(&self.columns, &first))?;
        // One probe decides uniqueness, the row itself is discarded.
        if self.fetch().await?.is_some() {
            return Err(StatementError::NonUniqueResult.into());
        }
        Ok(Some(mapped))
    }

    async fn extract_list<T, F, P>(
        &mut self,
        map: &mut F,
        keep: &mut P,
        cap: Option<usize>,
    ) -> Result<Vec<T>, FluexError>
    where
        F: FnMut(&Row<'_>) -> Result<T, FluexError>,
        P: FnMut(&T) -> bool,
    {
        let mut values = Vec::new();
        if cap == Some(0) {
            return Ok(values);
        }
        while let Some(fetched) = self.fetch().await? {
            let mapped = map(&Row::new(&self.columns, &fetched))?;
            if keep(&mapped) {
                values.push(mapped);
            }
            if cap.is_some_and(|cap| values.len() >= cap) {
                break;
            }
        }
        trace!(rows = values.len(), "listed cursor rows");
        Ok(values)
    }

    async fn extract_for_each<F>(&mut self, visit: &mut F) -> Result<u64, FluexError>
    where
        F: FnMut(&Row<'_>) -> Result<(), FluexError>,
    {
        let mut visited = 0u64;
        while let Some(fetched) = self.fetch().await? {
            visit(&Row::new(&self.columns, &fetched))?;
            visited += 1;
        }
        Ok(visited)
    }

    async fn fetch(&mut self) -> Result<Option<Vec<SqlValue>>, FluexError> {
        let fetched = { self.driver.lock().await.fetch_row().await }?;
        Ok(fetched)
    }

    /// Release the cursor and, per the auto-close policy, the scope.
    ///
    /// On a successful extraction any release failure propagates; while
    /// an extraction error propagates, release failures are logged and
    /// suppressed.
    async fn release<T>(self, result: Result<T, FluexError>) -> Result<T, FluexError> {
        let cursor_result = { self.driver.lock().await.close_cursor().await };
        self.scope.set_cursor_open(false);
        let scope_result = if self.scope.auto_close() {
            close_scope(&self.driver, &self.scope).await
        } else {
            Ok(())
        };
        match result {
            Ok(value) => {
                cursor_result?;
                scope_result?;
                Ok(value)
            }
            Err(primary) => {
                if let Err(e) = cursor_result {
                    warn!(error = %e, "suppressed cursor close failure during extraction error");
                }
                if let Err(e) = scope_result {
                    warn!(error = %e, "suppressed scope close failure during extraction error");
                }
                Err(primary)
            }
        }
    }
}

impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("columns", &self.columns)
            .field("cursor_open", &self.scope.cursor_open())
            .finish()
    }
}

impl Drop for ResultSet {
    fn drop(&mut self) {
        if self.scope.cursor_open() {
            warn!("result set dropped without extraction, cursor may leak");
        }
    }
}
