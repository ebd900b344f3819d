//! Lazy row streaming with deferred execution.
//!
//! This module provides the `RowStream` type built by
//! [`Statement::stream`](crate::query::Statement::stream). Construction is
//! free: the statement only executes on the first pull, so a stream that
//! is closed before ever being pulled never touches the database.

use crate::driver::protocol::{ExecOutcome, StatementDriver};
use crate::error::{FluexError, StatementError};
use crate::query::results::Row;
use crate::query::statement::{apply_forward_default, close_scope, ScopeState};
use crate::types::SqlValue;
use futures_util::stream::{self, Stream};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Mapper applied to each fetched row.
pub(crate) type RowMapper<T> = Box<dyn FnMut(&Row<'_>) -> Result<T, FluexError> + Send>;

#[derive(Debug, Clone, Copy, PartialEq)]
enum StreamState {
    /// Built, statement not yet executed
    NotStarted,
    /// Cursor open, rows being pulled
    Active,
    /// Cursor and scope released
    Done,
}

/// Pull-based stream of mapped rows over a deferred execution.
///
/// The first [`next`](RowStream::next) call executes the statement and
/// opens the cursor; each later call fetches one row. Exhaustion, an
/// error, or [`close`](RowStream::close) releases the cursor and the
/// owning statement scope per its auto-close policy.
///
/// # Example
///
/// ```rust,ignore
/// let mut rows = stmt.stream(|row| row.get::<String>(0));
/// while let Some(name) = rows.next().await {
///     println!("{}", name?);
/// }
/// ```
pub struct RowStream<T> {
    driver: Arc<Mutex<dyn StatementDriver>>,
    scope: Arc<ScopeState>,
    map: RowMapper<T>,
    columns: Vec<String>,
    state: StreamState,
}

impl<T> RowStream<T> {
    pub(crate) fn new(
        driver: Arc<Mutex<dyn StatementDriver>>,
        scope: Arc<ScopeState>,
        map: RowMapper<T>,
    ) -> Self {
        Self {
            driver,
            scope,
            map,
            columns: Vec::new(),
            state: StreamState::NotStarted,
        }
    }

    /// Pull the next mapped row.
    ///
    /// The first call executes the statement. Returns `None` once the
    /// cursor is exhausted or the stream was closed; any error releases
    /// the stream before it is yielded, so `next` returns `None` from
    /// then on.
    pub async fn next(&mut self) -> Option<Result<T, FluexError>> {
        loop {
            match self.state {
                StreamState::Done => return None,
                StreamState::NotStarted => {
                    if let Err(e) = self.start().await {
                        return Some(Err(e));
                    }
                }
                StreamState::Active => return self.pull().await,
            }
        }
    }

    /// Release the stream.
    ///
    /// Before the first pull this is purely local: the statement never
    /// executes, only the scope is released per its auto-close policy.
    /// After exhaustion it is a no-op.
    ///
    /// # Errors
    ///
    /// Returns any cursor or scope release failure.
    pub async fn close(&mut self) -> Result<(), FluexError> {
        match self.state {
            StreamState::Done => Ok(()),
            StreamState::NotStarted => {
                self.state = StreamState::Done;
                if self.scope.auto_close() {
                    close_scope(&self.driver, &self.scope).await
                } else {
                    Ok(())
                }
            }
            StreamState::Active => self.finish().await,
        }
    }

    /// Whether the stream has been exhausted or closed.
    pub fn is_done(&self) -> bool {
        self.state == StreamState::Done
    }

    /// Adapt into a [`futures_util::Stream`] of mapped rows.
    pub fn into_stream(self) -> impl Stream<Item = Result<T, FluexError>> + Send
    where
        T: Send,
    {
        stream::unfold(self, |mut rows| async move {
            rows.next().await.map(move |item| (item, rows))
        })
    }

    /// Execute the statement and open the cursor.
    async fn start(&mut self) -> Result<(), FluexError> {
        if self.scope.is_closed() {
            self.state = StreamState::Done;
            return Err(StatementError::Closed.into());
        }
        if let Err(e) = apply_forward_default(&self.driver, &self.scope).await {
            return Err(self.terminate(e.into()).await);
        }
        let outcome = { self.driver.lock().await.execute().await };
        match outcome {
            Ok(ExecOutcome::Cursor { columns }) => {
                debug!(columns = columns.len(), "stream cursor opened");
                self.columns = columns;
                self.scope.set_cursor_open(true);
                self.state = StreamState::Active;
                Ok(())
            }
            Ok(ExecOutcome::Updated { .. }) => {
                Err(self.terminate(StatementError::NoCursor.into()).await)
            }
            Err(e) => Err(self.terminate(e.into()).await),
        }
    }

    /// Fetch and map one row from the open cursor.
    async fn pull(&mut self) -> Option<Result<T, FluexError>> {
        let fetched = { self.driver.lock().await.fetch_row().await };
        match fetched {
            Ok(Some(values)) => match (self.map)(&Row::new(&self.columns, &values)) {
                Ok(value) => Some(Ok(value)),
                Err(e) => Some(Err(self.terminate(e).await)),
            },
            Ok(None) => match self.finish().await {
                Ok(()) => None,
                Err(e) => Some(Err(e)),
            },
            Err(e) => Some(Err(self.terminate(e.into()).await)),
        }
    }

    /// Orderly release after exhaustion or an explicit mid-stream close.
    async fn finish(&mut self) -> Result<(), FluexError> {
        self.state = StreamState::Done;
        let cursor_result = { self.driver.lock().await.close_cursor().await };
        self.scope.set_cursor_open(false);
        let scope_result = if self.scope.auto_close() {
            close_scope(&self.driver, &self.scope).await
        } else {
            Ok(())
        };
        if let Err(cursor_err) = cursor_result {
            if let Err(scope_err) = scope_result {
                warn!(error = %scope_err, "suppressed scope close failure in stream");
            }
            return Err(cursor_err.into());
        }
        scope_result
    }

    /// Release while a traversal error propagates; close failures are
    /// logged, not surfaced.
    async fn terminate(&mut self, primary: FluexError) -> FluexError {
        if self.state == StreamState::Active {
            let result = { self.driver.lock().await.close_cursor().await };
            self.scope.set_cursor_open(false);
            if let Err(e) = result {
                warn!(error = %e, "suppressed cursor close failure in stream");
            }
        }
        self.state = StreamState::Done;
        if self.scope.auto_close() {
            if let Err(e) = close_scope(&self.driver, &self.scope).await {
                warn!(error = %e, "suppressed scope close failure in stream");
            }
        }
        primary
    }
}

impl<T> fmt::Debug for RowStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowStream")
            .field("state", &self.state)
            .field("columns", &self.columns)
            .finish()
    }
}

impl<T> Drop for RowStream<T> {
    fn drop(&mut self) {
        if self.state == StreamState::Active {
            warn!("row stream dropped mid-traversal, cursor may leak");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::protocol::{FetchDirection, StatementAttrs};
    use crate::error::DriverError;
    use crate::types::SqlType;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use mockall::mock;
    use std::time::Duration;

    mock! {
        pub Driver {}

        #[async_trait]
        impl StatementDriver for Driver {
            fn bind_value(&mut self, index: usize, value: &SqlValue) -> Result<(), DriverError>;
            fn bind_null(&mut self, index: usize, sql_type: SqlType) -> Result<(), DriverError>;
            fn add_batch(&mut self) -> Result<(), DriverError>;
            fn attributes(&self) -> StatementAttrs;
            fn set_fetch_size(&mut self, rows: u32) -> Result<(), DriverError>;
            fn set_fetch_direction(&mut self, direction: FetchDirection) -> Result<(), DriverError>;
            fn set_max_rows(&mut self, rows: u64) -> Result<(), DriverError>;
            fn set_query_timeout(&mut self, timeout: Duration) -> Result<(), DriverError>;
            async fn execute(&mut self) -> Result<ExecOutcome, DriverError>;
            async fn execute_batch(&mut self) -> Result<Vec<u64>, DriverError>;
            async fn next_result(&mut self) -> Result<Option<ExecOutcome>, DriverError>;
            async fn fetch_row(&mut self) -> Result<Option<Vec<SqlValue>>, DriverError>;
            async fn close_cursor(&mut self) -> Result<(), DriverError>;
            async fn generated_keys(&mut self) -> Result<Option<Vec<String>>, DriverError>;
            async fn close(&mut self) -> Result<(), DriverError>;
        }
    }

    fn name_stream(driver: MockDriver) -> (RowStream<String>, Arc<ScopeState>) {
        let scope = Arc::new(ScopeState::new());
        let rows = RowStream::new(
            Arc::new(Mutex::new(driver)),
            Arc::clone(&scope),
            Box::new(|row| row.get::<String>(0)),
        );
        (rows, scope)
    }

    fn cursor_driver(rows: Vec<Vec<SqlValue>>) -> MockDriver {
        let mut driver = MockDriver::new();
        driver
            .expect_attributes()
            .returning(StatementAttrs::default);
        driver
            .expect_execute()
            .times(1)
            .returning(|| Ok(ExecOutcome::cursor(vec!["name".to_string()])));
        let mut remaining = rows.into_iter().map(Some).chain(std::iter::once(None));
        driver
            .expect_fetch_row()
            .returning(move || Ok(remaining.next().flatten()));
        driver
    }

    #[tokio::test]
    async fn test_close_before_first_pull_never_executes() {
        // No execute expectation: any execution would panic the mock.
        let mut driver = MockDriver::new();
        driver.expect_close().times(1).returning(|| Ok(()));

        let (mut rows, scope) = name_stream(driver);
        rows.close().await.unwrap();
        assert!(rows.is_done());
        assert!(scope.is_closed());
        assert!(rows.next().await.is_none());
    }

    #[tokio::test]
    async fn test_first_pull_executes_and_yields_rows() {
        let mut driver = cursor_driver(vec![
            vec![SqlValue::Text("ada".to_string())],
            vec![SqlValue::Text("grace".to_string())],
        ]);
        driver.expect_close_cursor().times(1).returning(|| Ok(()));
        driver.expect_close().times(1).returning(|| Ok(()));

        let (mut rows, scope) = name_stream(driver);
        assert_eq!(rows.next().await.unwrap().unwrap(), "ada");
        assert_eq!(rows.next().await.unwrap().unwrap(), "grace");
        assert!(rows.next().await.is_none());
        assert!(scope.is_closed());

        // Closing after exhaustion must not release anything again.
        rows.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_update_outcome_fails_first_pull() {
        let mut driver = MockDriver::new();
        driver
            .expect_attributes()
            .returning(StatementAttrs::default);
        driver
            .expect_execute()
            .times(1)
            .returning(|| Ok(ExecOutcome::updated(2)));
        driver.expect_close().times(1).returning(|| Ok(()));

        let (mut rows, scope) = name_stream(driver);
        let result = rows.next().await.unwrap();
        assert!(matches!(
            result.unwrap_err(),
            FluexError::Statement(StatementError::NoCursor)
        ));
        assert!(rows.next().await.is_none());
        assert!(scope.is_closed());
    }

    #[tokio::test]
    async fn test_close_mid_traversal_releases_cursor() {
        let mut driver = MockDriver::new();
        driver
            .expect_attributes()
            .returning(StatementAttrs::default);
        driver
            .expect_execute()
            .times(1)
            .returning(|| Ok(ExecOutcome::cursor(vec!["name".to_string()])));
        driver
            .expect_fetch_row()
            .times(1)
            .returning(|| Ok(Some(vec![SqlValue::Text("ada".to_string())])));
        driver.expect_close_cursor().times(1).returning(|| Ok(()));
        driver.expect_close().times(1).returning(|| Ok(()));

        let (mut rows, scope) = name_stream(driver);
        assert_eq!(rows.next().await.unwrap().unwrap(), "ada");
        rows.close().await.unwrap();
        assert!(scope.is_closed());
        assert!(!scope.cursor_open());
    }

    #[tokio::test]
    async fn test_fetch_error_terminates_stream() {
        let mut driver = MockDriver::new();
        driver
            .expect_attributes()
            .returning(StatementAttrs::default);
        driver
            .expect_execute()
            .times(1)
            .returning(|| Ok(ExecOutcome::cursor(vec!["name".to_string()])));
        driver
            .expect_fetch_row()
            .times(1)
            .returning(|| Err(DriverError::Cursor("connection reset".to_string())));
        driver.expect_close_cursor().times(1).returning(|| Ok(()));
        driver.expect_close().times(1).returning(|| Ok(()));

        let (mut rows, scope) = name_stream(driver);
        let result = rows.next().await.unwrap();
        assert!(matches!(result.unwrap_err(), FluexError::Driver(_)));
        assert!(rows.next().await.is_none());
        assert!(scope.is_closed());
    }

    #[tokio::test]
    async fn test_mapper_error_terminates_stream() {
        let mut driver = cursor_driver(vec![vec![SqlValue::Integer(1)]]);
        driver.expect_close_cursor().times(1).returning(|| Ok(()));
        driver.expect_close().times(1).returning(|| Ok(()));

        let (mut rows, scope) = name_stream(driver);
        let result = rows.next().await.unwrap();
        assert!(matches!(result.unwrap_err(), FluexError::Conversion(_)));
        assert!(rows.next().await.is_none());
        assert!(scope.is_closed());
    }

    #[tokio::test]
    async fn test_without_auto_close_scope_survives_exhaustion() {
        let mut driver = cursor_driver(vec![vec![SqlValue::Text("ada".to_string())]]);
        driver.expect_close_cursor().times(1).returning(|| Ok(()));

        let (mut rows, scope) = name_stream(driver);
        scope.set_auto_close(false);
        assert_eq!(rows.next().await.unwrap().unwrap(), "ada");
        assert!(rows.next().await.is_none());
        assert!(!scope.is_closed());
        assert!(!scope.cursor_open());
    }

    #[tokio::test]
    async fn test_into_stream_yields_all_rows() {
        let mut driver = cursor_driver(vec![
            vec![SqlValue::Text("ada".to_string())],
            vec![SqlValue::Text("grace".to_string())],
        ]);
        driver.expect_close_cursor().times(1).returning(|| Ok(()));
        driver.expect_close().times(1).returning(|| Ok(()));

        let (rows, _) = name_stream(driver);
        let collected: Vec<String> = rows
            .into_stream()
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(collected, vec!["ada".to_string(), "grace".to_string()]);
    }
}
