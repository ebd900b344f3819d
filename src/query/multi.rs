//! Walking multi-result executions.
//!
//! This module provides the `MultiResults` walker returned by
//! [`Statement::execute_multi`](crate::query::Statement::execute_multi).
//! Stored procedures and statement batches can produce a chain of update
//! counts and cursors; the walker yields them one at a time in
//! database-reported order, holding at most one undelivered result and
//! closing each cursor before advancing past it.

use crate::driver::protocol::{ExecOutcome, StatementDriver};
use crate::error::FluexError;
use crate::query::results::Row;
use crate::query::statement::{close_scope, ScopeState};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// One result of a multi-result execution.
#[derive(Debug, Clone, PartialEq)]
pub enum MultiResult<T> {
    /// Affected-row count of an update result
    Updated(u64),
    /// Mapped rows of a cursor result, empty cursors included
    Rows(Vec<T>),
}

impl<T> MultiResult<T> {
    /// Get the update count, if this is an update result.
    pub fn updated(&self) -> Option<u64> {
        match self {
            Self::Updated(count) => Some(*count),
            Self::Rows(_) => None,
        }
    }

    /// Get the mapped rows, if this is a cursor result.
    pub fn rows(&self) -> Option<&[T]> {
        match self {
            Self::Updated(_) => None,
            Self::Rows(rows) => Some(rows.as_slice()),
        }
    }
}

/// Walker over the result chain of one multi-result execution.
///
/// Each [`next_result`](MultiResults::next_result) call delivers one
/// result. A cursor result is fully materialized and its cursor closed
/// before the walker can advance; once the chain is exhausted the owning
/// statement scope is released per its auto-close policy.
///
/// # Example
///
/// ```rust,ignore
/// let mut results = stmt.execute_multi().await?;
/// while let Some(result) = results.next_result(|row| row.get::<i64>(0)).await? {
///     match result {
///         MultiResult::Updated(count) => println!("updated {count}"),
///         MultiResult::Rows(ids) => println!("fetched {}", ids.len()),
///     }
/// }
/// ```
pub struct MultiResults {
    driver: Arc<Mutex<dyn StatementDriver>>,
    scope: Arc<ScopeState>,
    /// First result, delivered before the driver is asked to advance
    pending: Option<ExecOutcome>,
    finished: bool,
}

impl MultiResults {
    pub(crate) fn new(
        driver: Arc<Mutex<dyn StatementDriver>>,
        scope: Arc<ScopeState>,
        first: ExecOutcome,
    ) -> Self {
        Self {
            driver,
            scope,
            pending: Some(first),
            finished: false,
        }
    }

    /// Whether the result chain has been exhausted or abandoned.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Deliver the next result of the chain.
    ///
    /// # Arguments
    ///
    /// * `map` - Row mapper applied to each row of a cursor result
    ///
    /// # Returns
    ///
    /// `None` once the chain is exhausted; the scope is released per the
    /// auto-close policy at that point.
    ///
    /// # Errors
    ///
    /// Returns the driver or mapper error; the walker finishes and the
    /// scope closes per the auto-close policy.
    pub async fn next_result<T, F>(
        &mut self,
        mut map: F,
    ) -> Result<Option<MultiResult<T>>, FluexError>
    where
        F: FnMut(&Row<'_>) -> Result<T, FluexError>,
    {
        let outcome = match self.advance().await? {
            Some(outcome) => outcome,
            None => return Ok(None),
        };
        match outcome {
            ExecOutcome::Updated { count } => {
                trace!(rows = count, "multi-result update count");
                Ok(Some(MultiResult::Updated(count)))
            }
            ExecOutcome::Cursor { columns } => {
                self.scope.set_cursor_open(true);
                let rows = self.drain_cursor(&columns, &mut map).await?;
                trace!(rows = rows.len(), "multi-result cursor materialized");
                Ok(Some(MultiResult::Rows(rows)))
            }
        }
    }

    /// Advance past the next result without materializing it.
    ///
    /// A cursor result is closed unread.
    ///
    /// # Returns
    ///
    /// `false` once the chain is exhausted.
    pub async fn skip_result(&mut self) -> Result<bool, FluexError> {
        let outcome = match self.advance().await? {
            Some(outcome) => outcome,
            None => return Ok(false),
        };
        if outcome.is_cursor() {
            self.scope.set_cursor_open(true);
            let closed = { self.driver.lock().await.close_cursor().await };
            self.scope.set_cursor_open(false);
            if let Err(e) = closed {
                return self.fail(e.into()).await;
            }
        }
        Ok(true)
    }

    /// Abandon the walker, releasing any pending cursor and the scope.
    ///
    /// Idempotent once the chain finished.
    pub async fn close(&mut self) -> Result<(), FluexError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.pending = None;
        let cursor_result = if self.scope.cursor_open() {
            let result = { self.driver.lock().await.close_cursor().await };
            self.scope.set_cursor_open(false);
            result.map_err(FluexError::from)
        } else {
            Ok(())
        };
        let scope_result = if self.scope.auto_close() {
            close_scope(&self.driver, &self.scope).await
        } else {
            Ok(())
        };
        if let Err(cursor_err) = cursor_result {
            if let Err(scope_err) = scope_result {
                warn!(error = %scope_err, "suppressed scope close failure in multi-result walker");
            }
            return Err(cursor_err);
        }
        scope_result
    }

    /// Take the pending result or ask the driver for the next one.
    ///
    /// Handles chain exhaustion, leaving the walker finished.
    async fn advance(&mut self) -> Result<Option<ExecOutcome>, FluexError> {
        if self.finished {
            return Ok(None);
        }
        let outcome = match self.pending.take() {
            Some(outcome) => Some(outcome),
            None => {
                let advanced = { self.driver.lock().await.next_result().await };
                match advanced {
                    Ok(outcome) => outcome,
                    Err(e) => return self.fail(e.into()).await,
                }
            }
        };
        if outcome.is_none() {
            self.finished = true;
            debug!("multi-result chain exhausted");
            if self.scope.auto_close() {
                close_scope(&self.driver, &self.scope).await?;
            }
        }
        Ok(outcome)
    }

    /// Materialize a cursor result and close its cursor.
    async fn drain_cursor<T, F>(
        &mut self,
        columns: &[String],
        map: &mut F,
    ) -> Result<Vec<T>, FluexError>
    where
        F: FnMut(&Row<'_>) -> Result<T, FluexError>,
    {
        let mut rows = Vec::new();
        loop {
            let fetched = { self.driver.lock().await.fetch_row().await };
            match fetched {
                Ok(Some(values)) => match map(&Row::new(columns, &values)) {
                    Ok(value) => rows.push(value),
                    Err(e) => {
                        self.abandon_cursor().await;
                        return self.fail(e).await;
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    self.abandon_cursor().await;
                    return self.fail(e.into()).await;
                }
            }
        }
        // The cursor is closed before the walker may advance again.
        let closed = { self.driver.lock().await.close_cursor().await };
        self.scope.set_cursor_open(false);
        if let Err(e) = closed {
            return self.fail(e.into()).await;
        }
        Ok(rows)
    }

    /// Finish the walker while an error propagates; scope close failures
    /// are logged, not surfaced.
    async fn fail<T>(&mut self, primary: FluexError) -> Result<T, FluexError> {
        self.finished = true;
        if self.scope.auto_close() {
            if let Err(e) = close_scope(&self.driver, &self.scope).await {
                warn!(error = %e, "suppressed scope close failure in multi-result walker");
            }
        }
        Err(primary)
    }

    /// Best-effort cursor close while an error propagates.
    async fn abandon_cursor(&mut self) {
        let result = { self.driver.lock().await.close_cursor().await };
        self.scope.set_cursor_open(false);
        if let Err(e) = result {
            warn!(error = %e, "suppressed cursor close failure in multi-result walker");
        }
    }
}

impl fmt::Debug for MultiResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiResults")
            .field("finished", &self.finished)
            .field("pending", &self.pending)
            .finish()
    }
}

impl Drop for MultiResults {
    fn drop(&mut self) {
        if !self.finished && self.scope.cursor_open() {
            warn!("multi-result walker dropped with an open cursor");
        }
    }
}
