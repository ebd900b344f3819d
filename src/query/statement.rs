//! Statement scope: parameter binding, execution, and lifecycle ownership.
//!
//! This module provides the `Statement` type, the exclusive owner of one
//! prepared-statement resource. It binds parameters, stages batches, runs
//! executions, and guarantees the resource is released exactly once however
//! an execution ends.

use crate::driver::protocol::{ExecOutcome, FetchDirection, StatementAttrs, StatementDriver};
use crate::error::{DriverError, FluexError, StatementError};
use crate::query::batch::IntoSqlRow;
use crate::query::multi::MultiResults;
use crate::query::results::{ResultSet, Row};
use crate::query::stream::RowStream;
use crate::types::{SqlType, SqlValue};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Callback run while the statement scope closes.
pub type CloseHandler = Box<dyn FnOnce() -> Result<(), FluexError> + Send>;

/// Outcome of an update that also retrieved generated keys.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedUpdate<T> {
    /// Number of affected rows
    pub rows_affected: u64,
    /// Mapped generated-key rows, empty when the driver produced none
    pub keys: Vec<T>,
}

/// Driver-side attribute values captured before the first override.
#[derive(Debug, Default, Clone, Copy)]
struct AttrOriginals {
    fetch_size: Option<u32>,
    fetch_direction: Option<FetchDirection>,
    max_rows: Option<u64>,
    query_timeout: Option<Duration>,
}

/// Lifecycle state shared between a statement and its derived result
/// objects.
///
/// Result sets, row streams, and multi-result walkers keep a reference to
/// the scope so any of them can finish the close the statement started.
pub(crate) struct ScopeState {
    /// Terminal once set
    closed: AtomicBool,
    /// Close the handle after a completed execution
    auto_close: AtomicBool,
    /// A driver cursor is currently open
    cursor_open: AtomicBool,
    /// The caller chose a fetch direction explicitly
    direction_set: AtomicBool,
    originals: StdMutex<AttrOriginals>,
    handlers: StdMutex<Vec<CloseHandler>>,
}

impl ScopeState {
    pub(crate) fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            auto_close: AtomicBool::new(true),
            cursor_open: AtomicBool::new(false),
            direction_set: AtomicBool::new(false),
            originals: StdMutex::new(AttrOriginals::default()),
            handlers: StdMutex::new(Vec::new()),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the scope closed. Returns whether it already was.
    fn mark_closed(&self) -> bool {
        self.closed.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn auto_close(&self) -> bool {
        self.auto_close.load(Ordering::SeqCst)
    }

    pub(crate) fn set_auto_close(&self, enabled: bool) {
        self.auto_close.store(enabled, Ordering::SeqCst);
    }

    pub(crate) fn cursor_open(&self) -> bool {
        self.cursor_open.load(Ordering::SeqCst)
    }

    pub(crate) fn set_cursor_open(&self, open: bool) {
        self.cursor_open.store(open, Ordering::SeqCst);
    }

    fn take_cursor_open(&self) -> bool {
        self.cursor_open.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn direction_set(&self) -> bool {
        self.direction_set.load(Ordering::SeqCst)
    }

    fn mark_direction_set(&self) {
        self.direction_set.store(true, Ordering::SeqCst);
    }

    fn note_fetch_size(&self, original: u32) {
        self.lock_originals().fetch_size.get_or_insert(original);
    }

    pub(crate) fn note_fetch_direction(&self, original: FetchDirection) {
        self.lock_originals()
            .fetch_direction
            .get_or_insert(original);
    }

    fn note_max_rows(&self, original: u64) {
        self.lock_originals().max_rows.get_or_insert(original);
    }

    fn note_query_timeout(&self, original: Duration) {
        self.lock_originals().query_timeout.get_or_insert(original);
    }

    fn take_originals(&self) -> AttrOriginals {
        std::mem::take(&mut *self.lock_originals())
    }

    fn push_handler(&self, handler: CloseHandler) {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    fn take_handlers(&self) -> Vec<CloseHandler> {
        std::mem::take(
            &mut *self
                .handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    fn lock_originals(&self) -> std::sync::MutexGuard<'_, AttrOriginals> {
        self.originals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Close the scope: cursor, attribute restore, driver release, handlers.
///
/// Idempotent. All failures are collected; the first becomes the primary
/// error and the rest are carried as suppressed.
pub(crate) async fn close_scope(
    driver: &Arc<Mutex<dyn StatementDriver>>,
    scope: &ScopeState,
) -> Result<(), FluexError> {
    if scope.mark_closed() {
        return Ok(());
    }
    debug!("closing statement scope");

    let mut failures: Vec<FluexError> = Vec::new();
    {
        let mut driver = driver.lock().await;
        if scope.take_cursor_open() {
            if let Err(e) = driver.close_cursor().await {
                failures.push(e.into());
            }
        }

        let originals = scope.take_originals();
        if let Some(rows) = originals.fetch_size {
            if let Err(e) = driver.set_fetch_size(rows) {
                failures.push(e.into());
            }
        }
        if let Some(direction) = originals.fetch_direction {
            if let Err(e) = driver.set_fetch_direction(direction) {
                failures.push(e.into());
            }
        }
        if let Some(rows) = originals.max_rows {
            if let Err(e) = driver.set_max_rows(rows) {
                failures.push(e.into());
            }
        }
        if let Some(timeout) = originals.query_timeout {
            if let Err(e) = driver.set_query_timeout(timeout) {
                failures.push(e.into());
            }
        }

        if let Err(e) = driver.close().await {
            failures.push(e.into());
        }
    }

    // Handlers run in registration order, each regardless of earlier
    // failures, including failures of the teardown above.
    for handler in scope.take_handlers() {
        if let Err(e) = handler() {
            failures.push(e);
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        let primary = failures.remove(0);
        Err(StatementError::CloseFailed {
            primary: Box::new(primary),
            suppressed: failures,
        }
        .into())
    }
}

/// Force the forward-only default when the caller never chose a direction.
///
/// Runs before every execution. A direction the driver already reports as
/// forward is left untouched; anything else is overridden and recorded for
/// restore on close.
pub(crate) async fn apply_forward_default(
    driver: &Arc<Mutex<dyn StatementDriver>>,
    scope: &ScopeState,
) -> Result<(), DriverError> {
    if scope.direction_set() {
        return Ok(());
    }
    let mut driver = driver.lock().await;
    let current = driver.attributes().fetch_direction;
    if current != FetchDirection::Forward {
        driver.set_fetch_direction(FetchDirection::Forward)?;
        scope.note_fetch_direction(current);
        trace!("forced forward-only fetch direction");
    }
    Ok(())
}

/// Exclusive owner of one prepared-statement resource.
///
/// A `Statement` wraps a caller-supplied [`StatementDriver`] and drives it
/// through binding, execution, and release. Under the default auto-close
/// policy the underlying resource is released as soon as one execution
/// completes; disable it with [`set_auto_close`](Statement::set_auto_close)
/// to reuse the handle for sequential executions.
///
/// # Example
///
/// ```rust,ignore
/// let mut stmt = Statement::new(driver);
/// stmt.bind(1, 18).await?;
/// stmt.bind(2, "nl").await?;
/// let adults = stmt
///     .query()
///     .await?
///     .list(|row| row.get::<String>(1))
///     .await?;
/// assert!(stmt.is_closed());
/// ```
pub struct Statement {
    /// Driver resource, shared with derived result objects
    driver: Arc<Mutex<dyn StatementDriver>>,
    /// Lifecycle state, shared with derived result objects
    scope: Arc<ScopeState>,
    /// Batch units staged and not yet flushed
    staged_units: usize,
}

impl Statement {
    /// Take exclusive ownership of a prepared-statement resource.
    pub fn new(driver: impl StatementDriver + 'static) -> Self {
        Self {
            driver: Arc::new(Mutex::new(driver)),
            scope: Arc::new(ScopeState::new()),
            staged_units: 0,
        }
    }

    /// Check if the scope has been closed.
    pub fn is_closed(&self) -> bool {
        self.scope.is_closed()
    }

    /// Whether the handle closes itself after a completed execution.
    pub fn auto_close(&self) -> bool {
        self.scope.auto_close()
    }

    /// Number of staged, unflushed batch units.
    pub fn staged_units(&self) -> usize {
        self.staged_units
    }

    /// Enable or disable closing the handle after a completed execution.
    ///
    /// Defaults to enabled. With auto-close disabled the handle stays open
    /// across executions until [`close`](Statement::close) is called.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::Closed` if the scope is already closed.
    pub fn set_auto_close(&mut self, enabled: bool) -> Result<(), FluexError> {
        self.ensure_open()?;
        self.scope.set_auto_close(enabled);
        Ok(())
    }

    /// Register a callback to run when the scope closes.
    ///
    /// Handlers run in registration order. Every handler runs even if an
    /// earlier one (or the core teardown) failed; failures are aggregated
    /// into the close error.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::Closed` if the scope is already closed.
    pub fn on_close(
        &mut self,
        handler: impl FnOnce() -> Result<(), FluexError> + Send + 'static,
    ) -> Result<(), FluexError> {
        self.ensure_open()?;
        self.scope.push_handler(Box::new(handler));
        Ok(())
    }

    /// Bind a value to a 1-based parameter slot.
    ///
    /// # Arguments
    ///
    /// * `index` - 1-based parameter index
    /// * `value` - Value to bind (must convert into [`SqlValue`])
    ///
    /// # Errors
    ///
    /// An invalid index or a driver rejection closes the handle before the
    /// error propagates.
    pub async fn bind(
        &mut self,
        index: usize,
        value: impl Into<SqlValue>,
    ) -> Result<(), FluexError> {
        self.ensure_open()?;
        self.check_index(index).await?;
        let value = value.into();
        trace!(index, value = %value, "binding parameter");
        let result = { self.driver.lock().await.bind_value(index, &value) };
        self.fail_binding_on(result).await
    }

    /// Bind a NULL with a declared type to a 1-based parameter slot.
    ///
    /// # Errors
    ///
    /// An invalid index or a driver rejection closes the handle before the
    /// error propagates.
    pub async fn bind_null(&mut self, index: usize, sql_type: SqlType) -> Result<(), FluexError> {
        self.ensure_open()?;
        self.check_index(index).await?;
        trace!(index, sql_type = %sql_type, "binding NULL parameter");
        let result = { self.driver.lock().await.bind_null(index, sql_type) };
        self.fail_binding_on(result).await
    }

    /// Bind a sequence of values to consecutive slots starting at `start`.
    ///
    /// # Errors
    ///
    /// An invalid start index or a driver rejection closes the handle
    /// before the error propagates.
    pub async fn bind_from<I, V>(&mut self, start: usize, values: I) -> Result<(), FluexError>
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.ensure_open()?;
        self.check_index(start).await?;
        let result = {
            let mut driver = self.driver.lock().await;
            let mut outcome = Ok(());
            for (offset, value) in values.into_iter().enumerate() {
                let value = value.into();
                if let Err(e) = driver.bind_value(start + offset, &value) {
                    outcome = Err(e);
                    break;
                }
            }
            outcome
        };
        self.fail_binding_on(result).await
    }

    /// Bind through a caller-supplied callback over the raw driver.
    ///
    /// The callback gets the exclusive driver reference and may bind any
    /// slots it wants.
    ///
    /// # Errors
    ///
    /// A callback failure closes the handle before the error propagates.
    pub async fn bind_with<F>(&mut self, f: F) -> Result<(), FluexError>
    where
        F: FnOnce(&mut dyn StatementDriver) -> Result<(), DriverError>,
    {
        self.ensure_open()?;
        let result = {
            let mut driver = self.driver.lock().await;
            f(&mut *driver)
        };
        self.fail_binding_on(result).await
    }

    /// Stage the currently bound parameters as one batch unit.
    ///
    /// # Errors
    ///
    /// A staging failure closes the handle before the error propagates.
    pub async fn add_batch(&mut self) -> Result<(), FluexError> {
        self.ensure_open()?;
        let result = { self.driver.lock().await.add_batch() };
        match result {
            Ok(()) => {
                self.staged_units += 1;
                trace!(staged = self.staged_units, "staged batch unit");
                Ok(())
            }
            Err(e) => {
                self.force_close().await;
                Err(e.into())
            }
        }
    }

    /// Stage an iterator of typed rows, one batch unit per row.
    ///
    /// Row values bind to slots 1..=N in row order.
    ///
    /// # Errors
    ///
    /// A staging failure closes the handle before the error propagates.
    pub async fn add_batch_rows<I, R>(&mut self, rows: I) -> Result<(), FluexError>
    where
        I: IntoIterator<Item = R>,
        R: IntoSqlRow,
    {
        self.ensure_open()?;
        let mut staged = 0usize;
        let result = {
            let mut driver = self.driver.lock().await;
            let mut outcome = Ok(());
            'rows: for row in rows {
                let values = row.into_row();
                for (offset, value) in values.iter().enumerate() {
                    if let Err(e) = driver.bind_value(offset + 1, value) {
                        outcome = Err(e);
                        break 'rows;
                    }
                }
                if let Err(e) = driver.add_batch() {
                    outcome = Err(e);
                    break 'rows;
                }
                staged += 1;
            }
            outcome
        };
        match result {
            Ok(()) => {
                self.staged_units += staged;
                trace!(staged = self.staged_units, "staged batch rows");
                Ok(())
            }
            Err(e) => {
                self.force_close().await;
                Err(e.into())
            }
        }
    }

    /// Stage an iterator of arbitrary items through an explicit binder.
    ///
    /// The binder receives the driver and one item, binds whatever slots
    /// the item maps to, and the scope stages one batch unit per item.
    ///
    /// # Errors
    ///
    /// A binder or staging failure closes the handle before the error
    /// propagates.
    pub async fn add_batch_with<I, T, F>(&mut self, items: I, mut bind: F) -> Result<(), FluexError>
    where
        I: IntoIterator<Item = T>,
        F: FnMut(&mut dyn StatementDriver, T) -> Result<(), DriverError>,
    {
        self.ensure_open()?;
        let mut staged = 0usize;
        let result = {
            let mut driver = self.driver.lock().await;
            let mut outcome = Ok(());
            for item in items {
                if let Err(e) = bind(&mut *driver, item) {
                    outcome = Err(e);
                    break;
                }
                if let Err(e) = driver.add_batch() {
                    outcome = Err(e);
                    break;
                }
                staged += 1;
            }
            outcome
        };
        match result {
            Ok(()) => {
                self.staged_units += staged;
                trace!(staged = self.staged_units, "staged batch items");
                Ok(())
            }
            Err(e) => {
                self.force_close().await;
                Err(e.into())
            }
        }
    }

    /// Flush all staged batch units in one driver execution.
    ///
    /// # Returns
    ///
    /// Per-unit affected-row counts in staging order. Flushing with no
    /// staged units is a local no-op yielding an empty vector.
    ///
    /// # Errors
    ///
    /// Returns the driver error; the handle closes per the auto-close
    /// policy.
    pub async fn execute_batch(&mut self) -> Result<Vec<u64>, FluexError> {
        self.ensure_open()?;
        if self.staged_units == 0 {
            debug!("no staged batch units, nothing flushed");
            return Ok(Vec::new());
        }
        self.apply_forward_default().await?;
        let result = { self.driver.lock().await.execute_batch().await };
        self.staged_units = 0;
        match result {
            Ok(counts) => {
                debug!(units = counts.len(), "batch flushed");
                self.finish_execution().await?;
                Ok(counts)
            }
            Err(e) => self.fail_execution(e.into()).await,
        }
    }

    /// Execute and expect a row cursor.
    ///
    /// # Returns
    ///
    /// A [`ResultSet`] owning the open cursor. Extracting from it closes
    /// the cursor and, per the auto-close policy, this handle.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::NoCursor` if the execution produced an
    /// update count, or the driver error on failure; either way the handle
    /// closes per the auto-close policy.
    pub async fn query(&mut self) -> Result<ResultSet, FluexError> {
        self.ensure_open()?;
        self.apply_forward_default().await?;
        let outcome = { self.driver.lock().await.execute().await };
        match outcome {
            Ok(ExecOutcome::Cursor { columns }) => {
                debug!(columns = columns.len(), "cursor opened");
                self.scope.set_cursor_open(true);
                Ok(ResultSet::new(
                    Arc::clone(&self.driver),
                    Arc::clone(&self.scope),
                    columns,
                ))
            }
            Ok(ExecOutcome::Updated { .. }) => {
                self.fail_execution(StatementError::NoCursor.into()).await
            }
            Err(e) => self.fail_execution(e.into()).await,
        }
    }

    /// Execute and expect an affected-row count.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::UnexpectedCursor` if the execution opened
    /// a cursor (the cursor is released first), or the driver error on
    /// failure; either way the handle closes per the auto-close policy.
    pub async fn update(&mut self) -> Result<u64, FluexError> {
        self.ensure_open()?;
        self.apply_forward_default().await?;
        let outcome = { self.driver.lock().await.execute().await };
        match outcome {
            Ok(ExecOutcome::Updated { count }) => {
                debug!(rows = count, "update completed");
                self.finish_execution().await?;
                Ok(count)
            }
            Ok(ExecOutcome::Cursor { .. }) => {
                self.scope.set_cursor_open(true);
                self.abandon_cursor().await;
                self.fail_execution(StatementError::UnexpectedCursor.into())
                    .await
            }
            Err(e) => self.fail_execution(e.into()).await,
        }
    }

    /// Execute an update and retrieve its generated keys.
    ///
    /// # Arguments
    ///
    /// * `map` - Row mapper applied to each generated-key row
    ///
    /// # Errors
    ///
    /// Same failure behavior as [`update`](Statement::update); a mapper
    /// failure also releases the key cursor before propagating.
    pub async fn update_with_keys<T, F>(&mut self, mut map: F) -> Result<KeyedUpdate<T>, FluexError>
    where
        F: FnMut(&Row<'_>) -> Result<T, FluexError>,
    {
        self.ensure_open()?;
        self.apply_forward_default().await?;
        let outcome = { self.driver.lock().await.execute().await };
        let count = match outcome {
            Ok(ExecOutcome::Updated { count }) => count,
            Ok(ExecOutcome::Cursor { .. }) => {
                self.scope.set_cursor_open(true);
                self.abandon_cursor().await;
                return self
                    .fail_execution(StatementError::UnexpectedCursor.into())
                    .await;
            }
            Err(e) => return self.fail_execution(e.into()).await,
        };

        let key_columns = { self.driver.lock().await.generated_keys().await };
        let keys = match key_columns {
            Ok(None) => Vec::new(),
            Ok(Some(columns)) => {
                self.scope.set_cursor_open(true);
                let mut keys = Vec::new();
                loop {
                    let fetched = { self.driver.lock().await.fetch_row().await };
                    match fetched {
                        Ok(Some(values)) => match map(&Row::new(&columns, &values)) {
                            Ok(key) => keys.push(key),
                            Err(e) => {
                                self.abandon_cursor().await;
                                return self.fail_execution(e).await;
                            }
                        },
                        Ok(None) => break,
                        Err(e) => {
                            self.abandon_cursor().await;
                            return self.fail_execution(e.into()).await;
                        }
                    }
                }
                let closed = { self.driver.lock().await.close_cursor().await };
                self.scope.set_cursor_open(false);
                if let Err(e) = closed {
                    return self.fail_execution(e.into()).await;
                }
                keys
            }
            Err(e) => return self.fail_execution(e.into()).await,
        };

        debug!(rows = count, keys = keys.len(), "keyed update completed");
        self.finish_execution().await?;
        Ok(KeyedUpdate {
            rows_affected: count,
            keys,
        })
    }

    /// Build a lazy stream of mapped rows.
    ///
    /// Nothing executes until the stream's first
    /// [`next`](RowStream::next); closing the stream before that first
    /// pull means the statement never runs.
    pub fn stream<T, F>(&mut self, map: F) -> RowStream<T>
    where
        F: FnMut(&Row<'_>) -> Result<T, FluexError> + Send + 'static,
    {
        RowStream::new(
            Arc::clone(&self.driver),
            Arc::clone(&self.scope),
            Box::new(map),
        )
    }

    /// Execute a statement that may produce several results.
    ///
    /// # Returns
    ///
    /// A [`MultiResults`] walker over the update-count/cursor chain, in
    /// database-reported order.
    ///
    /// # Errors
    ///
    /// Returns the driver error on failure; the handle closes per the
    /// auto-close policy.
    pub async fn execute_multi(&mut self) -> Result<MultiResults, FluexError> {
        self.ensure_open()?;
        self.apply_forward_default().await?;
        let outcome = { self.driver.lock().await.execute().await };
        match outcome {
            Ok(first) => {
                if first.is_cursor() {
                    self.scope.set_cursor_open(true);
                }
                Ok(MultiResults::new(
                    Arc::clone(&self.driver),
                    Arc::clone(&self.scope),
                    first,
                ))
            }
            Err(e) => self.fail_execution(e.into()).await,
        }
    }

    /// Set the number of rows fetched per cursor advance.
    ///
    /// The pre-override value is restored when the scope closes.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::Closed` on a closed scope, or the driver
    /// error if the driver rejects the value.
    pub async fn set_fetch_size(&mut self, rows: u32) -> Result<(), FluexError> {
        self.ensure_open()?;
        let mut driver = self.driver.lock().await;
        let original = driver.attributes().fetch_size;
        driver.set_fetch_size(rows)?;
        self.scope.note_fetch_size(original);
        Ok(())
    }

    /// Set the cursor traversal direction.
    ///
    /// Without an explicit direction the scope forces forward-only before
    /// each execution. The pre-override value is restored when the scope
    /// closes.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::Closed` on a closed scope, or the driver
    /// error if the driver rejects the direction.
    pub async fn set_fetch_direction(
        &mut self,
        direction: FetchDirection,
    ) -> Result<(), FluexError> {
        self.ensure_open()?;
        let mut driver = self.driver.lock().await;
        let original = driver.attributes().fetch_direction;
        driver.set_fetch_direction(direction)?;
        self.scope.note_fetch_direction(original);
        self.scope.mark_direction_set();
        Ok(())
    }

    /// Cap the number of rows any cursor of this statement returns.
    ///
    /// The pre-override value is restored when the scope closes.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::Closed` on a closed scope, or the driver
    /// error if the driver rejects the cap.
    pub async fn set_max_rows(&mut self, rows: u64) -> Result<(), FluexError> {
        self.ensure_open()?;
        let mut driver = self.driver.lock().await;
        let original = driver.attributes().max_rows;
        driver.set_max_rows(rows)?;
        self.scope.note_max_rows(original);
        Ok(())
    }

    /// Set the per-execution timeout enforced by the driver.
    ///
    /// The pre-override value is restored when the scope closes.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::Closed` on a closed scope, or the driver
    /// error if the driver rejects the timeout.
    pub async fn set_query_timeout(&mut self, timeout: Duration) -> Result<(), FluexError> {
        self.ensure_open()?;
        let mut driver = self.driver.lock().await;
        let original = driver.attributes().query_timeout;
        driver.set_query_timeout(timeout)?;
        self.scope.note_query_timeout(original);
        Ok(())
    }

    /// Current driver-side attribute values.
    pub async fn attributes(&self) -> StatementAttrs {
        self.driver.lock().await.attributes()
    }

    /// Close the scope and release the underlying resource.
    ///
    /// Idempotent: the first call closes any open cursor, restores
    /// overridden attributes, releases the driver resource, and runs the
    /// close-handler chain; later calls return `Ok` without effect.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::CloseFailed` aggregating every teardown or
    /// handler failure.
    pub async fn close(&mut self) -> Result<(), FluexError> {
        close_scope(&self.driver, &self.scope).await
    }

    /// Hand the whole bound handle to a task for out-of-band execution.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let task = stmt.spawn(|mut stmt| async move { stmt.update().await });
    /// let affected = task.await??;
    /// ```
    pub fn spawn<T, F, Fut>(self, op: F) -> tokio::task::JoinHandle<Result<T, FluexError>>
    where
        F: FnOnce(Statement) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FluexError>> + Send + 'static,
        T: Send + 'static,
    {
        tokio::spawn(op(self))
    }

    fn ensure_open(&self) -> Result<(), StatementError> {
        if self.scope.is_closed() {
            Err(StatementError::Closed)
        } else {
            Ok(())
        }
    }

    /// Reject an out-of-range index, closing the handle first.
    async fn check_index(&self, index: usize) -> Result<(), FluexError> {
        if index >= 1 {
            return Ok(());
        }
        self.force_close().await;
        Err(StatementError::InvalidParameterIndex { index }.into())
    }

    /// Map a binding result, closing the handle on failure.
    async fn fail_binding_on(&self, result: Result<(), DriverError>) -> Result<(), FluexError> {
        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                self.force_close().await;
                Err(e.into())
            }
        }
    }

    /// Forward-only default ahead of an eager execution.
    ///
    /// A driver that rejects the forced direction fails the execution
    /// outright, releasing the handle per the auto-close policy.
    async fn apply_forward_default(&self) -> Result<(), FluexError> {
        match apply_forward_default(&self.driver, &self.scope).await {
            Ok(()) => Ok(()),
            Err(e) => self.fail_execution(e.into()).await,
        }
    }

    /// Post-execution release per the auto-close policy.
    async fn finish_execution(&self) -> Result<(), FluexError> {
        if self.scope.auto_close() {
            close_scope(&self.driver, &self.scope).await
        } else {
            Ok(())
        }
    }

    /// Release per the auto-close policy while an error propagates.
    async fn fail_execution<T>(&self, primary: FluexError) -> Result<T, FluexError> {
        if self.scope.auto_close() {
            if let Err(close_err) = close_scope(&self.driver, &self.scope).await {
                warn!(error = %close_err, "suppressed close failure after execution error");
            }
        }
        Err(primary)
    }

    /// Unconditional close while an argument error propagates.
    async fn force_close(&self) {
        if let Err(close_err) = close_scope(&self.driver, &self.scope).await {
            warn!(error = %close_err, "suppressed close failure after binding error");
        }
    }

    /// Best-effort close of an unexpected cursor.
    async fn abandon_cursor(&self) {
        let result = { self.driver.lock().await.close_cursor().await };
        self.scope.set_cursor_open(false);
        if let Err(e) = result {
            warn!(error = %e, "suppressed cursor close failure");
        }
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("closed", &self.scope.is_closed())
            .field("auto_close", &self.scope.auto_close())
            .field("staged_units", &self.staged_units)
            .field("driver", &"<StatementDriver>")
            .finish()
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        // Async release cannot run here. Streams and result sets derived
        // from this scope hold their own reference and may still close it.
        if Arc::strong_count(&self.scope) == 1 && !self.scope.is_closed() {
            warn!("statement dropped without close(), driver resource may leak");
        }
    }
}
