//! Common test utilities for fluex-rs integration tests.
//!
//! The crate's integration seam is the `StatementDriver` trait, so these
//! tests run against `ScriptedDriver`, an in-memory driver that plays back
//! a scripted sequence of execution results and records every call it
//! receives.
//!
//! # Usage
//!
//! ```ignore
//! let driver = ScriptedDriver::new(vec![Scripted::updated(3)]);
//! let recorder = driver.recorder();
//!
//! let mut stmt = Statement::new(driver);
//! assert_eq!(stmt.update().await.unwrap(), 3);
//! assert!(recorder.lock().unwrap().closed);
//! ```
//!
//! The recorder outlives the driver (the statement takes ownership of the
//! driver), so assertions stay possible after the scope closes.

use async_trait::async_trait;
use fluex_rs::driver::{ExecOutcome, FetchDirection, StatementAttrs, StatementDriver};
use fluex_rs::error::DriverError;
use fluex_rs::types::{SqlType, SqlValue};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared handle to the driver's call log.
pub type Recorder = Arc<Mutex<Recorded>>;

// ============================================================================
// Scripted Execution Results
// ============================================================================

/// One scripted execution result.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// An affected-row count
    Updated(u64),
    /// A cursor with its column names and rows
    Cursor {
        columns: Vec<String>,
        rows: Vec<Vec<SqlValue>>,
    },
}

impl Scripted {
    /// Script an update result.
    pub fn updated(count: u64) -> Self {
        Self::Updated(count)
    }

    /// Script a cursor result.
    pub fn cursor(columns: &[&str], rows: Vec<Vec<SqlValue>>) -> Self {
        Self::Cursor {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }
}

// ============================================================================
// Call Log
// ============================================================================

/// Everything the scripted driver has been asked to do.
#[derive(Debug, Default)]
pub struct Recorded {
    /// Value bindings as (index, value) pairs, in call order
    pub bound: Vec<(usize, SqlValue)>,
    /// NULL bindings as (index, declared type) pairs, in call order
    pub nulls: Vec<(usize, SqlType)>,
    /// Batch units currently staged
    pub staged: usize,
    /// Number of plain executions
    pub executions: usize,
    /// Number of batch flushes
    pub batch_executions: usize,
    /// Number of cursor closes
    pub cursor_closes: usize,
    /// Number of statement releases
    pub closes: usize,
    /// Whether the statement resource has been released
    pub closed: bool,
    /// Fetch-size overrides, in call order
    pub fetch_sizes: Vec<u32>,
    /// Fetch-direction overrides, in call order
    pub directions: Vec<FetchDirection>,
    /// Row-cap overrides, in call order
    pub max_rows: Vec<u64>,
    /// Timeout overrides, in call order
    pub timeouts: Vec<Duration>,
}

// ============================================================================
// Scripted Driver
// ============================================================================

/// In-memory driver that plays back scripted results.
///
/// `execute` consumes the script front to back, one result per execution.
/// Follow-on results of a multi-result chain live in a separate queue
/// seeded via [`with_continuations`](ScriptedDriver::with_continuations)
/// and consumed by `next_result`, so a result scripted for a later
/// execution can never leak into a chain walk. Cursor results make their
/// rows fetchable one at a time until the cursor is closed or exhausted.
pub struct ScriptedDriver {
    script: VecDeque<Scripted>,
    continuations: VecDeque<Scripted>,
    current_rows: Option<VecDeque<Vec<SqlValue>>>,
    generated_keys: Option<(Vec<String>, Vec<Vec<SqlValue>>)>,
    batch_counts: Option<Vec<u64>>,
    attrs: StatementAttrs,
    recorded: Recorder,
}

impl ScriptedDriver {
    /// Create a driver that plays back the given results in order.
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: script.into(),
            continuations: VecDeque::new(),
            current_rows: None,
            generated_keys: None,
            batch_counts: None,
            attrs: StatementAttrs::new(),
            recorded: Arc::new(Mutex::new(Recorded::default())),
        }
    }

    /// Queue the follow-on results `next_result` reports after an
    /// execution.
    pub fn with_continuations(mut self, results: Vec<Scripted>) -> Self {
        self.continuations = results.into();
        self
    }

    /// Give the next update a generated-key cursor.
    pub fn with_generated_keys(mut self, columns: &[&str], rows: Vec<Vec<SqlValue>>) -> Self {
        self.generated_keys = Some((columns.iter().map(|c| c.to_string()).collect(), rows));
        self
    }

    /// Fix the per-unit counts the next batch flush returns.
    ///
    /// Without this, a flush reports one affected row per staged unit.
    pub fn with_batch_counts(mut self, counts: Vec<u64>) -> Self {
        self.batch_counts = Some(counts);
        self
    }

    /// Start from non-default statement attributes.
    pub fn with_attrs(mut self, attrs: StatementAttrs) -> Self {
        self.attrs = attrs;
        self
    }

    /// Shared handle to the call log.
    ///
    /// Clone this before handing the driver to a statement.
    pub fn recorder(&self) -> Recorder {
        Arc::clone(&self.recorded)
    }

    fn begin_result(&mut self, result: Scripted) -> ExecOutcome {
        match result {
            Scripted::Updated(count) => ExecOutcome::updated(count),
            Scripted::Cursor { columns, rows } => {
                self.current_rows = Some(rows.into());
                ExecOutcome::cursor(columns)
            }
        }
    }
}

#[async_trait]
impl StatementDriver for ScriptedDriver {
    fn bind_value(&mut self, index: usize, value: &SqlValue) -> Result<(), DriverError> {
        self.recorded
            .lock()
            .unwrap()
            .bound
            .push((index, value.clone()));
        Ok(())
    }

    fn bind_null(&mut self, index: usize, sql_type: SqlType) -> Result<(), DriverError> {
        self.recorded.lock().unwrap().nulls.push((index, sql_type));
        Ok(())
    }

    fn add_batch(&mut self) -> Result<(), DriverError> {
        self.recorded.lock().unwrap().staged += 1;
        Ok(())
    }

    fn attributes(&self) -> StatementAttrs {
        self.attrs
    }

    fn set_fetch_size(&mut self, rows: u32) -> Result<(), DriverError> {
        self.attrs.fetch_size = rows;
        self.recorded.lock().unwrap().fetch_sizes.push(rows);
        Ok(())
    }

    fn set_fetch_direction(&mut self, direction: FetchDirection) -> Result<(), DriverError> {
        self.attrs.fetch_direction = direction;
        self.recorded.lock().unwrap().directions.push(direction);
        Ok(())
    }

    fn set_max_rows(&mut self, rows: u64) -> Result<(), DriverError> {
        self.attrs.max_rows = rows;
        self.recorded.lock().unwrap().max_rows.push(rows);
        Ok(())
    }

    fn set_query_timeout(&mut self, timeout: Duration) -> Result<(), DriverError> {
        self.attrs.query_timeout = timeout;
        self.recorded.lock().unwrap().timeouts.push(timeout);
        Ok(())
    }

    async fn execute(&mut self) -> Result<ExecOutcome, DriverError> {
        self.recorded.lock().unwrap().executions += 1;
        let result = self
            .script
            .pop_front()
            .ok_or_else(|| DriverError::Execution("script exhausted".to_string()))?;
        Ok(self.begin_result(result))
    }

    async fn execute_batch(&mut self) -> Result<Vec<u64>, DriverError> {
        let staged = {
            let mut recorded = self.recorded.lock().unwrap();
            recorded.batch_executions += 1;
            std::mem::take(&mut recorded.staged)
        };
        Ok(self
            .batch_counts
            .take()
            .unwrap_or_else(|| vec![1; staged]))
    }

    async fn next_result(&mut self) -> Result<Option<ExecOutcome>, DriverError> {
        match self.continuations.pop_front() {
            Some(result) => Ok(Some(self.begin_result(result))),
            None => Ok(None),
        }
    }

    async fn fetch_row(&mut self) -> Result<Option<Vec<SqlValue>>, DriverError> {
        Ok(self.current_rows.as_mut().and_then(VecDeque::pop_front))
    }

    async fn close_cursor(&mut self) -> Result<(), DriverError> {
        self.recorded.lock().unwrap().cursor_closes += 1;
        self.current_rows = None;
        Ok(())
    }

    async fn generated_keys(&mut self) -> Result<Option<Vec<String>>, DriverError> {
        match self.generated_keys.take() {
            Some((columns, rows)) => {
                self.current_rows = Some(rows.into());
                Ok(Some(columns))
            }
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.closes += 1;
        recorded.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_driver_plays_back_in_order() {
        let mut driver = ScriptedDriver::new(vec![
            Scripted::updated(2),
            Scripted::cursor(&["id"], vec![vec![SqlValue::Integer(1)]]),
        ]);

        assert!(driver.execute().await.unwrap().is_update());
        assert!(driver.execute().await.unwrap().is_cursor());
        assert_eq!(
            driver.fetch_row().await.unwrap(),
            Some(vec![SqlValue::Integer(1)])
        );
        assert_eq!(driver.fetch_row().await.unwrap(), None);
        assert!(driver.execute().await.is_err());
    }

    #[tokio::test]
    async fn test_scripted_driver_keeps_continuations_apart_from_script() {
        let mut driver = ScriptedDriver::new(vec![Scripted::updated(1), Scripted::updated(9)])
            .with_continuations(vec![Scripted::cursor(&["id"], vec![])]);

        assert!(driver.execute().await.unwrap().is_update());
        assert!(driver.next_result().await.unwrap().unwrap().is_cursor());
        // The chain ends here; the second scripted execution is untouched.
        assert!(driver.next_result().await.unwrap().is_none());
        assert_eq!(driver.execute().await.unwrap().update_count(), Some(9));
    }

    #[tokio::test]
    async fn test_recorder_survives_driver_handoff() {
        let driver = ScriptedDriver::new(vec![]);
        let recorder = driver.recorder();

        let mut moved = driver;
        moved.bind_value(1, &SqlValue::Integer(5)).unwrap();
        drop(moved);

        assert_eq!(
            recorder.lock().unwrap().bound,
            vec![(1, SqlValue::Integer(5))]
        );
    }
}
