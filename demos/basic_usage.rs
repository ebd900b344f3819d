//! Basic usage example for fluex-rs.
//!
//! Runs the statement scope against a small in-memory driver, so the
//! example needs no database. A real integration would implement
//! `StatementDriver` over a vendor prepared statement instead.

use async_trait::async_trait;
use fluex_rs::{
    DriverError, ExecOutcome, FetchDirection, SqlType, SqlValue, Statement, StatementAttrs,
    StatementDriver,
};
use std::collections::{BTreeMap, VecDeque};
use std::error::Error;
use std::time::Duration;

const PEOPLE: &[(i64, &str)] = &[(1, "Alice"), (2, "Bob"), (3, "Charlie")];

/// In-memory people table behind the `StatementDriver` seam.
///
/// `execute` opens a cursor over the table, filtered by the id bound to
/// slot 1 if there is one. Batch units append rows from slots 1 and 2.
struct MemoryDriver {
    people: Vec<(i64, String)>,
    bound: BTreeMap<usize, SqlValue>,
    staged: Vec<BTreeMap<usize, SqlValue>>,
    cursor: Option<VecDeque<Vec<SqlValue>>>,
    attrs: StatementAttrs,
}

impl MemoryDriver {
    fn empty() -> Self {
        Self {
            people: Vec::new(),
            bound: BTreeMap::new(),
            staged: Vec::new(),
            cursor: None,
            attrs: StatementAttrs::new(),
        }
    }

    fn seeded() -> Self {
        let mut driver = Self::empty();
        driver.people = PEOPLE
            .iter()
            .map(|(id, name)| (*id, name.to_string()))
            .collect();
        driver
    }

    fn open_cursor(&mut self) -> ExecOutcome {
        let wanted = match self.bound.get(&1) {
            Some(SqlValue::Integer(id)) => Some(*id),
            _ => None,
        };
        let rows = self
            .people
            .iter()
            .filter(|(id, _)| wanted.is_none() || wanted == Some(*id))
            .map(|(id, name)| vec![SqlValue::Integer(*id), SqlValue::Text(name.clone())])
            .collect::<VecDeque<_>>();
        self.cursor = Some(rows);
        ExecOutcome::cursor(vec!["id".to_string(), "name".to_string()])
    }
}

#[async_trait]
impl StatementDriver for MemoryDriver {
    fn bind_value(&mut self, index: usize, value: &SqlValue) -> Result<(), DriverError> {
        self.bound.insert(index, value.clone());
        Ok(())
    }

    fn bind_null(&mut self, index: usize, _sql_type: SqlType) -> Result<(), DriverError> {
        self.bound.insert(index, SqlValue::Null);
        Ok(())
    }

    fn add_batch(&mut self) -> Result<(), DriverError> {
        self.staged.push(std::mem::take(&mut self.bound));
        Ok(())
    }

    fn attributes(&self) -> StatementAttrs {
        self.attrs
    }

    fn set_fetch_size(&mut self, rows: u32) -> Result<(), DriverError> {
        self.attrs.fetch_size = rows;
        Ok(())
    }

    fn set_fetch_direction(&mut self, direction: FetchDirection) -> Result<(), DriverError> {
        self.attrs.fetch_direction = direction;
        Ok(())
    }

    fn set_max_rows(&mut self, rows: u64) -> Result<(), DriverError> {
        self.attrs.max_rows = rows;
        Ok(())
    }

    fn set_query_timeout(&mut self, timeout: Duration) -> Result<(), DriverError> {
        self.attrs.query_timeout = timeout;
        Ok(())
    }

    async fn execute(&mut self) -> Result<ExecOutcome, DriverError> {
        Ok(self.open_cursor())
    }

    async fn execute_batch(&mut self) -> Result<Vec<u64>, DriverError> {
        let units = std::mem::take(&mut self.staged);
        let mut counts = Vec::with_capacity(units.len());
        for unit in units {
            match (unit.get(&1), unit.get(&2)) {
                (Some(SqlValue::Integer(id)), Some(SqlValue::Text(name))) => {
                    self.people.push((*id, name.clone()));
                    counts.push(1);
                }
                _ => {
                    return Err(DriverError::Execution(
                        "batch unit needs an id and a name".to_string(),
                    ))
                }
            }
        }
        Ok(counts)
    }

    async fn next_result(&mut self) -> Result<Option<ExecOutcome>, DriverError> {
        Ok(None)
    }

    async fn fetch_row(&mut self) -> Result<Option<Vec<SqlValue>>, DriverError> {
        Ok(self.cursor.as_mut().and_then(VecDeque::pop_front))
    }

    async fn close_cursor(&mut self) -> Result<(), DriverError> {
        self.cursor = None;
        Ok(())
    }

    async fn generated_keys(&mut self) -> Result<Option<Vec<String>>, DriverError> {
        Ok(None)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.cursor = None;
        Ok(())
    }
}

/// Stages three people as batch units and flushes them in one round trip.
async fn example_batch_seed() -> Result<Vec<u64>, Box<dyn Error>> {
    let mut stmt = Statement::new(MemoryDriver::empty());
    stmt.set_auto_close(false)?;

    stmt.add_batch_rows(PEOPLE.iter().copied()).await?;
    let counts = stmt.execute_batch().await?;

    let total = stmt.query().await?.count().await?;
    println!("Batch seed: {} row(s) visible after flush", total);

    stmt.close().await?;
    Ok(counts)
}

/// Lists every name, letting the statement auto-close behind the result.
async fn example_list_names() -> Result<Vec<String>, Box<dyn Error>> {
    let mut stmt = Statement::new(MemoryDriver::seeded());
    let names = stmt
        .query()
        .await?
        .list(|row| row.get_named::<String>("name"))
        .await?;
    println!("List: statement closed = {}", stmt.is_closed());
    Ok(names)
}

/// Looks one person up by the id bound to slot 1.
async fn example_lookup(id: i64) -> Result<Option<String>, Box<dyn Error>> {
    let mut stmt = Statement::new(MemoryDriver::seeded());
    stmt.bind(1, id).await?;
    let name = stmt
        .query()
        .await?
        .optional(|row| row.get::<String>(1))
        .await?;
    Ok(name)
}

/// Streams rows one at a time; nothing executes until the first pull.
async fn example_stream_names() -> Result<usize, Box<dyn Error>> {
    let mut stmt = Statement::new(MemoryDriver::seeded());
    let mut rows = stmt.stream(|row| row.get::<String>(1));

    let mut seen = 0;
    while let Some(name) = rows.next().await {
        println!("Stream: {}", name?);
        seen += 1;
    }
    Ok(seen)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let counts = example_batch_seed().await?;
    println!("Batch seed: per-unit counts {:?}", counts);

    let names = example_list_names().await?;
    println!("List: {}", names.join(", "));

    let name = example_lookup(2).await?;
    println!("Lookup id 2: {}", name.unwrap_or_else(|| "<none>".to_string()));

    let seen = example_stream_names().await?;
    println!("Stream: {} row(s)", seen);

    println!("Done");
    Ok(())
}
