//! In-memory reader and executor doubles for unit tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::Verbosity;
use crate::core::{Batch, Column, IntSize, Row, RowCursor, SourceReader, SqlValue, Table, Type};
use crate::error::{MigrateError, Result};
use crate::executor::{unsupported_bulk, Capability, Executor, Session};

/// Single-column integer table with `id` as primary key.
pub fn int_table(name: &str) -> Table {
    let mut table = Table::new(name);
    table.columns = vec![Column {
        name: "id".into(),
        ty: Type::Int(IntSize::Normal),
        source_type: "int".into(),
        primary_key: true,
        is_nullable: false,
    }];
    table
}

pub fn int_rows(n: usize) -> Vec<Row> {
    (0..n).map(|i| vec![SqlValue::I32(i as i32)]).collect()
}

#[derive(Default)]
struct Log {
    events: Vec<String>,
    statements: Vec<String>,
    bulk_rows: usize,
    bulk_finished: bool,
    closed: bool,
}

/// Shared view of what a [`RecordingExecutor`] saw.
#[derive(Clone, Default)]
pub struct Recorded(Arc<Mutex<Log>>);

impl Recorded {
    fn with<T>(&self, f: impl FnOnce(&mut Log) -> T) -> T {
        f(&mut *self.0.lock().unwrap())
    }

    /// Transaction markers and statements in order.
    pub fn events(&self) -> Vec<String> {
        self.with(|log| log.events.clone())
    }

    /// Submitted statements only.
    pub fn statements(&self) -> Vec<String> {
        self.with(|log| log.statements.clone())
    }

    pub fn insert_statements(&self) -> usize {
        self.with(|log| {
            log.statements
                .iter()
                .filter(|s| s.starts_with("INSERT INTO"))
                .count()
        })
    }

    /// Tuples across every INSERT statement.
    pub fn inserted_rows(&self) -> usize {
        self.with(|log| {
            log.statements
                .iter()
                .filter(|s| s.starts_with("INSERT INTO"))
                .map(|s| s.matches("\n\t(").count())
                .sum()
        })
    }

    pub fn bulk_rows(&self) -> usize {
        self.with(|log| log.bulk_rows)
    }

    pub fn bulk_finished(&self) -> bool {
        self.with(|log| log.bulk_finished)
    }

    pub fn closed(&self) -> bool {
        self.with(|log| log.closed)
    }
}

/// Executor that records every call instead of talking to a database.
pub struct RecordingExecutor {
    session: Session,
    bulk: bool,
    bulk_open: bool,
    insert_batch_rows: usize,
    fail_prefix: Option<String>,
    log: Recorded,
}

impl RecordingExecutor {
    pub fn new(bulk: bool, insert_batch_rows: usize) -> (Self, Recorded) {
        let log = Recorded::default();
        let executor = Self {
            session: Session::new("recording", Verbosity::QUIET),
            bulk,
            bulk_open: false,
            insert_batch_rows,
            fail_prefix: None,
            log: log.clone(),
        };
        (executor, log)
    }

    /// Fail every submitted statement starting with `prefix`.
    pub fn failing_on(mut self, prefix: &str) -> Self {
        self.fail_prefix = Some(prefix.to_string());
        self
    }

    fn event(&self, event: impl Into<String>) {
        let event = event.into();
        self.log.with(|log| log.events.push(event));
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    fn has_capability(&self, capability: Capability) -> bool {
        match capability {
            Capability::BulkTransfer => self.bulk,
        }
    }

    fn insert_batch_rows(&self) -> usize {
        self.insert_batch_rows
    }

    async fn begin(&mut self, label: &str) -> Result<()> {
        self.session.begin(label)?;
        self.event(format!("BEGIN {}", label));
        Ok(())
    }

    async fn submit(&mut self, sql: &str) -> Result<()> {
        if self.log.closed() {
            return Err(MigrateError::Executor("executor is closed".into()));
        }
        self.session.record(sql);
        self.event(sql);
        self.log.with(|log| log.statements.push(sql.to_string()));
        match &self.fail_prefix {
            Some(prefix) if sql.starts_with(prefix.as_str()) => {
                Err(MigrateError::Executor(format!("failed: {}", sql)))
            }
            _ => Ok(()),
        }
    }

    async fn commit(&mut self) -> Result<()> {
        self.session.commit()?;
        self.event("COMMIT");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.session.rollback().is_some() {
            self.event("ROLLBACK");
        }
        Ok(())
    }

    async fn bulk_init(&mut self, table: &str, _columns: &[String]) -> Result<()> {
        if !self.bulk {
            return Err(unsupported_bulk("recording"));
        }
        if self.bulk_open {
            return Err(MigrateError::Executor("bulk channel already open".into()));
        }
        self.bulk_open = true;
        self.event(format!("COPY {}", table));
        Ok(())
    }

    async fn bulk_add_record(&mut self, _values: &[SqlValue<'_>]) -> Result<()> {
        if !self.bulk_open {
            return Err(MigrateError::Executor("bulk_add_record without bulk_init".into()));
        }
        self.log.with(|log| log.bulk_rows += 1);
        Ok(())
    }

    async fn bulk_finish(&mut self) -> Result<()> {
        if !self.bulk_open {
            return Err(MigrateError::Executor("bulk_finish without bulk_init".into()));
        }
        self.bulk_open = false;
        self.log.with(|log| log.bulk_finished = true);
        self.event("COPY END");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.log.with(|log| log.closed = true);
        Ok(())
    }
}

/// Source reader over tables held in memory.
#[derive(Default)]
pub struct MemoryReader {
    tables: Vec<(Table, Vec<Row>)>,
    failing_reads: HashMap<String, usize>,
    failing_views: BTreeSet<String>,
    views: Arc<Mutex<Vec<String>>>,
    reads: Arc<Mutex<Vec<String>>>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table (or, with `is_view` set, a view shape) and its rows.
    pub fn with_table(mut self, table: Table, rows: Vec<Row>) -> Self {
        self.tables.push((table, rows));
        self
    }

    /// Yield `after` rows of `name`, then a read error.
    pub fn failing_read_after(mut self, name: &str, after: usize) -> Self {
        self.failing_reads.insert(name.to_string(), after);
        self
    }

    /// Make `create_view` fail for `name`.
    pub fn failing_view(mut self, name: &str) -> Self {
        self.failing_views.insert(name.to_string());
        self
    }

    /// View create and drop calls as `create x` / `drop x`.
    pub fn view_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.views)
    }

    /// Reads as `name` or `name where filter`.
    pub fn read_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.reads)
    }

    fn find(&self, name: &str) -> Option<&(Table, Vec<Row>)> {
        self.tables.iter().find(|(t, _)| t.name == name)
    }
}

#[async_trait]
impl SourceReader for MemoryReader {
    async fn tables(&self) -> Result<Vec<Table>> {
        Ok(self
            .tables
            .iter()
            .filter(|(t, _)| !t.is_view)
            .map(|(t, _)| Table {
                indexes: Vec::new(),
                foreign_keys: Vec::new(),
                ..t.clone()
            })
            .collect())
    }

    async fn describe(&self, name: &str) -> Result<Table> {
        self.find(name)
            .map(|(t, _)| t.clone())
            .ok_or_else(|| MigrateError::Config(format!("{} not found", name)))
    }

    async fn read(&self, table: &Table) -> Result<RowCursor> {
        let rows = self
            .find(&table.name)
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();
        let entry = match &table.filter {
            Some(filter) => format!("{} where {}", table.name, filter),
            None => table.name.clone(),
        };
        self.reads.lock().unwrap().push(entry);

        match self.failing_reads.get(&table.name) {
            Some(&after) => {
                let head = rows.into_iter().take(after).collect();
                Ok(RowCursor::from_batches(
                    table.name.clone(),
                    vec![
                        Ok(Batch::new(head)),
                        Err(MigrateError::transfer(&table.name, "read failed")),
                    ],
                ))
            }
            None => Ok(RowCursor::from_rows(table.name.clone(), rows)),
        }
    }

    async fn create_view(&self, name: &str, _body: &str) -> Result<()> {
        if self.failing_views.contains(name) {
            return Err(MigrateError::Config(format!("view {} rejected", name)));
        }
        self.views.lock().unwrap().push(format!("create {}", name));
        Ok(())
    }

    async fn drop_view(&self, name: &str) -> Result<()> {
        self.views.lock().unwrap().push(format!("drop {}", name));
        Ok(())
    }

    async fn load_indexes(&self, table: &mut Table) -> Result<()> {
        if let Some((stored, _)) = self.find(&table.name) {
            table.indexes = stored.indexes.clone();
        }
        Ok(())
    }

    async fn load_foreign_keys(&self, table: &mut Table) -> Result<()> {
        if let Some((stored, _)) = self.find(&table.name) {
            table.foreign_keys = stored.foreign_keys.clone();
        }
        Ok(())
    }

    async fn close(&self) {}
}
