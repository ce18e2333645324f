//! Per-table transfer engine.
//!
//! Moves one source table into the destination executor, either through the
//! executor's bulk channel or as batched multi-row INSERT statements, and
//! wraps the table-level write and merge protocols around that.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::Verbosity;
use crate::core::{RowCursor, SourceReader, Table};
use crate::drivers::postgres::{quote_ident, quote_table, to_literal, PostgresTypeMapper};
use crate::error::{MigrateError, Result};
use crate::executor::{settle, Capability, Executor};

/// Drives statements for one table at a time into an [`Executor`].
pub struct TransferEngine {
    executor: Box<dyn Executor>,
    types: PostgresTypeMapper,
    insert_batch_rows: usize,
    verbosity: Verbosity,
}

impl TransferEngine {
    /// Create an engine over `executor`, using the executor's own INSERT
    /// batch size.
    pub fn new(executor: Box<dyn Executor>, types: PostgresTypeMapper, verbosity: Verbosity) -> Self {
        let insert_batch_rows = executor.insert_batch_rows();
        Self {
            executor,
            types,
            insert_batch_rows,
            verbosity,
        }
    }

    /// Override the number of rows per INSERT on the row-wise path.
    pub fn with_insert_batch_rows(mut self, rows: Option<usize>) -> Self {
        if let Some(rows) = rows.filter(|r| *r > 0) {
            self.insert_batch_rows = rows;
        }
        self
    }

    pub fn insert_batch_rows(&self) -> usize {
        self.insert_batch_rows
    }

    /// Run the session setup statements.
    ///
    /// Every failure is logged; the executor is closed and the first failure
    /// returned.
    pub async fn init_session(&mut self, statements: &[&str]) -> Result<()> {
        let mut errors = self.executor.multiple("session init", statements).await;
        if errors.is_empty() {
            return Ok(());
        }
        for e in &errors {
            warn!("Session initialization failed: {}", e);
        }
        if let Err(e) = self.executor.close().await {
            warn!("Closing executor after failed session init: {}", e);
        }
        Err(errors.remove(0))
    }

    /// `CREATE TABLE IF NOT EXISTS` for `src` under the name `dst`.
    pub fn create_table_sql(&self, src: &Table, dst: &str) -> String {
        let mut defs: Vec<String> = src
            .columns
            .iter()
            .map(|col| {
                let mut def = format!("{} {}", quote_ident(&col.name), self.types.column_type(&col.ty));
                if !col.is_nullable {
                    def.push_str(" NOT NULL");
                }
                def
            })
            .collect();

        let pk = src.primary_key();
        if !pk.is_empty() {
            let cols: Vec<String> = pk.iter().map(|c| quote_ident(c)).collect();
            defs.push(format!("PRIMARY KEY ({})", cols.join(", ")));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n\t{}\n)",
            quote_table(dst),
            defs.join(",\n\t")
        )
    }

    /// Copy every row of `src` into `dst`. Returns the number of rows written.
    ///
    /// Does not open a transaction; callers decide the boundary.
    pub async fn transfer_table(
        &mut self,
        src: &Table,
        dst: &str,
        reader: &dyn SourceReader,
    ) -> Result<u64> {
        let started = Instant::now();
        let cursor = reader.read(src).await?;

        let rows = if self.executor.has_capability(Capability::BulkTransfer) {
            self.transfer_bulk(src, dst, cursor).await?
        } else {
            self.transfer_inserts(src, dst, cursor).await?
        };

        if self.verbosity.progress() {
            info!(
                "{} -> {}: {} rows in {:.1?}",
                src.name,
                dst,
                rows,
                started.elapsed()
            );
        }
        Ok(rows)
    }

    async fn transfer_bulk(&mut self, src: &Table, dst: &str, mut cursor: RowCursor) -> Result<u64> {
        debug!("{}: bulk transfer into {}", src.name, dst);
        self.executor.bulk_init(dst, &src.column_names()).await?;

        let added = self.add_bulk_rows(src, &mut cursor).await;
        let finished = self.executor.bulk_finish().await;
        settle(added, finished, &format!("bulk transfer into {}", dst))
    }

    async fn add_bulk_rows(&mut self, src: &Table, cursor: &mut RowCursor) -> Result<u64> {
        let mut rows = 0u64;
        while let Some(row) = cursor.next().await {
            let row = row?;
            check_width(src, row.len())?;
            self.executor.bulk_add_record(&row).await?;
            rows += 1;
        }
        Ok(rows)
    }

    async fn transfer_inserts(
        &mut self,
        src: &Table,
        dst: &str,
        mut cursor: RowCursor,
    ) -> Result<u64> {
        debug!(
            "{}: row-wise transfer into {}, {} rows per INSERT",
            src.name, dst, self.insert_batch_rows
        );
        let columns: Vec<String> = src.columns.iter().map(|c| quote_ident(&c.name)).collect();
        let prefix = format!("INSERT INTO {}({}) VALUES\n\t", quote_table(dst), columns.join(", "));

        let mut tuples: Vec<String> = Vec::with_capacity(self.insert_batch_rows);
        let mut rows = 0u64;

        while let Some(row) = cursor.next().await {
            let row = row?;
            check_width(src, row.len())?;
            let literals: Vec<String> = row
                .iter()
                .zip(&src.columns)
                .map(|(value, col)| to_literal(value, &col.ty))
                .collect();
            tuples.push(format!("({})", literals.join(", ")));
            rows += 1;

            if tuples.len() >= self.insert_batch_rows {
                self.flush_inserts(&prefix, &mut tuples).await?;
            }
        }

        if !tuples.is_empty() {
            self.flush_inserts(&prefix, &mut tuples).await?;
        }
        Ok(rows)
    }

    async fn flush_inserts(&mut self, prefix: &str, tuples: &mut Vec<String>) -> Result<()> {
        let sql = format!("{}{};\n", prefix, tuples.join(",\n\t"));
        tuples.clear();
        self.executor.submit(&sql).await
    }

    /// Create `dst` if missing and load it, all in one transaction.
    pub async fn merge_table(
        &mut self,
        src: &Table,
        dst: &str,
        reader: &dyn SourceReader,
    ) -> Result<u64> {
        self.executor
            .begin(&format!("merge table {} into {}", src.name, dst))
            .await?;

        let loaded = self.create_and_load(src, dst, reader).await;
        self.finish_transaction(loaded, dst).await
    }

    async fn create_and_load(
        &mut self,
        src: &Table,
        dst: &str,
        reader: &dyn SourceReader,
    ) -> Result<u64> {
        self.create_table(src, dst).await?;
        self.transfer_table(src, dst, reader).await
    }

    /// Load `dst` in its own transaction.
    pub async fn write_table(
        &mut self,
        src: &Table,
        dst: &str,
        reader: &dyn SourceReader,
    ) -> Result<u64> {
        self.executor
            .begin(&format!("write table {} into {}", src.name, dst))
            .await?;
        let loaded = self.transfer_table(src, dst, reader).await;
        self.finish_transaction(loaded, dst).await
    }

    async fn finish_transaction(&mut self, outcome: Result<u64>, dst: &str) -> Result<u64> {
        match outcome {
            Ok(rows) => {
                self.executor.commit().await?;
                Ok(rows)
            }
            Err(e) => {
                warn!("{}: rolling back: {}", dst, e);
                let rolled_back = self.executor.rollback().await;
                settle(Err(e), rolled_back, &format!("rollback of {}", dst))
            }
        }
    }

    /// Run `CREATE TABLE IF NOT EXISTS` outside any explicit transaction.
    pub async fn create_table(&mut self, src: &Table, dst: &str) -> Result<()> {
        let sql = self.create_table_sql(src, dst);
        self.executor.submit(&sql).await
    }

    pub async fn truncate_table(&mut self, dst: &str) -> Result<()> {
        self.executor
            .submit(&format!("TRUNCATE TABLE {}", quote_table(dst)))
            .await
    }

    /// Drop every named destination table in one transaction.
    pub async fn clear_tables(&mut self, names: &[String]) -> Result<()> {
        self.executor.begin("clear destination tables").await?;
        let dropped = self.drop_tables(names).await;
        self.finish_transaction(dropped, "clear").await.map(|_| ())
    }

    async fn drop_tables(&mut self, names: &[String]) -> Result<u64> {
        for name in names {
            self.executor
                .submit(&format!("DROP TABLE IF EXISTS {}", quote_table(name)))
                .await?;
        }
        Ok(names.len() as u64)
    }

    /// Recreate the secondary indexes of `src` on `dst`.
    ///
    /// Failures are logged and counted, never returned.
    pub async fn create_indexes(&mut self, src: &Table, dst: &str) -> usize {
        let mut created = 0;
        for index in &src.indexes {
            let columns: Vec<String> = index.columns.iter().map(|c| quote_ident(c)).collect();
            let sql = format!(
                "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
                if index.is_unique { "UNIQUE " } else { "" },
                quote_ident(&format!("{}_{}", dst.replace('.', "_"), index.name)),
                quote_table(dst),
                columns.join(", ")
            );
            match self.executor.submit(&sql).await {
                Ok(()) => created += 1,
                Err(e) => warn!("{}: index {} not created: {}", dst, index.name, e),
            }
        }
        created
    }

    /// Recreate the foreign keys of `src` on `dst`.
    ///
    /// `dest_name` maps a referenced source table to its destination name,
    /// or `None` when that table was not migrated; such keys are skipped.
    /// Failures are logged and counted, never returned.
    pub async fn create_foreign_keys<F>(&mut self, src: &Table, dst: &str, dest_name: F) -> usize
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut created = 0;
        for fk in &src.foreign_keys {
            let Some(ref_table) = dest_name(&fk.ref_table) else {
                debug!(
                    "{}: skipping foreign key {}, {} was not migrated",
                    dst, fk.name, fk.ref_table
                );
                continue;
            };
            let columns: Vec<String> = fk.columns.iter().map(|c| quote_ident(c)).collect();
            let ref_columns: Vec<String> = fk.ref_columns.iter().map(|c| quote_ident(c)).collect();
            let sql = format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
                quote_table(dst),
                quote_ident(&fk.name),
                columns.join(", "),
                quote_table(&ref_table),
                ref_columns.join(", "),
                referential_action(&fk.on_delete),
                referential_action(&fk.on_update)
            );
            match self.executor.submit(&sql).await {
                Ok(()) => created += 1,
                Err(e) => warn!("{}: foreign key {} not created: {}", dst, fk.name, e),
            }
        }
        created
    }

    pub async fn close(&mut self) -> Result<()> {
        self.executor.close().await
    }
}

fn check_width(src: &Table, values: usize) -> Result<()> {
    if values == src.columns.len() {
        return Ok(());
    }
    Err(MigrateError::transfer(
        &src.name,
        format!("row has {} values, table has {} columns", values, src.columns.len()),
    ))
}

/// MySQL referential action as PostgreSQL syntax. Unknown actions fall back
/// to NO ACTION.
fn referential_action(action: &str) -> &'static str {
    match action.trim().to_ascii_uppercase().as_str() {
        "CASCADE" => "CASCADE",
        "SET NULL" => "SET NULL",
        "SET DEFAULT" => "SET DEFAULT",
        "RESTRICT" => "RESTRICT",
        _ => "NO ACTION",
    }
}
