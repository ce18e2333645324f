//! Statement executors.
//!
//! An [`Executor`] is where converted SQL goes: a live PostgreSQL connection
//! or a SQL file. Both expose the same transactional surface; bulk loading is
//! negotiated through [`Capability`] and falls back to batched INSERTs when
//! unsupported.

mod file;
mod session;

pub use file::FileExecutor;
pub use session::Session;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::SqlValue;
use crate::error::{MigrateError, Result};

/// Rows per INSERT statement against a live connection.
pub const LIVE_INSERT_BATCH_ROWS: usize = 64;

/// Rows per INSERT statement when writing a SQL file.
pub const FILE_INSERT_BATCH_ROWS: usize = 256;

/// Optional executor features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Streaming bulk load through `bulk_init` / `bulk_add_record` / `bulk_finish`.
    BulkTransfer,
}

/// Destination for generated SQL.
///
/// Only one transaction and one bulk channel may be open at a time.
/// Protocol misuse is reported as [`MigrateError::Executor`].
#[async_trait]
pub trait Executor: Send {
    /// Whether the executor supports `capability`. `false` is always safe.
    fn has_capability(&self, capability: Capability) -> bool;

    /// Default rows per INSERT on the row-wise path.
    fn insert_batch_rows(&self) -> usize;

    /// Open a transaction. `label` only shows up in logs and dumps.
    async fn begin(&mut self, label: &str) -> Result<()>;

    /// Execute one statement.
    async fn submit(&mut self, sql: &str) -> Result<()>;

    /// Commit the open transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Abandon the open transaction.
    async fn rollback(&mut self) -> Result<()>;

    /// Run every statement and collect the failures.
    async fn multiple(&mut self, label: &str, statements: &[&str]) -> Vec<MigrateError> {
        debug!("{}: {} statements", label, statements.len());
        let mut errors = Vec::new();
        for sql in statements {
            if let Err(e) = self.submit(sql).await {
                errors.push(e);
            }
        }
        errors
    }

    /// Open a bulk channel into `table` for `columns`.
    async fn bulk_init(&mut self, table: &str, columns: &[String]) -> Result<()>;

    /// Append one row to the open bulk channel.
    async fn bulk_add_record(&mut self, values: &[SqlValue<'_>]) -> Result<()>;

    /// Flush and close the bulk channel. The channel is released even when
    /// the flush fails.
    async fn bulk_finish(&mut self) -> Result<()>;

    /// Release the destination.
    async fn close(&mut self) -> Result<()>;
}

/// Combine the outcome of a step with the outcome of its cleanup.
///
/// The step's error wins; a cleanup error is reported only when the step
/// succeeded, and logged otherwise.
pub fn settle<T>(step: Result<T>, cleanup: Result<()>, context: &str) -> Result<T> {
    match (step, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup_err)) => {
            warn!("{}: cleanup also failed: {}", context, cleanup_err);
            Err(e)
        }
    }
}

pub(crate) fn unsupported_bulk(executor: &str) -> MigrateError {
    MigrateError::Executor(format!(
        "{} does not support bulk transfer",
        executor
    ))
}
