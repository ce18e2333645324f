//! Forward-only row cursor over a reader task.

use tokio::sync::mpsc;
use tracing::debug;

use super::value::{Batch, Row};
use crate::error::Result;

/// Lazy, single-pass stream of rows for one table.
///
/// Rows arrive in batches from a producer task over a bounded channel.
/// Dropping the cursor closes the channel, which stops the producer at its
/// next send and releases its source connection.
pub struct RowCursor {
    table: String,
    rx: mpsc::Receiver<Result<Batch>>,
    pending: std::vec::IntoIter<Row>,
    rows_read: u64,
}

impl RowCursor {
    /// Create a cursor and the sender its producer writes into.
    pub fn channel(table: impl Into<String>, capacity: usize) -> (mpsc::Sender<Result<Batch>>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let cursor = Self {
            table: table.into(),
            rx,
            pending: Vec::new().into_iter(),
            rows_read: 0,
        };
        (tx, cursor)
    }

    /// Cursor over batches that are already materialized.
    pub fn from_batches(table: impl Into<String>, batches: Vec<Result<Batch>>) -> Self {
        let (tx, cursor) = Self::channel(table, batches.len());
        for batch in batches {
            // Capacity matches the batch count, so try_send cannot be full.
            let _ = tx.try_send(batch);
        }
        cursor
    }

    /// Cursor over a single batch of rows.
    pub fn from_rows(table: impl Into<String>, rows: Vec<Row>) -> Self {
        Self::from_batches(table, vec![Ok(Batch::new(rows))])
    }

    /// Next row, `None` when the table is exhausted.
    pub async fn next(&mut self) -> Option<Result<Row>> {
        loop {
            if let Some(row) = self.pending.next() {
                self.rows_read += 1;
                return Some(Ok(row));
            }
            match self.rx.recv().await? {
                Ok(batch) => self.pending = batch.rows.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Rows handed out so far.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }
}

impl Drop for RowCursor {
    fn drop(&mut self) {
        self.rx.close();
        debug!("{}: cursor released after {} rows", self.table, self.rows_read);
    }
}
