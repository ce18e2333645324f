use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

use super::{unsupported_bulk, Capability, Executor, Session, FILE_INSERT_BATCH_ROWS};
use crate::config::Verbosity;
use crate::core::SqlValue;
use crate::error::{MigrateError, Result};

/// Writes the statement stream to a SQL file instead of a server.
///
/// The output replays with `psql -f`. Bulk transfer is never offered, so
/// data lands as batched INSERTs.
pub struct FileExecutor {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    session: Session,
}

impl FileExecutor {
    /// Create (or truncate) the dump file.
    pub async fn create(path: impl AsRef<Path>, verbosity: Verbosity) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).await?;
        if verbosity.progress() {
            info!("Writing SQL to {}", path.display());
        }
        Ok(Self {
            path,
            out: Some(BufWriter::new(file)),
            session: Session::new("file", verbosity),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&mut self, text: &str) -> Result<()> {
        let out = self.out.as_mut().ok_or_else(|| {
            MigrateError::Executor(format!("{} is already closed", self.path.display()))
        })?;
        out.write_all(text.as_bytes()).await?;
        Ok(())
    }
}

/// One statement per line group, always `;`-terminated.
fn terminate(sql: &str) -> String {
    let trimmed = sql.trim_end();
    if trimmed.ends_with(';') {
        format!("{}\n", trimmed)
    } else {
        format!("{};\n", trimmed)
    }
}

#[async_trait]
impl Executor for FileExecutor {
    fn has_capability(&self, _capability: Capability) -> bool {
        false
    }

    fn insert_batch_rows(&self) -> usize {
        FILE_INSERT_BATCH_ROWS
    }

    async fn begin(&mut self, label: &str) -> Result<()> {
        self.session.begin(label)?;
        let header = format!("\n-- {}\nBEGIN;\n", label.replace('\n', " "));
        self.write(&header).await
    }

    async fn submit(&mut self, sql: &str) -> Result<()> {
        self.session.record(sql);
        self.write(&terminate(sql)).await
    }

    async fn commit(&mut self) -> Result<()> {
        self.session.commit()?;
        self.write("COMMIT;\n").await
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.session.rollback().is_some() {
            self.write("ROLLBACK;\n").await?;
        }
        Ok(())
    }

    async fn bulk_init(&mut self, _table: &str, _columns: &[String]) -> Result<()> {
        Err(unsupported_bulk("file executor"))
    }

    async fn bulk_add_record(&mut self, _values: &[SqlValue<'_>]) -> Result<()> {
        Err(unsupported_bulk("file executor"))
    }

    async fn bulk_finish(&mut self) -> Result<()> {
        Err(unsupported_bulk("file executor"))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut out) = self.out.take() {
            out.flush().await?;
            out.into_inner().sync_all().await?;
            info!(
                "Wrote {} statements to {}",
                self.session.statements(),
                self.path.display()
            );
        }
        Ok(())
    }
}
