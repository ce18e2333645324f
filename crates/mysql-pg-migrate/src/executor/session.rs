use tracing::debug;

use crate::config::Verbosity;
use crate::error::{MigrateError, Result};

/// Transaction bookkeeping shared by every executor.
///
/// Tracks whether a transaction is open and echoes statements at high
/// verbosity. Executors hold one by value and consult it before touching
/// their backend.
#[derive(Debug)]
pub struct Session {
    name: &'static str,
    verbosity: Verbosity,
    transaction: Option<String>,
    statements: u64,
}

impl Session {
    pub fn new(name: &'static str, verbosity: Verbosity) -> Self {
        Self {
            name,
            verbosity,
            transaction: None,
            statements: 0,
        }
    }

    /// Enter a transaction. Fails if one is already open.
    pub fn begin(&mut self, label: &str) -> Result<()> {
        if let Some(open) = &self.transaction {
            return Err(MigrateError::Executor(format!(
                "{}: cannot begin '{}' while '{}' is open",
                self.name, label, open
            )));
        }
        if self.verbosity.echo_statements() {
            debug!("{}: BEGIN ({})", self.name, label);
        }
        self.transaction = Some(label.to_string());
        Ok(())
    }

    /// Leave the open transaction, returning its label.
    pub fn commit(&mut self) -> Result<String> {
        let label = self.transaction.take().ok_or_else(|| {
            MigrateError::Executor(format!("{}: commit without an open transaction", self.name))
        })?;
        if self.verbosity.echo_statements() {
            debug!("{}: COMMIT ({})", self.name, label);
        }
        Ok(label)
    }

    /// Leave the open transaction without committing, if any.
    pub fn rollback(&mut self) -> Option<String> {
        let label = self.transaction.take();
        if let Some(label) = &label {
            debug!("{}: ROLLBACK ({})", self.name, label);
        }
        label
    }

    /// Count and optionally echo a statement.
    pub fn record(&mut self, sql: &str) {
        self.statements += 1;
        if self.verbosity.echo_statements() {
            debug!("{}: {}", self.name, sql.trim_end());
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Statements submitted so far.
    pub fn statements(&self) -> u64 {
        self.statements
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}
