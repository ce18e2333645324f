//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source database query error
    #[error("Source database error while {context}: {source}")]
    Source {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// Statement rejected by the destination server.
    ///
    /// Carries the fields PostgreSQL reports for the failure.
    #[error("Destination error {code}\n  MESSAGE: {message}\n  DETAIL: {detail}\n  WHERE: {context}")]
    Destination {
        code: String,
        message: String,
        detail: String,
        context: String,
    },

    /// Destination connection or protocol error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Executor protocol misuse (bulk channel, transaction state, closed sink)
    #[error("Executor error: {0}")]
    Executor(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Wrap a source query error with what the reader was doing.
    pub fn query(err: sqlx::Error, context: impl Into<String>) -> Self {
        MigrateError::Source {
            context: context.into(),
            source: err,
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Translate a PostgreSQL client error.
    ///
    /// Server-side failures keep their SQLSTATE, message, detail and
    /// location. `context` stands in when the server gave no location.
    pub fn destination(err: tokio_postgres::Error, context: &str) -> Self {
        match err.as_db_error() {
            Some(db) => MigrateError::Destination {
                code: db.code().code().to_string(),
                message: db.message().to_string(),
                detail: db.detail().unwrap_or_default().to_string(),
                context: db.where_().unwrap_or(context).to_string(),
            },
            None => MigrateError::Target(err),
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::Source { .. } | MigrateError::Pool { .. } => 3,
            MigrateError::Destination { .. } | MigrateError::Target(_) => 4,
            MigrateError::Transfer { .. } | MigrateError::Executor(_) => 5,
            MigrateError::Io(_) => 6,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
