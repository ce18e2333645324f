//! # mysql-pg-migrate
//!
//! MySQL to PostgreSQL schema and data migration library.
//!
//! This library provides:
//!
//! - **Type translation** from MySQL column types to PostgreSQL DDL through
//!   an engine-neutral [`Type`]
//! - **Two destinations** behind one [`Executor`]: a live PostgreSQL
//!   connection or a SQL file
//! - **Bulk transfers** using the PostgreSQL binary COPY protocol, with
//!   batched INSERTs as the fallback
//! - **Projections**: computed source views migrated like tables
//! - **Merge mode**: per-table create-if-missing and load in one transaction
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_pg_migrate::{Config, Orchestrator, Verbosity};
//!
//! #[tokio::main]
//! async fn main() -> mysql_pg_migrate::Result<()> {
//!     let config = Config::load("config.yml")?;
//!     let orchestrator = Orchestrator::new(config, Verbosity::new(1))?;
//!     let result = orchestrator.run().await?;
//!     println!("Migrated {} rows", result.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod transfer;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use config::{Config, DbConfig, Verbosity};
pub use crate::core::{Column, RowCursor, SourceReader, SqlValue, Table, Type};
pub use drivers::{MysqlReader, PgExecutor, PostgresTypeMapper};
pub use error::{MigrateError, Result};
pub use executor::{Capability, Executor, FileExecutor};
pub use orchestrator::{Converter, MigrationResult, Orchestrator, TableSummary};
pub use transfer::TransferEngine;
