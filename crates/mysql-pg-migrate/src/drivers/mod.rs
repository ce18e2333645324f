//! Database drivers.
//!
//! - [`mysql`]: the source side, implementing [`SourceReader`](crate::core::SourceReader)
//! - [`postgres`]: the destination side, implementing [`Executor`](crate::executor::Executor)
//!   plus the PostgreSQL type mapping and literal rendering the transfer engine uses

pub mod mysql;
pub mod postgres;

pub use mysql::MysqlReader;
pub use postgres::{PgExecutor, PostgresTypeMapper};
