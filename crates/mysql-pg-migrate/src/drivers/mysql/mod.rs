//! MySQL/MariaDB source driver.
//!
//! - [`MysqlReader`]: schema introspection, row streaming, view management
//! - [`typemap`]: MySQL column type strings to generic types
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+
//!
//! Column types are read from `INFORMATION_SCHEMA.COLUMNS.COLUMN_TYPE`, which
//! on MySQL 8 no longer carries integer display widths.

mod decode;
mod reader;
pub mod typemap;

pub use reader::{MysqlReader, MYSQL_DEFAULT_PORT};
pub use typemap::to_generic;
