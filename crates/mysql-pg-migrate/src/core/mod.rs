//! Core abstractions for engine-neutral migration.
//!
//! - [`types`]: generic column types every source type normalizes into
//! - [`schema`]: table, column, index and foreign-key metadata
//! - [`value`]: decoded row values
//! - [`cursor`]: the forward-only row stream a reader hands out
//! - [`traits`]: the [`SourceReader`] seam and table filtering

pub mod cursor;
pub mod schema;
pub mod traits;
pub mod types;
pub mod value;

pub use cursor::RowCursor;
pub use schema::{Column, ForeignKey, Index, Table};
pub use traits::{filter_tables, is_selected, SourceReader};
pub use types::{IntSize, Type};
pub use value::{Batch, Row, SqlNullType, SqlValue};
