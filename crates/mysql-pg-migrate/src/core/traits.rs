//! Source reader seam.

use std::collections::HashSet;

use async_trait::async_trait;

use super::cursor::RowCursor;
use super::schema::Table;
use crate::error::Result;

/// Read schema and rows from a source database.
///
/// Implementations introspect tables, stream rows through a [`RowCursor`],
/// and manage the temporary views projections are built from.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Every base table in the source database, columns populated.
    async fn tables(&self) -> Result<Vec<Table>>;

    /// Base tables after applying the inclusion and exclusion sets.
    async fn filtered_tables(
        &self,
        only: &HashSet<String>,
        exclude: &HashSet<String>,
    ) -> Result<Vec<Table>> {
        Ok(filter_tables(self.tables().await?, only, exclude))
    }

    /// Introspect one table or view by name.
    async fn describe(&self, name: &str) -> Result<Table>;

    /// Open a cursor over the table's rows, honoring `table.filter`.
    async fn read(&self, table: &Table) -> Result<RowCursor>;

    async fn create_view(&self, name: &str, body: &str) -> Result<()>;

    async fn drop_view(&self, name: &str) -> Result<()>;

    /// Populate `table.indexes` with non-primary indexes.
    async fn load_indexes(&self, table: &mut Table) -> Result<()>;

    /// Populate `table.foreign_keys`.
    async fn load_foreign_keys(&self, table: &mut Table) -> Result<()>;

    /// Release the source connection.
    async fn close(&self);
}

/// Keep tables named in `only` (all when empty), then drop those in
/// `exclude`. A name in both sets is dropped.
pub fn filter_tables(
    tables: Vec<Table>,
    only: &HashSet<String>,
    exclude: &HashSet<String>,
) -> Vec<Table> {
    tables
        .into_iter()
        .filter(|t| is_selected(&t.name, only, exclude))
        .collect()
}

/// Selection rule shared by base tables and projections.
pub fn is_selected(name: &str, only: &HashSet<String>, exclude: &HashSet<String>) -> bool {
    (only.is_empty() || only.contains(name)) && !exclude.contains(name)
}
