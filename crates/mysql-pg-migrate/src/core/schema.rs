//! Schema metadata types.

use super::types::Type;

/// Column metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Generic type derived from `source_type`.
    pub ty: Type,

    /// Source type string as introspected (e.g. `int unsigned`, `varchar(255)`).
    pub source_type: String,

    /// Part of the primary key.
    pub primary_key: bool,

    /// Whether the column allows NULL.
    pub is_nullable: bool,
}

/// Table metadata, columns in physical order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// Table (or view) name on the source.
    pub name: String,

    pub columns: Vec<Column>,

    /// WHERE clause applied when reading rows.
    pub filter: Option<String>,

    /// Backed by a source view rather than a base table.
    pub is_view: bool,

    /// Secondary indexes, loaded on demand.
    pub indexes: Vec<Index>,

    /// Foreign keys, loaded on demand.
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Primary-key column names in column order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Check if table has a primary key.
    pub fn has_pk(&self) -> bool {
        self.columns.iter().any(|c| c.primary_key)
    }

    /// Column names in physical order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Index metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    /// Index name.
    pub name: String,

    /// Index columns in order.
    pub columns: Vec<String>,

    /// Whether this is a unique index.
    pub is_unique: bool,
}

/// Foreign key metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,

    /// Local columns.
    pub columns: Vec<String>,

    /// Referenced table.
    pub ref_table: String,

    /// Referenced columns.
    pub ref_columns: Vec<String>,

    /// ON DELETE action.
    pub on_delete: String,

    /// ON UPDATE action.
    pub on_update: String,
}
