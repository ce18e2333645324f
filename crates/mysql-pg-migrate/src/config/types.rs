//! Configuration type definitions.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MySQL).
    pub mysql: DbConfig,

    /// Where the converted schema and data go.
    pub destination: DestinationConfig,

    /// Temporary views created on the source for the duration of the run.
    /// Keyed by view name, value is the SELECT body.
    #[serde(default)]
    pub views: BTreeMap<String, String>,

    /// Computed tables materialized as source views and migrated like tables.
    #[serde(default)]
    pub projections: BTreeMap<String, ProjectionConfig>,

    /// Source table name -> destination table name.
    #[serde(default)]
    pub table_map: BTreeMap<String, String>,

    /// Skip the data phase.
    #[serde(default, alias = "supress_data")]
    pub suppress_data: bool,

    /// Skip CREATE TABLE, index and constraint statements.
    #[serde(default, alias = "supress_ddl")]
    pub suppress_ddl: bool,

    /// Truncate destination tables before loading.
    #[serde(default)]
    pub force_truncate: bool,

    /// Merge each table in its own transaction, creating it if missing.
    #[serde(default)]
    pub merge: bool,

    /// Pin the source session to UTC and emit `timestamp with time zone`.
    #[serde(default)]
    pub timezone: bool,

    /// When non-empty, only these source tables are migrated.
    #[serde(default)]
    pub only_tables: Vec<String>,

    /// Source tables never migrated. Wins over `only_tables`.
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Rows per INSERT statement on the row-wise path.
    /// Defaults to 64 for a live destination and 256 for a file.
    #[serde(default)]
    pub insert_batch_rows: Option<usize>,

    /// Use binary COPY against a live destination.
    #[serde(default = "default_true")]
    pub bulk_copy: bool,

    /// Recreate secondary indexes after the data phase.
    #[serde(default = "default_true")]
    pub create_indexes: bool,

    /// Recreate foreign keys after the data phase.
    #[serde(default = "default_true")]
    pub create_foreign_keys: bool,
}

impl Config {
    /// Inclusion list as a set.
    pub fn only_set(&self) -> HashSet<String> {
        self.only_tables.iter().cloned().collect()
    }

    /// Exclusion list as a set.
    pub fn exclude_set(&self) -> HashSet<String> {
        self.exclude_tables.iter().cloned().collect()
    }

    /// Destination name for a source table.
    pub fn destination_name(&self, source: &str) -> String {
        map_table_name(source, &self.table_map)
    }
}

/// Apply the rename map; unmapped names pass through.
pub fn map_table_name(source: &str, table_map: &BTreeMap<String, String>) -> String {
    table_map
        .get(source)
        .cloned()
        .unwrap_or_else(|| source.to_string())
}

/// Connection parameters shared by the source and a live destination.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct DbConfig {
    /// Server host name. Ignored when `socket` is set.
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Unix socket path (MySQL) or socket directory (PostgreSQL).
    #[serde(default)]
    pub socket: String,

    /// Server port. 0 selects the engine default.
    #[serde(default)]
    pub port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub database: String,

    /// Request protocol compression where the driver supports it.
    #[serde(default)]
    pub compress: bool,

    /// Require TLS for the connection.
    #[serde(default)]
    pub sslmode: bool,
}

impl DbConfig {
    /// Port, or `default` when unset.
    pub fn port_or(&self, default: u16) -> u16 {
        if self.port == 0 {
            default
        } else {
            self.port
        }
    }

    /// Human-readable endpoint for log lines. Never includes credentials.
    pub fn endpoint(&self, default_port: u16) -> String {
        if self.socket.is_empty() {
            format!(
                "{}:{}/{}",
                self.hostname,
                self.port_or(default_port),
                self.database
            )
        } else {
            format!("{}/{}", self.socket, self.database)
        }
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("hostname", &self.hostname)
            .field("socket", &self.socket)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("compress", &self.compress)
            .field("sslmode", &self.sslmode)
            .finish()
    }
}

/// Destination section: exactly one of `file` or `postgres`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Write the statement stream to this SQL file.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Load into a live PostgreSQL database.
    #[serde(default)]
    pub postgres: Option<DbConfig>,
}

/// Resolved destination target.
#[derive(Debug, Clone, Copy)]
pub enum Destination<'a> {
    File(&'a Path),
    Postgres(&'a DbConfig),
}

impl DestinationConfig {
    /// The configured target, if exactly one is set.
    pub fn target(&self) -> Option<Destination<'_>> {
        match (&self.file, &self.postgres) {
            (Some(path), None) => Some(Destination::File(path)),
            (None, Some(db)) => Some(Destination::Postgres(db)),
            _ => None,
        }
    }
}

/// A computed table: a source view plus destination hints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Primary-key columns for the destination table.
    #[serde(default)]
    pub pk: Vec<String>,

    /// Column name -> source type string, parsed with the MySQL type rules.
    #[serde(default)]
    pub column_types: BTreeMap<String, String>,

    /// WHERE clause applied when reading the projection.
    #[serde(default)]
    pub destination_conditions: Option<String>,

    /// SELECT body of the view.
    #[serde(default)]
    pub body: String,

    /// Engine the body is written for. Only `mysql` is understood.
    #[serde(default)]
    pub engine: Option<String>,
}

/// How chatty the run is.
///
/// Level 1 logs connections and per-table progress, level 2 echoes every
/// statement an executor submits, level 3 also dumps the loaded config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Verbosity(u8);

impl Verbosity {
    pub const QUIET: Verbosity = Verbosity(0);

    pub fn new(level: u8) -> Self {
        Verbosity(level)
    }

    pub fn level(self) -> u8 {
        self.0
    }

    pub fn progress(self) -> bool {
        self.0 >= 1
    }

    pub fn echo_statements(self) -> bool {
        self.0 >= 2
    }

    pub fn dump_config(self) -> bool {
        self.0 >= 3
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_true() -> bool {
    true
}
