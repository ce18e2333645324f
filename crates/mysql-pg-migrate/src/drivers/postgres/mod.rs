//! PostgreSQL destination driver.
//!
//! - [`PgExecutor`]: live connection with binary COPY bulk loads
//! - [`PostgresTypeMapper`]: generic types to column types
//! - [`literal`]: value rendering for INSERT statements

mod copy;
mod executor;
pub mod literal;
mod typemap;

pub use executor::{PgExecutor, POSTGRES_DEFAULT_PORT};
pub use literal::to_literal;
pub use typemap::PostgresTypeMapper;

const SESSION_INIT: [&str; 3] = [
    "SET client_encoding = 'UTF8';",
    "SET standard_conforming_strings = on;",
    "SET client_min_messages = warning;",
];

/// Session settings applied once per destination.
///
/// With `timezone` set, timestamps are read from a UTC source session and
/// land in `timestamp with time zone` columns, so the destination session
/// is pinned to UTC as well. INSERT literals carry no offset and are then
/// read as the same instants the binary COPY path writes.
pub fn session_init(timezone: bool) -> Vec<&'static str> {
    let mut statements = SESSION_INIT.to_vec();
    if timezone {
        statements.push("SET TIME ZONE 'UTC';");
    }
    statements
}

/// Quote a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified table name, one part per dot.
pub fn quote_table(name: &str) -> String {
    name.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}
