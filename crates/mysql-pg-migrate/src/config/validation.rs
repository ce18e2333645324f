//! Configuration validation.

use tracing::warn;

use super::{Config, DbConfig};
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    validate_db("mysql", &config.mysql)?;
    if config.mysql.database.is_empty() {
        return Err(MigrateError::Config("mysql.database is required".into()));
    }

    // Destination validation
    match (&config.destination.file, &config.destination.postgres) {
        (None, None) => {
            return Err(MigrateError::Config(
                "destination requires either file or postgres".into(),
            ))
        }
        (Some(_), Some(_)) => {
            return Err(MigrateError::Config(
                "destination.file and destination.postgres are mutually exclusive".into(),
            ))
        }
        (Some(path), None) if path.as_os_str().is_empty() => {
            return Err(MigrateError::Config("destination.file is empty".into()))
        }
        (None, Some(pg)) => validate_db("destination.postgres", pg)?,
        _ => {}
    }

    for (name, projection) in &config.projections {
        if projection.body.trim().is_empty() {
            return Err(MigrateError::Config(format!(
                "projections.{}.body is required",
                name
            )));
        }
        if let Some(engine) = projection.engine.as_deref() {
            if !engine.is_empty() && !engine.eq_ignore_ascii_case("mysql") {
                return Err(MigrateError::Config(format!(
                    "projections.{}.engine must be 'mysql', got '{}'",
                    name, engine
                )));
            }
        }
        if config.views.contains_key(name) {
            return Err(MigrateError::Config(format!(
                "'{}' is defined both as a view and as a projection",
                name
            )));
        }
    }

    for (name, body) in &config.views {
        if body.trim().is_empty() {
            return Err(MigrateError::Config(format!("views.{} has an empty body", name)));
        }
    }

    if let Some(0) = config.insert_batch_rows {
        return Err(MigrateError::Config(
            "insert_batch_rows must be at least 1".into(),
        ));
    }

    let excluded = config.exclude_set();
    for name in config.only_tables.iter().filter(|t| excluded.contains(*t)) {
        warn!(
            "Table '{}' is listed in both only_tables and exclude_tables; it will be excluded",
            name
        );
    }

    Ok(())
}

fn validate_db(section: &str, db: &DbConfig) -> Result<()> {
    if db.hostname.is_empty() && db.socket.is_empty() {
        return Err(MigrateError::Config(format!(
            "{}.hostname or {}.socket is required",
            section, section
        )));
    }
    if db.username.is_empty() {
        return Err(MigrateError::Config(format!("{}.username is required", section)));
    }
    Ok(())
}
