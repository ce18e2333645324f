//! Migration orchestrator.
//!
//! Connects the source reader and destination executor, then runs the
//! conversion phases in order:
//!
//! 1. create temporary views and projections on the source
//! 2. filter the table list
//! 3. create destination tables
//! 4. truncate destination tables
//! 5. transfer data, per table, merge or plain write
//! 6. create indexes
//! 7. create foreign keys
//! 8. drop the temporary views (always, once any exist)

mod views;

pub use views::TempViews;

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Config, Destination, ProjectionConfig, Verbosity};
use crate::core::{is_selected, SourceReader, Table};
use crate::drivers::mysql::{to_generic, MysqlReader};
use crate::drivers::postgres::{session_init, PgExecutor, PostgresTypeMapper};
use crate::error::{MigrateError, Result};
use crate::executor::{settle, Executor, FileExecutor};
use crate::transfer::TransferEngine;

/// Rows moved for one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    /// Source table or projection name.
    pub source: String,

    /// Destination table name after renaming.
    pub destination: String,

    /// Rows transferred; zero when the data phase is suppressed.
    pub rows: u64,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    /// Final status.
    pub status: String,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Tables processed.
    pub tables_total: usize,

    /// Total rows transferred.
    pub rows_transferred: u64,

    /// Average throughput (rows/second).
    pub rows_per_second: u64,

    /// Per-table detail in migration order.
    pub tables: Vec<TableSummary>,
}

impl MigrationResult {
    /// Pretty-printed JSON for `--output-json`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Runs the conversion phases over an already connected reader and engine.
pub struct Converter<'a> {
    config: &'a Config,
    reader: &'a dyn SourceReader,
    engine: &'a mut TransferEngine,
    verbosity: Verbosity,
}

impl<'a> Converter<'a> {
    pub fn new(
        config: &'a Config,
        reader: &'a dyn SourceReader,
        engine: &'a mut TransferEngine,
        verbosity: Verbosity,
    ) -> Self {
        Self {
            config,
            reader,
            engine,
            verbosity,
        }
    }

    /// Run every phase. Temporary views are dropped whether or not the
    /// phases succeed.
    pub async fn convert(&mut self) -> Result<Vec<TableSummary>> {
        let mut views = TempViews::new(self.verbosity);
        let outcome = self.run_phases(&mut views).await;
        if !views.is_empty() {
            views.erase(self.reader).await;
        }
        outcome
    }

    async fn run_phases(&mut self, views: &mut TempViews) -> Result<Vec<TableSummary>> {
        let config = self.config;
        let only = config.only_set();
        let exclude = config.exclude_set();

        if !config.views.is_empty() {
            info!("Creating {} views", config.views.len());
            for (name, body) in &config.views {
                views.create(self.reader, name, body).await;
            }
        }

        let mut projections = Vec::new();
        for (name, projection) in &config.projections {
            if !is_selected(name, &only, &exclude) {
                debug!("projection {} not selected", name);
                continue;
            }
            if !views.create(self.reader, name, &projection.body).await {
                warn!("Skipping projection {}: its view could not be created", name);
                continue;
            }
            projections.push(self.projection_table(name, projection).await?);
        }

        let mut tables = self.reader.filtered_tables(&only, &exclude).await?;
        tables.extend(projections);
        info!("Found {} tables to migrate", tables.len());

        if !config.suppress_ddl {
            for table in tables.iter_mut().filter(|t| !t.is_view) {
                if config.create_indexes {
                    self.reader.load_indexes(table).await?;
                }
                if config.create_foreign_keys {
                    self.reader.load_foreign_keys(table).await?;
                }
            }

            info!("Creating destination tables");
            for table in &tables {
                self.engine
                    .create_table(table, &config.destination_name(&table.name))
                    .await?;
            }
        }

        if config.force_truncate {
            info!("Truncating destination tables");
            for table in &tables {
                self.engine
                    .truncate_table(&config.destination_name(&table.name))
                    .await?;
            }
        }

        let summaries = if config.suppress_data {
            info!("Data transfer suppressed");
            tables
                .iter()
                .map(|t| TableSummary {
                    source: t.name.clone(),
                    destination: config.destination_name(&t.name),
                    rows: 0,
                })
                .collect()
        } else {
            self.transfer_data(&tables).await?
        };

        if !config.suppress_ddl {
            self.create_indices(&tables).await;
            self.create_constraints(&tables).await;
        }

        Ok(summaries)
    }

    /// Describe a projection's view and apply its configured overrides.
    async fn projection_table(&self, name: &str, projection: &ProjectionConfig) -> Result<Table> {
        let mut table = self.reader.describe(name).await?;
        table.is_view = true;
        table.filter = projection
            .destination_conditions
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        if !projection.pk.is_empty() {
            for col in &mut table.columns {
                col.primary_key = projection.pk.contains(&col.name);
            }
        }
        for (column, source_type) in &projection.column_types {
            match table.columns.iter_mut().find(|c| &c.name == column) {
                Some(col) => {
                    col.ty = to_generic(source_type);
                    col.source_type = source_type.clone();
                }
                None => warn!(
                    "Projection {}: column type override for unknown column {}",
                    name, column
                ),
            }
        }
        Ok(table)
    }

    async fn transfer_data(&mut self, tables: &[Table]) -> Result<Vec<TableSummary>> {
        let mode = if self.config.merge { "Merging" } else { "Writing" };
        info!("{} data for {} tables", mode, tables.len());

        let mut summaries = Vec::with_capacity(tables.len());
        for table in tables {
            let destination = self.config.destination_name(&table.name);
            if self.verbosity.progress() {
                info!("{} {} into {}", mode, table.name, destination);
            }
            let rows = if self.config.merge {
                self.engine.merge_table(table, &destination, self.reader).await?
            } else {
                self.engine.write_table(table, &destination, self.reader).await?
            };
            summaries.push(TableSummary {
                source: table.name.clone(),
                destination,
                rows,
            });
        }
        Ok(summaries)
    }

    async fn create_indices(&mut self, tables: &[Table]) {
        if !self.config.create_indexes {
            return;
        }
        let mut created = 0;
        for table in tables {
            let destination = self.config.destination_name(&table.name);
            created += self.engine.create_indexes(table, &destination).await;
        }
        info!("Created {} indexes", created);
    }

    async fn create_constraints(&mut self, tables: &[Table]) {
        if !self.config.create_foreign_keys {
            return;
        }
        let config = self.config;
        let migrated: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        let mut created = 0;
        for table in tables {
            let destination = config.destination_name(&table.name);
            created += self
                .engine
                .create_foreign_keys(table, &destination, |referenced| {
                    migrated
                        .contains(&referenced)
                        .then(|| config.destination_name(referenced))
                })
                .await;
        }
        info!("Created {} foreign keys", created);
    }
}

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    verbosity: Verbosity,
}

impl Orchestrator {
    /// Create a new orchestrator. The configuration is validated again here.
    pub fn new(config: Config, verbosity: Verbosity) -> Result<Self> {
        config.validate()?;
        if verbosity.dump_config() {
            debug!("Loaded configuration: {:#?}", config);
        }
        Ok(Self { config, verbosity })
    }

    /// Connect both ends and run the migration.
    pub async fn run(self) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let started = Instant::now();
        info!("Starting migration");

        let (reader, mut engine) = self.connect().await?;

        let outcome = Converter::new(&self.config, &reader, &mut engine, self.verbosity)
            .convert()
            .await;

        let closed = engine.close().await;
        reader.close().await;
        let tables = settle(outcome, closed, "closing destination")?;

        let duration = started.elapsed().as_secs_f64();
        let rows_transferred: u64 = tables.iter().map(|t| t.rows).sum();
        let rows_per_second = if duration > 0.0 {
            (rows_transferred as f64 / duration) as u64
        } else {
            0
        };
        info!(
            "Migration completed: {} tables, {} rows in {:.1}s",
            tables.len(),
            rows_transferred,
            duration
        );

        Ok(MigrationResult {
            status: "completed".to_string(),
            started_at,
            completed_at: Utc::now(),
            duration_seconds: duration,
            tables_total: tables.len(),
            rows_transferred,
            rows_per_second,
            tables,
        })
    }

    /// Drop the destination tables the migration would write.
    pub async fn clear(self) -> Result<Vec<String>> {
        let (reader, mut engine) = self.connect().await?;

        let outcome = self.clear_with(&reader, &mut engine).await;
        let closed = engine.close().await;
        reader.close().await;
        settle(outcome, closed, "closing destination")
    }

    async fn clear_with(
        &self,
        reader: &dyn SourceReader,
        engine: &mut TransferEngine,
    ) -> Result<Vec<String>> {
        let names = clear_targets(&self.config, reader).await?;
        info!("Dropping {} destination tables", names.len());
        engine.clear_tables(&names).await?;
        Ok(names)
    }

    async fn connect(&self) -> Result<(MysqlReader, TransferEngine)> {
        let reader = MysqlReader::connect(&self.config.mysql, self.config.timezone, self.verbosity).await?;

        match self.open_engine().await {
            Ok(engine) => Ok((reader, engine)),
            Err(e) => {
                reader.close().await;
                Err(e)
            }
        }
    }

    async fn open_engine(&self) -> Result<TransferEngine> {
        let executor: Box<dyn Executor> = match self.config.destination.target() {
            Some(Destination::File(path)) => {
                Box::new(FileExecutor::create(path, self.verbosity).await?)
            }
            Some(Destination::Postgres(db)) => {
                Box::new(PgExecutor::connect(db, self.config.bulk_copy, self.verbosity).await?)
            }
            None => {
                return Err(MigrateError::Config(
                    "destination must name exactly one of file or postgres".into(),
                ))
            }
        };

        let mut engine = TransferEngine::new(
            executor,
            PostgresTypeMapper::new(self.config.timezone),
            self.verbosity,
        )
        .with_insert_batch_rows(self.config.insert_batch_rows);
        engine.init_session(&session_init(self.config.timezone)).await?;
        Ok(engine)
    }
}

/// Destination names for the selected base tables and projections.
async fn clear_targets(config: &Config, reader: &dyn SourceReader) -> Result<Vec<String>> {
    let only = config.only_set();
    let exclude = config.exclude_set();

    let mut names: Vec<String> = reader
        .filtered_tables(&only, &exclude)
        .await?
        .iter()
        .map(|t| config.destination_name(&t.name))
        .collect();
    names.extend(
        config
            .projections
            .keys()
            .filter(|name| is_selected(name, &only, &exclude))
            .map(|name| config.destination_name(name)),
    );
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, ForeignKey, Index, IntSize, Type};
    use crate::testing::{int_rows, int_table, MemoryReader, Recorded, RecordingExecutor};

    const CONFIG: &str = r#"
mysql:
  hostname: localhost
  username: root
  database: shop
destination:
  file: out.sql
"#;

    fn config(extra: &str) -> Config {
        Config::from_yaml(&format!("{}{}", CONFIG, extra)).unwrap()
    }

    fn engine(bulk: bool) -> (TransferEngine, Recorded) {
        let (executor, log) = RecordingExecutor::new(bulk, 64);
        let engine = TransferEngine::new(
            Box::new(executor),
            PostgresTypeMapper::new(false),
            Verbosity::QUIET,
        );
        (engine, log)
    }

    fn shop() -> MemoryReader {
        MemoryReader::new()
            .with_table(int_table("customers"), int_rows(3))
            .with_table(int_table("orders"), int_rows(5))
            .with_table(int_table("audit"), int_rows(2))
    }

    async fn convert(
        config: &Config,
        reader: &MemoryReader,
        engine: &mut TransferEngine,
    ) -> Result<Vec<TableSummary>> {
        Converter::new(config, reader, engine, Verbosity::QUIET)
            .convert()
            .await
    }

    #[tokio::test]
    async fn test_phases_in_order_with_rename() {
        let config = config("table_map:\n  orders: orders_v2\nexclude_tables: [audit]\nforce_truncate: true\n");
        let reader = shop();
        let (mut engine, log) = engine(false);

        let tables = convert(&config, &reader, &mut engine).await.unwrap();
        let names: Vec<(&str, &str, u64)> = tables
            .iter()
            .map(|t| (t.source.as_str(), t.destination.as_str(), t.rows))
            .collect();
        assert_eq!(
            names,
            vec![("customers", "customers", 3), ("orders", "orders_v2", 5)]
        );

        let events = log.events();
        let first = |prefix: &str| events.iter().position(|e| e.starts_with(prefix)).unwrap();
        assert!(first("CREATE TABLE") < first("TRUNCATE"));
        assert!(first("TRUNCATE") < first("BEGIN write table"));
        assert!(events.iter().any(|e| e.starts_with("CREATE TABLE IF NOT EXISTS \"orders_v2\"")));
        assert!(events.iter().any(|e| e == "TRUNCATE TABLE \"orders_v2\""));
        assert!(!events.iter().any(|e| e.contains("audit")));
    }

    #[tokio::test]
    async fn test_merge_mode_uses_merge_per_table() {
        let config = config("merge: true\nsuppress_ddl: true\nonly_tables: [orders]\n");
        let reader = shop();
        let (mut engine, log) = engine(true);

        let tables = convert(&config, &reader, &mut engine).await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows, 5);
        assert_eq!(log.bulk_rows(), 5);
        assert_eq!(
            log.events(),
            vec![
                "BEGIN merge table orders into orders".to_string(),
                "CREATE TABLE IF NOT EXISTS \"orders\" (\n\t\"id\" integer NOT NULL,\n\tPRIMARY KEY (\"id\")\n)".to_string(),
                "COPY orders".to_string(),
                "COPY END".to_string(),
                "COMMIT".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_suppress_data_skips_transfer() {
        let config = config("suppress_data: true\n");
        let reader = shop();
        let (mut engine, log) = engine(false);

        let tables = convert(&config, &reader, &mut engine).await.unwrap();
        assert_eq!(tables.len(), 3);
        assert!(tables.iter().all(|t| t.rows == 0));
        assert_eq!(log.insert_statements(), 0);
        assert!(reader.read_log().lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_views_dropped_after_success() {
        let config = config("views:\n  v_a: SELECT 1\n  v_b: SELECT 2\n");
        let reader = shop();
        let views = reader.view_log();
        let (mut engine, _) = engine(false);

        convert(&config, &reader, &mut engine).await.unwrap();
        assert_eq!(
            *views.lock().unwrap(),
            vec!["create v_a", "create v_b", "drop v_b", "drop v_a"]
        );
    }

    #[tokio::test]
    async fn test_views_dropped_after_failure() {
        let config = config("views:\n  v_a: SELECT 1\n");
        let reader = shop().failing_read_after("customers", 1);
        let views = reader.view_log();
        let (mut engine, log) = engine(false);

        let err = convert(&config, &reader, &mut engine).await.unwrap_err();
        assert!(err.to_string().contains("read failed"));
        assert_eq!(*views.lock().unwrap(), vec!["create v_a", "drop v_a"]);
        assert_eq!(log.events().last().map(String::as_str), Some("ROLLBACK"));
        // The failing table aborts the run before later tables.
        assert!(!log
            .events()
            .iter()
            .any(|e| e.starts_with("BEGIN write table orders")));
    }

    #[tokio::test]
    async fn test_failed_view_is_not_dropped() {
        let config = config("views:\n  v_bad: SELECT\n  v_ok: SELECT 1\n");
        let reader = shop().failing_view("v_bad");
        let views = reader.view_log();
        let (mut engine, _) = engine(false);

        convert(&config, &reader, &mut engine).await.unwrap();
        assert_eq!(*views.lock().unwrap(), vec!["create v_ok", "drop v_ok"]);
    }

    #[tokio::test]
    async fn test_projection_overrides() {
        let config = config(
            r#"projections:
  big_orders:
    body: SELECT id, total FROM orders
    pk: [id]
    column_types:
      total: decimal(12,2)
    destination_conditions: total > 100
"#,
        );
        let mut shape = Table::new("big_orders");
        shape.is_view = true;
        shape.columns = vec![
            Column {
                name: "id".into(),
                ty: Type::Int(IntSize::Normal),
                source_type: "int".into(),
                primary_key: false,
                is_nullable: false,
            },
            Column {
                name: "total".into(),
                ty: Type::Double,
                source_type: "double".into(),
                primary_key: false,
                is_nullable: true,
            },
        ];
        let reader = MemoryReader::new().with_table(shape, Vec::new());
        let reads = reader.read_log();
        let views = reader.view_log();
        let (mut engine, log) = engine(false);

        let tables = convert(&config, &reader, &mut engine).await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].source, "big_orders");
        assert_eq!(*reads.lock().unwrap(), vec!["big_orders where total > 100"]);
        assert!(log.events().iter().any(|e| e
            == "CREATE TABLE IF NOT EXISTS \"big_orders\" (\n\t\"id\" integer NOT NULL,\n\t\"total\" numeric(12,2),\n\tPRIMARY KEY (\"id\")\n)"));
        assert_eq!(
            *views.lock().unwrap(),
            vec!["create big_orders", "drop big_orders"]
        );
    }

    #[tokio::test]
    async fn test_excluded_projection_is_not_created() {
        let config = config("projections:\n  p:\n    body: SELECT 1\nexclude_tables: [p]\n");
        let reader = shop();
        let views = reader.view_log();
        let (mut engine, _) = engine(false);

        let tables = convert(&config, &reader, &mut engine).await.unwrap();
        assert_eq!(tables.len(), 3);
        assert!(views.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_projection_with_failed_view_is_skipped() {
        // No shape is registered for `p`, so describing it would fail.
        let config = config("projections:\n  p:\n    body: SELECT\n");
        let reader = shop().failing_view("p");
        let views = reader.view_log();
        let (mut engine, log) = engine(false);

        let tables = convert(&config, &reader, &mut engine).await.unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.source.as_str()).collect();
        assert_eq!(names, vec!["customers", "orders", "audit"]);
        assert!(views.lock().unwrap().is_empty());
        assert!(!log.events().iter().any(|e| e.contains("\"p\"")));
    }

    #[tokio::test]
    async fn test_views_dropped_after_ddl_failure() {
        let config = config("views:\n  v_a: SELECT 1\n");
        let reader = shop();
        let views = reader.view_log();
        let (executor, log) = RecordingExecutor::new(false, 64);
        let mut engine = TransferEngine::new(
            Box::new(executor.failing_on("CREATE TABLE")),
            PostgresTypeMapper::new(false),
            Verbosity::QUIET,
        );

        assert!(convert(&config, &reader, &mut engine).await.is_err());
        assert_eq!(*views.lock().unwrap(), vec!["create v_a", "drop v_a"]);
        assert!(!log.events().iter().any(|e| e.starts_with("BEGIN write")));
        assert!(reader.read_log().lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_views_dropped_after_describe_failure() {
        // The projection view is created but its shape cannot be described.
        let config = config("views:\n  v_a: SELECT 1\nprojections:\n  p:\n    body: SELECT 2\n");
        let reader = shop();
        let views = reader.view_log();
        let (mut engine, log) = engine(false);

        let err = convert(&config, &reader, &mut engine).await.unwrap_err();
        assert!(err.to_string().contains("p not found"));
        assert_eq!(
            *views.lock().unwrap(),
            vec!["create v_a", "create p", "drop p", "drop v_a"]
        );
        assert!(log.events().is_empty());
    }

    #[tokio::test]
    async fn test_indexes_and_constraints_after_data() {
        let config = config("exclude_tables: [audit]\ntable_map:\n  customers: clients\n");
        let mut orders = int_table("orders");
        orders.indexes.push(Index {
            name: "idx_id".into(),
            columns: vec!["id".into()],
            is_unique: false,
        });
        orders.foreign_keys = vec![
            ForeignKey {
                name: "fk_customer".into(),
                columns: vec!["id".into()],
                ref_table: "customers".into(),
                ref_columns: vec!["id".into()],
                on_delete: "CASCADE".into(),
                on_update: "NO ACTION".into(),
            },
            ForeignKey {
                name: "fk_audit".into(),
                columns: vec!["id".into()],
                ref_table: "audit".into(),
                ref_columns: vec!["id".into()],
                on_delete: "NO ACTION".into(),
                on_update: "NO ACTION".into(),
            },
        ];
        let reader = MemoryReader::new()
            .with_table(int_table("customers"), int_rows(1))
            .with_table(orders, int_rows(1))
            .with_table(int_table("audit"), int_rows(1));
        let (mut engine, log) = engine(false);

        convert(&config, &reader, &mut engine).await.unwrap();
        let statements = log.statements();
        let last_commit = log.events().iter().rposition(|e| e == "COMMIT").unwrap();
        let index_pos = log
            .events()
            .iter()
            .position(|e| e.starts_with("CREATE INDEX"))
            .unwrap();
        assert!(index_pos > last_commit);
        assert!(statements.iter().any(|s| s
            == "ALTER TABLE \"orders\" ADD CONSTRAINT \"fk_customer\" FOREIGN KEY (\"id\") REFERENCES \"clients\" (\"id\") ON DELETE CASCADE ON UPDATE NO ACTION"));
        assert!(!statements.iter().any(|s| s.contains("fk_audit")));
    }

    #[test]
    fn test_result_serializes() {
        let now = Utc::now();
        let result = MigrationResult {
            status: "completed".into(),
            started_at: now,
            completed_at: now,
            duration_seconds: 1.5,
            tables_total: 1,
            rows_transferred: 10,
            rows_per_second: 6,
            tables: vec![TableSummary {
                source: "orders".into(),
                destination: "orders_v2".into(),
                rows: 10,
            }],
        };
        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(json["rows_transferred"], 10);
        assert_eq!(json["tables"][0]["destination"], "orders_v2");
    }

    #[tokio::test]
    async fn test_clear_targets_apply_rename_and_filters() {
        let config = config(
            "exclude_tables: [audit]\ntable_map:\n  orders: orders_v2\nprojections:\n  p:\n    body: SELECT 1\n",
        );
        let names = clear_targets(&config, &shop()).await.unwrap();
        assert_eq!(names, vec!["customers", "orders_v2", "p"]);
    }
}
