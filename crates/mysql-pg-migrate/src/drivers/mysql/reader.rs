//! MySQL/MariaDB source reader implementation.
//!
//! Uses SQLx with a single pooled connection: introspection, row streaming
//! and view management all run over it, one statement at a time.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::Row;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::decode::row_to_values;
use super::typemap::{source_type_descriptor, to_generic};
use crate::config::{DbConfig, Verbosity};
use crate::core::schema::{Column, ForeignKey, Index, Table};
use crate::core::traits::SourceReader;
use crate::core::value::Batch;
use crate::core::RowCursor;
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default MySQL port.
pub const MYSQL_DEFAULT_PORT: u16 = 3306;

/// Rows per batch sent from the reader task to the cursor.
const READ_BATCH_ROWS: usize = 1_000;

/// Batches buffered between the reader task and the cursor.
const READ_CHANNEL_BATCHES: usize = 16;

/// MySQL/MariaDB source reader implementation.
pub struct MysqlReader {
    pool: MySqlPool,
    database: String,
    verbosity: Verbosity,
}

impl MysqlReader {
    /// Connect to the source database.
    ///
    /// With `utc` set the session time zone is pinned to UTC; otherwise the
    /// server's zone is left alone.
    pub async fn connect(config: &DbConfig, utc: bool, verbosity: Verbosity) -> Result<Self> {
        let mut options = MySqlConnectOptions::new()
            .username(&config.username)
            .password(&config.password)
            .database(&config.database)
            .ssl_mode(if config.sslmode {
                MySqlSslMode::Required
            } else {
                MySqlSslMode::Preferred
            })
            .timezone(if utc { Some("+00:00".to_string()) } else { None });

        options = if config.socket.is_empty() {
            options
                .host(&config.hostname)
                .port(config.port_or(MYSQL_DEFAULT_PORT))
        } else {
            options.socket(&config.socket)
        };

        if config.compress {
            warn!("mysql: protocol compression is not supported by this driver, ignoring");
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::pool(e, "creating MySQL source pool"))?;

        // Test connection
        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| MigrateError::pool(e, "testing MySQL source connection"))?;

        if verbosity.progress() {
            info!(
                "Connected to MySQL source: {}",
                config.endpoint(MYSQL_DEFAULT_PORT)
            );
        }

        Ok(Self {
            pool,
            database: config.database.clone(),
            verbosity,
        })
    }

    /// Load columns for a table or view.
    async fn load_columns(&self, table: &mut Table) -> Result<()> {
        // CAST to CHAR to handle collation differences where information_schema
        // may return VARBINARY instead of VARCHAR
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(DATA_TYPE AS CHAR(255)) AS DATA_TYPE,
                CAST(COLUMN_TYPE AS CHAR(255)) AS COLUMN_TYPE,
                IF(COLUMN_KEY = 'PRI', 1, 0) AS is_pk,
                IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::query(e, format!("loading columns of `{}`", table.name)))?;

        for row in rows {
            let name: String = get(&row, "COLUMN_NAME")?;
            let data_type: String = get(&row, "DATA_TYPE")?;
            let column_type: String = get(&row, "COLUMN_TYPE")?;
            let source_type = source_type_descriptor(&data_type, &column_type);
            table.columns.push(Column {
                name,
                ty: to_generic(&source_type),
                source_type,
                primary_key: get::<i64>(&row, "is_pk")? == 1,
                is_nullable: get::<i64>(&row, "is_nullable")? == 1,
            });
        }

        Ok(())
    }

    /// Quote a MySQL identifier.
    fn quote_ident(name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    /// SELECT used to stream a table's rows.
    fn select_sql(table: &Table) -> String {
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| Self::quote_ident(&c.name))
            .collect();
        let mut sql = format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            Self::quote_ident(&table.name)
        );
        if let Some(filter) = table.filter.as_deref().filter(|f| !f.trim().is_empty()) {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        sql
    }

    /// Producer side of a row cursor.
    async fn stream_rows(
        pool: MySqlPool,
        table: Table,
        tx: mpsc::Sender<Result<Batch>>,
    ) -> Result<()> {
        let sql = Self::select_sql(&table);
        let context = || format!("reading rows from `{}`", table.name);
        let mut rows = sqlx::query(&sql).fetch(&pool);
        let mut batch = Vec::with_capacity(READ_BATCH_ROWS);

        while let Some(row) = rows.try_next().await.map_err(|e| MigrateError::query(e, context()))? {
            batch.push(row_to_values(&row, &table)?);
            if batch.len() >= READ_BATCH_ROWS {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(READ_BATCH_ROWS));
                if tx.send(Ok(Batch::new(full))).await.is_err() {
                    return Ok(()); // Receiver dropped
                }
            }
        }

        if !batch.is_empty() {
            let _ = tx.send(Ok(Batch::new(batch))).await;
        }
        Ok(())
    }
}

fn get<'r, T>(row: &'r MySqlRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::MySql> + sqlx::Type<sqlx::MySql>,
{
    row.try_get(column)
        .map_err(|e| MigrateError::query(e, format!("decoding information_schema column {}", column)))
}

#[async_trait]
impl SourceReader for MysqlReader {
    async fn tables(&self) -> Result<Vec<Table>> {
        let query = r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::query(e, "listing MySQL tables"))?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let mut table = Table::new(get::<String>(&row, "TABLE_NAME")?);
            self.load_columns(&mut table).await?;
            tables.push(table);
        }

        if self.verbosity.progress() {
            info!(
                "Extracted {} tables from MySQL database '{}'",
                tables.len(),
                self.database
            );
        }
        Ok(tables)
    }

    async fn describe(&self, name: &str) -> Result<Table> {
        let query = r#"
            SELECT CAST(TABLE_TYPE AS CHAR(64)) AS TABLE_TYPE
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        "#;

        let row: Option<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MigrateError::query(e, format!("describing `{}`", name)))?;

        let row = row.ok_or_else(|| {
            MigrateError::transfer(name, format!("not found in database '{}'", self.database))
        })?;

        let mut table = Table::new(name);
        table.is_view = get::<String>(&row, "TABLE_TYPE")? == "VIEW";
        self.load_columns(&mut table).await?;
        debug!(
            "Described {} `{}`: {} columns",
            if table.is_view { "view" } else { "table" },
            name,
            table.columns.len()
        );
        Ok(table)
    }

    async fn read(&self, table: &Table) -> Result<RowCursor> {
        if table.columns.is_empty() {
            return Err(MigrateError::transfer(&table.name, "table has no columns"));
        }

        let (tx, cursor) = RowCursor::channel(&table.name, READ_CHANNEL_BATCHES);
        let pool = self.pool.clone();
        let table = table.clone();

        tokio::spawn(async move {
            let name = table.name.clone();
            if let Err(e) = Self::stream_rows(pool, table, tx.clone()).await {
                debug!("{}: reader task stopped: {}", name, e);
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(cursor)
    }

    async fn create_view(&self, name: &str, body: &str) -> Result<()> {
        let sql = format!("CREATE OR REPLACE VIEW {} AS {}", Self::quote_ident(name), body);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrateError::query(e, format!("creating view `{}`", name)))?;
        Ok(())
    }

    async fn drop_view(&self, name: &str) -> Result<()> {
        let sql = format!("DROP VIEW IF EXISTS {}", Self::quote_ident(name));
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrateError::query(e, format!("dropping view `{}`", name)))?;
        Ok(())
    }

    async fn load_indexes(&self, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT
                CAST(INDEX_NAME AS CHAR(255)) AS INDEX_NAME,
                CAST(GROUP_CONCAT(COLUMN_NAME ORDER BY SEQ_IN_INDEX SEPARATOR ',') AS CHAR(4096)) AS columns,
                IF(NON_UNIQUE = 0, 1, 0) AS is_unique
            FROM INFORMATION_SCHEMA.STATISTICS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
              AND INDEX_NAME != 'PRIMARY'
            GROUP BY INDEX_NAME, NON_UNIQUE
            ORDER BY INDEX_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::query(e, format!("loading indexes of `{}`", table.name)))?;

        table.indexes.clear();
        for row in rows {
            let columns: String = get(&row, "columns")?;
            table.indexes.push(Index {
                name: get(&row, "INDEX_NAME")?,
                columns: columns.split(',').map(|s| s.to_string()).collect(),
                is_unique: get::<i64>(&row, "is_unique")? == 1,
            });
        }

        debug!("Loaded {} indexes for {}", table.indexes.len(), table.name);
        Ok(())
    }

    async fn load_foreign_keys(&self, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT
                CAST(rc.CONSTRAINT_NAME AS CHAR(255)) AS CONSTRAINT_NAME,
                CAST(kcu.COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(kcu.REFERENCED_TABLE_NAME AS CHAR(255)) AS REFERENCED_TABLE_NAME,
                CAST(kcu.REFERENCED_COLUMN_NAME AS CHAR(255)) AS REFERENCED_COLUMN_NAME,
                CAST(rc.DELETE_RULE AS CHAR(64)) AS DELETE_RULE,
                CAST(rc.UPDATE_RULE AS CHAR(64)) AS UPDATE_RULE
            FROM INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS rc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
                ON rc.CONSTRAINT_SCHEMA = kcu.CONSTRAINT_SCHEMA
                AND rc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
                AND rc.TABLE_NAME = kcu.TABLE_NAME
            WHERE rc.CONSTRAINT_SCHEMA = ? AND rc.TABLE_NAME = ?
            ORDER BY rc.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                MigrateError::query(e, format!("loading foreign keys of `{}`", table.name))
            })?;

        let mut foreign_keys: Vec<ForeignKey> = Vec::new();
        for row in rows {
            let name: String = get(&row, "CONSTRAINT_NAME")?;
            let column: String = get(&row, "COLUMN_NAME")?;
            let ref_column: String = get(&row, "REFERENCED_COLUMN_NAME")?;

            // Rows arrive grouped by constraint name.
            match foreign_keys.last_mut() {
                Some(fk) if fk.name == name => {
                    fk.columns.push(column);
                    fk.ref_columns.push(ref_column);
                }
                _ => foreign_keys.push(ForeignKey {
                    name,
                    columns: vec![column],
                    ref_table: get(&row, "REFERENCED_TABLE_NAME")?,
                    ref_columns: vec![ref_column],
                    on_delete: get(&row, "DELETE_RULE")?,
                    on_update: get(&row, "UPDATE_RULE")?,
                }),
            }
        }
        table.foreign_keys = foreign_keys;

        debug!(
            "Loaded {} foreign keys for {}",
            table.foreign_keys.len(),
            table.name
        );
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
