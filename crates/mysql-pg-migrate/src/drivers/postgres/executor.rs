//! Live PostgreSQL executor.
//!
//! One `tokio-postgres` connection carries every statement of the run. Bulk
//! loads stream binary COPY data through the same connection, so they take
//! part in whatever transaction is open.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::SinkExt;
use rustls::ClientConfig;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, Config as PgConfig, CopyInSink, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, info, warn};

use super::{copy, quote_ident, quote_table};
use crate::config::{DbConfig, Verbosity};
use crate::core::SqlValue;
use crate::error::{MigrateError, Result};
use crate::executor::{settle, Capability, Executor, Session, LIVE_INSERT_BATCH_ROWS};

/// Connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default PostgreSQL port.
pub const POSTGRES_DEFAULT_PORT: u16 = 5432;

/// Default COPY flush buffer size (4 MB).
const COPY_FLUSH_BYTES: usize = 4 * 1024 * 1024;

/// An open binary COPY.
struct BulkCopy {
    table: String,
    columns: usize,
    rows: u64,
    buf: BytesMut,
    sink: Pin<Box<CopyInSink<Bytes>>>,
}

/// Executor backed by a live PostgreSQL connection.
pub struct PgExecutor {
    client: Option<Client>,
    connection: Option<JoinHandle<()>>,
    session: Session,
    bulk: Option<BulkCopy>,
    bulk_copy: bool,
}

impl PgExecutor {
    /// Connect to the destination database.
    ///
    /// `bulk_copy` controls whether the executor offers
    /// [`Capability::BulkTransfer`].
    pub async fn connect(config: &DbConfig, bulk_copy: bool, verbosity: Verbosity) -> Result<Self> {
        let mut pg = PgConfig::new();
        // A host starting with '/' is a socket directory.
        if config.socket.is_empty() {
            pg.host(&config.hostname);
        } else {
            pg.host(&config.socket);
        }
        pg.port(config.port_or(POSTGRES_DEFAULT_PORT));
        pg.user(&config.username);
        if !config.password.is_empty() {
            pg.password(&config.password);
        }
        if !config.database.is_empty() {
            pg.dbname(&config.database);
        }
        pg.application_name("mysql-pg-migrate");
        pg.keepalives(true);
        pg.keepalives_idle(Duration::from_secs(30));
        pg.connect_timeout(CONNECT_TIMEOUT);

        let (client, connection) = if config.sslmode {
            let tls = MakeRustlsConnect::new(build_tls_config()?);
            let (client, connection) = pg
                .connect(tls)
                .await
                .map_err(|e| MigrateError::pool(e, "connecting to PostgreSQL destination"))?;
            (client, tokio::spawn(drive(connection)))
        } else {
            if config.socket.is_empty() {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
            }
            let (client, connection) = pg
                .connect(NoTls)
                .await
                .map_err(|e| MigrateError::pool(e, "connecting to PostgreSQL destination"))?;
            (client, tokio::spawn(drive(connection)))
        };

        // Test connection
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::pool(e, "testing PostgreSQL destination connection"))?;

        if verbosity.progress() {
            info!(
                "Connected to PostgreSQL destination: {}",
                config.endpoint(POSTGRES_DEFAULT_PORT)
            );
        }

        Ok(Self {
            client: Some(client),
            connection: Some(connection),
            session: Session::new("postgres", verbosity),
            bulk: None,
            bulk_copy,
        })
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| MigrateError::Executor("PostgreSQL connection is closed".into()))
    }

    fn ensure_no_bulk(&self, what: &str) -> Result<()> {
        match &self.bulk {
            Some(bulk) => Err(MigrateError::Executor(format!(
                "cannot {} while COPY into {} is open",
                what, bulk.table
            ))),
            None => Ok(()),
        }
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        self.client()?
            .batch_execute(sql)
            .await
            .map_err(|e| MigrateError::destination(e, &statement_context(sql)))
    }
}

async fn drive<C>(connection: C)
where
    C: std::future::Future<Output = std::result::Result<(), tokio_postgres::Error>>,
{
    if let Err(e) = connection.await {
        warn!("PostgreSQL connection error: {}", e);
    }
}

/// TLS with certificate verification against the webpki roots.
fn build_tls_config() -> Result<ClientConfig> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| MigrateError::Config(format!("TLS setup failed: {}", e)))?
    .with_root_certificates(root_store)
    .with_no_client_auth();

    Ok(config)
}

/// First line of a statement, shortened for error context.
fn statement_context(sql: &str) -> String {
    let first = sql.trim_start().lines().next().unwrap_or_default();
    if first.chars().count() > 80 {
        let head: String = first.chars().take(77).collect();
        format!("{}...", head)
    } else {
        first.to_string()
    }
}

#[async_trait]
impl Executor for PgExecutor {
    fn has_capability(&self, capability: Capability) -> bool {
        match capability {
            Capability::BulkTransfer => self.bulk_copy,
        }
    }

    fn insert_batch_rows(&self) -> usize {
        LIVE_INSERT_BATCH_ROWS
    }

    async fn begin(&mut self, label: &str) -> Result<()> {
        self.ensure_no_bulk("begin a transaction")?;
        self.session.begin(label)?;
        if let Err(e) = self.execute("BEGIN").await {
            self.session.rollback();
            return Err(e);
        }
        Ok(())
    }

    async fn submit(&mut self, sql: &str) -> Result<()> {
        self.ensure_no_bulk("submit a statement")?;
        self.session.record(sql);
        self.execute(sql).await
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_no_bulk("commit")?;
        self.session.commit()?;
        self.execute("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.session.rollback().is_some() {
            self.execute("ROLLBACK").await?;
        }
        Ok(())
    }

    async fn bulk_init(&mut self, table: &str, columns: &[String]) -> Result<()> {
        self.ensure_no_bulk("start another COPY")?;

        let column_list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let sql = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT binary)",
            quote_table(table),
            column_list.join(", ")
        );
        self.session.record(&sql);

        let sink = self
            .client()?
            .copy_in::<_, Bytes>(&sql)
            .await
            .map_err(|e| MigrateError::destination(e, &statement_context(&sql)))?;

        let mut buf = BytesMut::with_capacity(COPY_FLUSH_BYTES);
        copy::put_header(&mut buf);

        self.bulk = Some(BulkCopy {
            table: table.to_string(),
            columns: columns.len(),
            rows: 0,
            buf,
            sink: Box::pin(sink),
        });
        Ok(())
    }

    async fn bulk_add_record(&mut self, values: &[SqlValue<'_>]) -> Result<()> {
        let bulk = self
            .bulk
            .as_mut()
            .ok_or_else(|| MigrateError::Executor("bulk_add_record without bulk_init".into()))?;

        if values.len() != bulk.columns {
            return Err(MigrateError::transfer(
                &bulk.table,
                format!(
                    "row has {} values, COPY expects {}",
                    values.len(),
                    bulk.columns
                ),
            ));
        }

        copy::put_row(&mut bulk.buf, values)
            .map_err(|reason| MigrateError::transfer(&bulk.table, reason))?;
        bulk.rows += 1;

        if bulk.buf.len() >= COPY_FLUSH_BYTES {
            let chunk = bulk.buf.split().freeze();
            bulk.sink
                .send(chunk)
                .await
                .map_err(|e| MigrateError::destination(e, &format!("COPY {}", bulk.table)))?;
        }
        Ok(())
    }

    async fn bulk_finish(&mut self) -> Result<()> {
        let mut bulk = self
            .bulk
            .take()
            .ok_or_else(|| MigrateError::Executor("bulk_finish without bulk_init".into()))?;
        let context = format!("COPY {}", bulk.table);

        copy::put_trailer(&mut bulk.buf);
        let chunk = bulk.buf.split().freeze();
        let flushed = bulk
            .sink
            .send(chunk)
            .await
            .map_err(|e| MigrateError::destination(e, &context));

        let closed = match bulk.sink.as_mut().finish().await {
            Ok(loaded) => {
                debug!("{}: {} rows sent, {} loaded", context, bulk.rows, loaded);
                Ok(())
            }
            Err(e) => Err(MigrateError::destination(e, &context)),
        };

        settle(flushed, closed, &context)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(bulk) = self.bulk.take() {
            warn!("Closing with COPY into {} still open; it is abandoned", bulk.table);
        }
        if self.session.in_transaction() {
            warn!("Closing with an open transaction; it is rolled back");
            if let Err(e) = self.rollback().await {
                warn!("Rollback on close failed: {}", e);
            }
        }
        // Dropping the client ends the connection task.
        if self.client.take().is_some() {
            if let Some(handle) = self.connection.take() {
                let _ = handle.await;
            }
            debug!(
                "PostgreSQL connection closed after {} statements",
                self.session.statements()
            );
        }
        Ok(())
    }
}
