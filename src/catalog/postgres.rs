//! PostgreSQL-based catalog backend.
//!
//! Holds a single connection for the whole run. The async client is driven
//! by a private current-thread runtime so callers stay synchronous.

use super::sql::quote_ident;
use super::tls::make_connector;
use super::{CatalogBackend, GraphId, LabelEntry, LabelKind, LabelRow, Oid, RelationEntry};
use crate::config::DatabaseConfig;
use crate::{Error, Result};
use secrecy::ExposeSecret;
use std::error::Error as _;
use tokio::runtime::Runtime;
use tokio_postgres::config::SslMode;
use tokio_postgres::{Client, Row};

/// Catalog backend over a live `AgensGraph` connection.
pub struct PostgresCatalog {
    /// Runtime that polls the connection task and every query.
    runtime: Runtime,
    /// The one client shared by every step.
    client: Client,
}

/// Renders a client error with the server's message and SQLSTATE, or the
/// chain of underlying causes when the server sent nothing.
fn describe_error(e: &tokio_postgres::Error) -> String {
    if let Some(db) = e.as_db_error() {
        let mut message = format!(
            "{}: {} (SQLSTATE {})",
            db.severity(),
            db.message(),
            db.code().code()
        );
        if let Some(detail) = db.detail() {
            message.push_str(": ");
            message.push_str(detail);
        }
        return message;
    }

    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}

/// Helper to map query errors.
#[allow(clippy::needless_pass_by_value)]
fn query_error(op: &str, e: tokio_postgres::Error) -> Error {
    Error::CatalogQuery {
        operation: op.to_string(),
        cause: describe_error(&e),
    }
}

/// Helper to map statement errors.
#[allow(clippy::needless_pass_by_value)]
fn write_error(op: &str, e: tokio_postgres::Error) -> Error {
    Error::CatalogWrite {
        operation: op.to_string(),
        cause: describe_error(&e),
    }
}

impl PostgresCatalog {
    /// Opens the connection. TLS is required; there is no retry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the runtime, TLS setup, or
    /// connection fails.
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::OperationFailed {
                operation: "postgres_catalog_create_runtime".to_string(),
                cause: e.to_string(),
            })?;

        let tls = make_connector(config.ssl_root_cert.as_deref())?;
        let pg_config = Self::build_config(config);

        tracing::info!(
            user = %config.user,
            host = %config.host,
            port = config.port,
            dbname = %config.dbname,
            "Connecting to database"
        );

        let (client, connection) = runtime
            .block_on(pg_config.connect(tls))
            .map_err(|e| Error::Connection(describe_error(&e)))?;

        runtime.spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        tracing::debug!("Connection opened");
        Ok(Self { runtime, client })
    }

    /// Builds a tokio-postgres config from connection settings.
    fn build_config(config: &DatabaseConfig) -> tokio_postgres::Config {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .user(config.user.as_str())
            .dbname(config.dbname.as_str())
            .host(config.host.as_str())
            .port(config.port)
            .ssl_mode(SslMode::Require)
            .application_name("ag-clone-graph");
        if config.has_password() {
            pg_config.password(config.password.expose_secret());
        }
        pg_config
    }

    /// Runs one statement (no parameters) that returns no rows.
    fn execute_ddl(&self, op: &str, sql: &str) -> Result<()> {
        self.runtime
            .block_on(self.client.batch_execute(sql))
            .map_err(|e| write_error(op, e))
    }

    /// Converts an `ag_label` row.
    fn row_to_label(row: &Row) -> Result<LabelEntry> {
        let name: String = row
            .try_get("labname")
            .map_err(|e| query_error("read_labels", e))?;
        let id: i32 = row
            .try_get("labid")
            .map_err(|e| query_error("read_labels", e))?;
        let kind: i8 = row
            .try_get("labkind")
            .map_err(|e| query_error("read_labels", e))?;

        Ok(LabelEntry {
            name,
            id,
            kind: LabelKind::from_code(kind)?,
        })
    }

    /// Converts a `pg_class` row.
    fn row_to_relation(row: &Row) -> Result<RelationEntry> {
        let name: String = row
            .try_get("relname")
            .map_err(|e| query_error("read_relations", e))?;
        let relfilenode: u32 = row
            .try_get("relfilenode")
            .map_err(|e| query_error("read_relations", e))?;

        Ok(RelationEntry {
            name,
            relfilenode: Oid(relfilenode),
        })
    }
}

impl CatalogBackend for PostgresCatalog {
    fn namespace_oid(&self, name: &str) -> Result<Option<Oid>> {
        let row = self
            .runtime
            .block_on(self.client.query_opt(
                "SELECT oid FROM pg_catalog.pg_namespace WHERE nspname = $1",
                &[&name],
            ))
            .map_err(|e| query_error("read_namespace_oid", e))?;

        row.map(|r| {
            r.try_get::<_, u32>("oid")
                .map(Oid)
                .map_err(|e| query_error("read_namespace_oid", e))
        })
        .transpose()
    }

    fn unregister_graph(&self, name: &str) -> Result<u64> {
        self.runtime
            .block_on(self.client.execute(
                "DELETE FROM pg_catalog.ag_graph WHERE graphname = $1",
                &[&name],
            ))
            .map_err(|e| write_error("unregister_graph", e))
    }

    fn register_graph(&self, name: &str, namespace: Oid) -> Result<()> {
        self.runtime
            .block_on(self.client.execute(
                "INSERT INTO pg_catalog.ag_graph (graphname, nspid) VALUES ($1, $2)",
                &[&name, &namespace.0],
            ))
            .map_err(|e| write_error("register_graph", e))?;
        Ok(())
    }

    fn rename_schema(&self, from: &str, to: &str) -> Result<()> {
        let sql = format!(
            "ALTER SCHEMA {} RENAME TO {}",
            quote_ident(from),
            quote_ident(to)
        );
        self.execute_ddl("rename_schema", &sql)
    }

    fn create_schema(&self, name: &str) -> Result<()> {
        let sql = format!("CREATE SCHEMA {}", quote_ident(name));
        self.execute_ddl("create_schema", &sql)
    }

    fn drop_schema(&self, name: &str) -> Result<()> {
        let sql = format!("DROP SCHEMA IF EXISTS {} CASCADE", quote_ident(name));
        self.execute_ddl("drop_schema", &sql)
    }

    fn labels_for_graph(&self, graph: GraphId) -> Result<Vec<LabelEntry>> {
        let rows = self
            .runtime
            .block_on(self.client.query(
                "SELECT labname, labid, labkind FROM pg_catalog.ag_label WHERE graphid = $1",
                &[&graph.0],
            ))
            .map_err(|e| query_error("read_labels", e))?;

        rows.iter().map(Self::row_to_label).collect()
    }

    fn relations_in_namespace(&self, namespace: Oid) -> Result<Vec<RelationEntry>> {
        let rows = self
            .runtime
            .block_on(self.client.query(
                "SELECT relname, relfilenode FROM pg_catalog.pg_class WHERE relnamespace = $1",
                &[&namespace.0],
            ))
            .map_err(|e| query_error("read_relations", e))?;

        rows.iter().map(Self::row_to_relation).collect()
    }

    fn insert_label(&self, row: &LabelRow) -> Result<()> {
        self.runtime
            .block_on(self.client.execute(
                r"INSERT INTO pg_catalog.ag_label (labname, graphid, labid, relid, labkind)
                VALUES ($1, $2, $3, $4, $5)",
                &[
                    &row.name.as_str(),
                    &row.graph_id.0,
                    &row.id,
                    &row.relation.0,
                    &row.kind.code(),
                ],
            ))
            .map_err(|e| write_error("insert_label", e))?;
        Ok(())
    }

    fn delete_labels(&self, graph: GraphId) -> Result<u64> {
        self.runtime
            .block_on(self.client.execute(
                "DELETE FROM pg_catalog.ag_label WHERE graphid = $1",
                &[&graph.0],
            ))
            .map_err(|e| write_error("delete_labels", e))
    }
}
