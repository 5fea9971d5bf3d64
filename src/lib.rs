//! # ag-clone-graph
//!
//! Clones an `AgensGraph` graph into a new, independent graph.
//!
//! A graph is backed by a PostgreSQL schema. Cloning duplicates the schema
//! through `pg_dump`/`psql` and then registers catalog metadata (`ag_graph`,
//! `ag_label`) so the copy is recognized as its own graph instead of an alias
//! of the template.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ag_clone_graph::{CloneConfig, GraphCloner, PgTools, PostgresCatalog};
//!
//! let config = CloneConfig::default();
//! let catalog = PostgresCatalog::connect(&config.database)?;
//! let tools = PgTools::new(&config.database, &config.tools);
//! let mut cloner = GraphCloner::new(catalog, tools);
//! let report = cloner.clone_graph(&config.request())?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod catalog;
pub mod config;
pub mod observability;
pub mod services;
pub mod tools;

// Re-exports for convenience
pub use catalog::{
    CatalogBackend, GraphId, InMemoryCatalog, LabelEntry, LabelKind, LabelRow, Oid,
    PostgresCatalog, RelationEntry,
};
pub use config::{CloneConfig, DatabaseConfig, ToolsConfig};
pub use services::{
    CatalogRewrite, CatalogRewriter, CloneReport, CloneRequest, CloneStage, GraphCloner,
    SchemaCopier, UndoLog,
};
pub use tools::{DumpRestore, PgTools};

/// Error type for graph clone operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Connection` | The database connection (or its TLS setup) cannot be established |
/// | `AlreadyExists` | The clone target namespace already exists |
/// | `NotFound` | The template namespace does not exist |
/// | `ExternalTool` | `pg_dump` or `psql` cannot start or exits non-zero |
/// | `CatalogQuery` | A catalog read fails or returns malformed rows |
/// | `CatalogWrite` | A catalog insert, delete, or DDL statement fails |
/// | `InvalidInput` | Configuration or graph names fail validation |
/// | `OperationFailed` | Filesystem, config file, or runtime errors |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The database connection could not be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The clone target already exists as a namespace.
    #[error("schema (or graph) '{0}' already exists")]
    AlreadyExists(String),

    /// The template namespace does not exist.
    #[error("schema (or graph) '{0}' does not exist")]
    NotFound(String),

    /// An external dump/restore utility failed.
    #[error("external tool '{tool}' failed: {cause}")]
    ExternalTool {
        /// The utility that failed (`pg_dump`, `psql`).
        tool: String,
        /// The underlying cause.
        cause: String,
    },

    /// A catalog query failed.
    #[error("catalog query '{operation}' failed: {cause}")]
    CatalogQuery {
        /// The query that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A catalog mutation failed.
    #[error("catalog write '{operation}' failed: {cause}")]
    CatalogWrite {
        /// The statement that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for graph clone operations.
pub type Result<T> = std::result::Result<T, Error>;
