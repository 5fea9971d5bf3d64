//! Graph catalog access.
//!
//! `AgensGraph` keeps graph metadata in four catalogs:
//!
//! | Catalog | Maps |
//! |---------|------|
//! | `pg_namespace` | schema name to namespace oid |
//! | `ag_graph` | graph name to namespace oid (the graph registry) |
//! | `ag_label` | label name (per graph id) to label id, kind, and relation |
//! | `pg_class` | relation name (per namespace) to `relfilenode` |
//!
//! [`CatalogBackend`] is the seam every clone step talks through. Two
//! implementations exist: [`PostgresCatalog`] for a live server and
//! [`InMemoryCatalog`] for tests.

mod memory;
mod postgres;
mod sql;
mod tls;

pub use memory::{CatalogOperation, InMemoryCatalog};
pub use postgres::PostgresCatalog;
pub use sql::quote_ident;

use crate::{Error, Result};
use std::fmt;

/// Internal numeric id of a namespace or relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid(pub u32);

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Graph id used to scope `ag_label` rows.
///
/// By `AgensGraph` convention the graph id is the backing namespace oid
/// plus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(pub u32);

impl GraphId {
    /// Derives the graph id of the graph backed by `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the oid is `u32::MAX`.
    pub fn for_namespace(namespace: Oid) -> Result<Self> {
        namespace
            .0
            .checked_add(1)
            .map(Self)
            .ok_or_else(|| Error::InvalidInput(format!("namespace oid {namespace} has no graph id")))
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKind {
    /// Vertex label (`'v'`).
    Vertex,
    /// Edge label (`'e'`).
    Edge,
}

impl LabelKind {
    /// Returns the single-byte `"char"` code stored in `ag_label.labkind`.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn code(self) -> i8 {
        match self {
            Self::Vertex => b'v' as i8,
            Self::Edge => b'e' as i8,
        }
    }

    /// Parses an `ag_label.labkind` code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CatalogQuery`] for any code other than `v` or `e`.
    #[allow(clippy::cast_sign_loss)]
    pub fn from_code(code: i8) -> Result<Self> {
        match code as u8 {
            b'v' => Ok(Self::Vertex),
            b'e' => Ok(Self::Edge),
            other => Err(Error::CatalogQuery {
                operation: "parse_label_kind".to_string(),
                cause: format!("unknown label kind {:?}", char::from(other)),
            }),
        }
    }

    /// Returns the string form of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vertex => "v",
            Self::Edge => "e",
        }
    }
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A label of the template graph as read from `ag_label`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEntry {
    /// Label name.
    pub name: String,
    /// Label id, carried over unchanged into the clone.
    pub id: i32,
    /// Vertex or edge.
    pub kind: LabelKind,
}

/// A relation as read from `pg_class`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationEntry {
    /// Relation name.
    pub name: String,
    /// Storage id assigned to the relation.
    pub relfilenode: Oid,
}

/// A full `ag_label` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRow {
    /// Label name.
    pub name: String,
    /// Owning graph.
    pub graph_id: GraphId,
    /// Label id.
    pub id: i32,
    /// Backing relation.
    pub relation: Oid,
    /// Vertex or edge.
    pub kind: LabelKind,
}

/// Access to the graph catalogs.
///
/// Each method is a single statement. No method opens a transaction, so a
/// sequence of calls is not atomic.
pub trait CatalogBackend: Send + Sync {
    /// Returns the oid of the namespace called `name`, if any.
    fn namespace_oid(&self, name: &str) -> Result<Option<Oid>>;

    /// Removes the graph registry row for `name`. Returns rows removed.
    fn unregister_graph(&self, name: &str) -> Result<u64>;

    /// Adds a graph registry row mapping `name` to `namespace`.
    fn register_graph(&self, name: &str, namespace: Oid) -> Result<()>;

    /// Renames a namespace.
    fn rename_schema(&self, from: &str, to: &str) -> Result<()>;

    /// Creates an empty namespace.
    fn create_schema(&self, name: &str) -> Result<()>;

    /// Drops a namespace and everything in it.
    fn drop_schema(&self, name: &str) -> Result<()>;

    /// Lists the labels of a graph.
    fn labels_for_graph(&self, graph: GraphId) -> Result<Vec<LabelEntry>>;

    /// Lists the relations of a namespace.
    fn relations_in_namespace(&self, namespace: Oid) -> Result<Vec<RelationEntry>>;

    /// Inserts one `ag_label` row.
    fn insert_label(&self, row: &LabelRow) -> Result<()>;

    /// Removes every `ag_label` row of a graph. Returns rows removed.
    fn delete_labels(&self, graph: GraphId) -> Result<u64>;

    /// Returns true if a namespace called `name` exists.
    fn namespace_exists(&self, name: &str) -> Result<bool> {
        Ok(self.namespace_oid(name)?.is_some())
    }
}
