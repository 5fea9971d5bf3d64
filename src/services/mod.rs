//! Clone services.
//!
//! The driver ([`GraphCloner`]) runs two halves: [`SchemaCopier`] duplicates
//! the template schema, and [`CatalogRewriter`] writes the graph metadata for
//! the copy. Both record compensating actions in an [`UndoLog`].

mod catalog_rewrite;
mod clone;
mod compensation;
mod schema_copy;

pub use catalog_rewrite::{CatalogRewrite, CatalogRewriter};
pub use clone::{CloneReport, CloneRequest, CloneStage, GraphCloner};
pub use compensation::{CompensatingAction, RollbackOutcome, UndoLog};
pub use schema_copy::SchemaCopier;
