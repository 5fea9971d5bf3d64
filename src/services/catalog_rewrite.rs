//! Graph catalog reconciliation for a restored schema.
//!
//! A dump/restore copies tables but not graph metadata: label rows are tied
//! to the template's graph id, and restore assigns new relation ids. This
//! step reads the template's labels, matches them by name against the
//! relations of the new schema, and writes label and registry rows for the
//! new graph.

use super::compensation::{CompensatingAction, UndoLog};
use crate::catalog::{CatalogBackend, GraphId, LabelRow, Oid};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use tracing::instrument;

/// Outcome of a catalog rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRewrite {
    /// Namespace of the new graph.
    pub namespace: Oid,
    /// Graph id of the new graph.
    pub graph_id: GraphId,
    /// Label rows inserted, ordered by name.
    pub labels: Vec<LabelRow>,
    /// Template labels with no same-named relation in the new schema.
    pub skipped: Vec<String>,
}

/// Writes label and registry rows for a restored schema.
pub struct CatalogRewriter<'a, C: ?Sized> {
    catalog: &'a C,
}

impl<'a, C: CatalogBackend + ?Sized> CatalogRewriter<'a, C> {
    /// Creates a rewriter over a catalog.
    #[must_use]
    pub const fn new(catalog: &'a C) -> Self {
        Self { catalog }
    }

    /// Resolves the namespace oid of `name`, which must exist.
    fn require_namespace(&self, name: &str) -> Result<Oid> {
        self.catalog
            .namespace_oid(name)?
            .ok_or_else(|| Error::CatalogQuery {
                operation: "read_namespace_oid".to_string(),
                cause: format!("schema '{name}' not found"),
            })
    }

    /// Plans the label rows of the new graph.
    ///
    /// Returns the rows to insert (ordered by label name) and the names of
    /// template labels that have no relation of the same name in `target`.
    ///
    /// # Errors
    ///
    /// Returns the error of the failing catalog query.
    pub fn plan(&self, template: Oid, target: Oid) -> Result<(Vec<LabelRow>, Vec<String>)> {
        let graph_id = GraphId::for_namespace(target)?;
        let template_graph = GraphId::for_namespace(template)?;

        tracing::debug!(graph_id = %template_graph, "Reading template labels");
        let labels: BTreeMap<String, _> = self
            .catalog
            .labels_for_graph(template_graph)?
            .into_iter()
            .map(|label| (label.name.clone(), label))
            .collect();

        tracing::debug!(namespace = %target, "Reading relations of the new schema");
        let relations: HashMap<String, Oid> = self
            .catalog
            .relations_in_namespace(target)?
            .into_iter()
            .map(|rel| (rel.name, rel.relfilenode))
            .collect();

        let mut rows = Vec::with_capacity(labels.len());
        let mut skipped = Vec::new();
        for (name, label) in labels {
            match relations.get(&name) {
                Some(relation) => rows.push(LabelRow {
                    name,
                    graph_id,
                    id: label.id,
                    relation: *relation,
                    kind: label.kind,
                }),
                None => skipped.push(name),
            }
        }

        Ok((rows, skipped))
    }

    /// Inserts the new graph's label rows and registers it.
    ///
    /// # Errors
    ///
    /// Returns the error of the failing query or insert. Rows written
    /// before the failure stay; their inverses remain in `undo`.
    #[instrument(skip_all, fields(template = %template, target = %target))]
    pub fn rewrite(
        &self,
        template: &str,
        target: &str,
        undo: &mut UndoLog,
    ) -> Result<CatalogRewrite> {
        tracing::debug!("Reading namespace oids");
        let namespace = self.require_namespace(target)?;
        let template_namespace = self.require_namespace(template)?;
        let graph_id = GraphId::for_namespace(namespace)?;

        let (labels, skipped) = self.plan(template_namespace, namespace)?;
        for name in &skipped {
            tracing::warn!(label = %name, "No relation for label in new schema, skipping");
        }

        tracing::debug!(count = labels.len(), "Inserting labels into ag_label");
        if !labels.is_empty() {
            undo.push(CompensatingAction::DeleteLabels { graph: graph_id });
        }
        for row in &labels {
            self.catalog.insert_label(row)?;
        }

        tracing::debug!("Registering new graph in ag_graph");
        self.catalog.register_graph(target, namespace)?;
        undo.push(CompensatingAction::UnregisterGraph {
            name: target.to_string(),
        });

        Ok(CatalogRewrite {
            namespace,
            graph_id,
            labels,
            skipped,
        })
    }
}
