//! In-memory catalog backend for testing.
//!
//! Models namespaces, the graph registry, labels, and relations closely
//! enough to run a whole clone without a server. Handles are cheap to clone
//! and share one state, so a test can keep a handle for inspection while
//! another is owned by the code under test.

use super::{CatalogBackend, GraphId, LabelEntry, LabelKind, LabelRow, Oid, RelationEntry};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// First oid handed out when none is configured (`FirstNormalObjectId`).
const FIRST_NORMAL_OID: u32 = 16_384;

/// Catalog operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogOperation {
    /// [`CatalogBackend::namespace_oid`].
    NamespaceOid,
    /// [`CatalogBackend::unregister_graph`].
    UnregisterGraph,
    /// [`CatalogBackend::register_graph`].
    RegisterGraph,
    /// [`CatalogBackend::rename_schema`].
    RenameSchema,
    /// [`CatalogBackend::create_schema`].
    CreateSchema,
    /// [`CatalogBackend::drop_schema`].
    DropSchema,
    /// [`CatalogBackend::labels_for_graph`].
    LabelsForGraph,
    /// [`CatalogBackend::relations_in_namespace`].
    RelationsInNamespace,
    /// [`CatalogBackend::insert_label`].
    InsertLabel,
    /// [`CatalogBackend::delete_labels`].
    DeleteLabels,
}

#[derive(Debug, Default)]
struct CatalogState {
    next_oid: u32,
    namespaces: BTreeMap<String, Oid>,
    graphs: BTreeMap<String, Oid>,
    labels: Vec<LabelRow>,
    relations: Vec<(Oid, RelationEntry)>,
    failures: HashSet<CatalogOperation>,
    /// Operation plus the number of prior calls after which it fails once.
    delayed_failures: HashSet<(CatalogOperation, usize)>,
    calls: Vec<CatalogOperation>,
}

impl CatalogState {
    fn allocate_oid(&mut self) -> Oid {
        let oid = Oid(self.next_oid);
        self.next_oid += 1;
        oid
    }

    /// Records a call and reports whether it must fail.
    fn check(&mut self, op: CatalogOperation) -> Result<()> {
        let prior = self.calls.iter().filter(|c| **c == op).count();
        self.calls.push(op);

        let delayed = self.delayed_failures.contains(&(op, prior));
        if self.failures.contains(&op) || delayed {
            let cause = format!("injected failure in {op:?}");
            return Err(match op {
                CatalogOperation::NamespaceOid
                | CatalogOperation::LabelsForGraph
                | CatalogOperation::RelationsInNamespace => Error::CatalogQuery {
                    operation: format!("{op:?}"),
                    cause,
                },
                _ => Error::CatalogWrite {
                    operation: format!("{op:?}"),
                    cause,
                },
            });
        }
        Ok(())
    }
}

/// In-memory catalog backend for testing.
#[derive(Debug, Clone)]
pub struct InMemoryCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::with_next_oid(FIRST_NORMAL_OID)
    }

    /// Creates an empty catalog whose next allocated oid is `next_oid`.
    #[must_use]
    pub fn with_next_oid(next_oid: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(CatalogState {
                next_oid,
                ..CatalogState::default()
            })),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, CatalogState>> {
        self.state.lock().map_err(|e| Error::OperationFailed {
            operation: "in_memory_catalog_lock".to_string(),
            cause: e.to_string(),
        })
    }

    /// Sets the next oid handed out.
    pub fn set_next_oid(&self, next_oid: u32) -> Result<()> {
        self.lock()?.next_oid = next_oid;
        Ok(())
    }

    /// Makes every call of `op` fail.
    pub fn fail_on(&self, op: CatalogOperation) -> Result<()> {
        self.lock()?.failures.insert(op);
        Ok(())
    }

    /// Makes the call of `op` following `successes` successful calls fail.
    pub fn fail_after(&self, op: CatalogOperation, successes: usize) -> Result<()> {
        self.lock()?.delayed_failures.insert((op, successes));
        Ok(())
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.failures.clear();
        state.delayed_failures.clear();
        Ok(())
    }

    /// Returns every operation called so far, in order.
    pub fn calls(&self) -> Result<Vec<CatalogOperation>> {
        Ok(self.lock()?.calls.clone())
    }

    /// Adds a namespace and returns its oid.
    pub fn add_namespace(&self, name: &str) -> Result<Oid> {
        let mut state = self.lock()?;
        if state.namespaces.contains_key(name) {
            return Err(Error::InvalidInput(format!("schema \"{name}\" already exists")));
        }
        let oid = state.allocate_oid();
        state.namespaces.insert(name.to_string(), oid);
        Ok(oid)
    }

    /// Adds a namespace plus its graph registry row. Returns the namespace oid.
    pub fn add_graph(&self, name: &str) -> Result<Oid> {
        let oid = self.add_namespace(name)?;
        self.lock()?.graphs.insert(name.to_string(), oid);
        Ok(oid)
    }

    /// Adds a relation to a namespace and returns its `relfilenode`.
    pub fn add_relation(&self, namespace: Oid, name: &str) -> Result<Oid> {
        let mut state = self.lock()?;
        let relfilenode = state.allocate_oid();
        state.relations.push((
            namespace,
            RelationEntry {
                name: name.to_string(),
                relfilenode,
            },
        ));
        Ok(relfilenode)
    }

    /// Adds a label backed by a new relation of the same name in `namespace`.
    pub fn add_label(&self, namespace: Oid, name: &str, id: i32, kind: LabelKind) -> Result<Oid> {
        let relation = self.add_relation(namespace, name)?;
        let graph_id = GraphId::for_namespace(namespace)?;
        self.lock()?.labels.push(LabelRow {
            name: name.to_string(),
            graph_id,
            id,
            relation,
            kind,
        });
        Ok(relation)
    }

    /// Returns the namespace registered for graph `name`.
    pub fn registered_namespace(&self, name: &str) -> Result<Option<Oid>> {
        Ok(self.lock()?.graphs.get(name).copied())
    }

    /// Returns the number of graph registry rows pointing at `namespace`.
    pub fn registrations_of(&self, namespace: Oid) -> Result<usize> {
        Ok(self
            .lock()?
            .graphs
            .values()
            .filter(|oid| **oid == namespace)
            .count())
    }

    /// Returns every namespace name.
    pub fn namespace_names(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.namespaces.keys().cloned().collect())
    }

    /// Returns every `ag_label` row of a graph, ordered by name.
    pub fn label_rows(&self, graph: GraphId) -> Result<Vec<LabelRow>> {
        let mut rows: Vec<LabelRow> = self
            .lock()?
            .labels
            .iter()
            .filter(|l| l.graph_id == graph)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }
}

impl CatalogBackend for InMemoryCatalog {
    fn namespace_oid(&self, name: &str) -> Result<Option<Oid>> {
        let mut state = self.lock()?;
        state.check(CatalogOperation::NamespaceOid)?;
        Ok(state.namespaces.get(name).copied())
    }

    fn unregister_graph(&self, name: &str) -> Result<u64> {
        let mut state = self.lock()?;
        state.check(CatalogOperation::UnregisterGraph)?;
        Ok(u64::from(state.graphs.remove(name).is_some()))
    }

    fn register_graph(&self, name: &str, namespace: Oid) -> Result<()> {
        let mut state = self.lock()?;
        state.check(CatalogOperation::RegisterGraph)?;
        if state.graphs.contains_key(name) {
            return Err(Error::CatalogWrite {
                operation: "register_graph".to_string(),
                cause: format!("graph \"{name}\" already registered"),
            });
        }
        if state.graphs.values().any(|oid| *oid == namespace) {
            return Err(Error::CatalogWrite {
                operation: "register_graph".to_string(),
                cause: format!("namespace {namespace} already registered"),
            });
        }
        state.graphs.insert(name.to_string(), namespace);
        Ok(())
    }

    fn rename_schema(&self, from: &str, to: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.check(CatalogOperation::RenameSchema)?;
        if state.namespaces.contains_key(to) {
            return Err(Error::CatalogWrite {
                operation: "rename_schema".to_string(),
                cause: format!("schema \"{to}\" already exists"),
            });
        }
        let oid = state
            .namespaces
            .remove(from)
            .ok_or_else(|| Error::CatalogWrite {
                operation: "rename_schema".to_string(),
                cause: format!("schema \"{from}\" does not exist"),
            })?;
        state.namespaces.insert(to.to_string(), oid);
        Ok(())
    }

    fn create_schema(&self, name: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.check(CatalogOperation::CreateSchema)?;
        if state.namespaces.contains_key(name) {
            return Err(Error::CatalogWrite {
                operation: "create_schema".to_string(),
                cause: format!("schema \"{name}\" already exists"),
            });
        }
        let oid = state.allocate_oid();
        state.namespaces.insert(name.to_string(), oid);
        Ok(())
    }

    fn drop_schema(&self, name: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.check(CatalogOperation::DropSchema)?;
        if let Some(oid) = state.namespaces.remove(name) {
            state.relations.retain(|(ns, _)| *ns != oid);
        }
        Ok(())
    }

    fn labels_for_graph(&self, graph: GraphId) -> Result<Vec<LabelEntry>> {
        let mut state = self.lock()?;
        state.check(CatalogOperation::LabelsForGraph)?;
        Ok(state
            .labels
            .iter()
            .filter(|l| l.graph_id == graph)
            .map(|l| LabelEntry {
                name: l.name.clone(),
                id: l.id,
                kind: l.kind,
            })
            .collect())
    }

    fn relations_in_namespace(&self, namespace: Oid) -> Result<Vec<RelationEntry>> {
        let mut state = self.lock()?;
        state.check(CatalogOperation::RelationsInNamespace)?;
        Ok(state
            .relations
            .iter()
            .filter(|(ns, _)| *ns == namespace)
            .map(|(_, rel)| rel.clone())
            .collect())
    }

    fn insert_label(&self, row: &LabelRow) -> Result<()> {
        let mut state = self.lock()?;
        state.check(CatalogOperation::InsertLabel)?;
        if state
            .labels
            .iter()
            .any(|l| l.graph_id == row.graph_id && l.name == row.name)
        {
            return Err(Error::CatalogWrite {
                operation: "insert_label".to_string(),
                cause: format!("label \"{}\" already exists in graph {}", row.name, row.graph_id),
            });
        }
        state.labels.push(row.clone());
        Ok(())
    }

    fn delete_labels(&self, graph: GraphId) -> Result<u64> {
        let mut state = self.lock()?;
        state.check(CatalogOperation::DeleteLabels)?;
        let before = state.labels.len();
        state.labels.retain(|l| l.graph_id != graph);
        Ok(u64::try_from(before - state.labels.len()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_graph_registers_namespace() {
        let catalog = InMemoryCatalog::with_next_oid(100);
        let oid = catalog.add_graph("gtemplate").unwrap();

        assert_eq!(oid, Oid(100));
        assert_eq!(catalog.namespace_oid("gtemplate").unwrap(), Some(oid));
        assert_eq!(catalog.registered_namespace("gtemplate").unwrap(), Some(oid));
    }

    #[test]
    fn test_rename_keeps_oid() {
        let catalog = InMemoryCatalog::new();
        let oid = catalog.add_namespace("a").unwrap();

        catalog.rename_schema("a", "b").unwrap();

        assert_eq!(catalog.namespace_oid("a").unwrap(), None);
        assert_eq!(catalog.namespace_oid("b").unwrap(), Some(oid));
        assert!(catalog.rename_schema("a", "c").is_err());
    }

    #[test]
    fn test_register_rejects_second_row_for_namespace() {
        let catalog = InMemoryCatalog::new();
        let oid = catalog.add_graph("g").unwrap();

        let result = catalog.register_graph("alias", oid);
        assert!(matches!(result, Err(Error::CatalogWrite { .. })));
        assert_eq!(catalog.registrations_of(oid).unwrap(), 1);
    }

    #[test]
    fn test_drop_schema_removes_relations() {
        let catalog = InMemoryCatalog::new();
        let oid = catalog.add_namespace("g").unwrap();
        catalog.add_relation(oid, "person").unwrap();

        catalog.drop_schema("g").unwrap();

        assert!(!catalog.namespace_exists("g").unwrap());
        assert!(catalog.relations_in_namespace(oid).unwrap().is_empty());
    }

    #[test]
    fn test_labels_scoped_by_graph_id() {
        let catalog = InMemoryCatalog::with_next_oid(100);
        let a = catalog.add_graph("a").unwrap();
        let b = catalog.add_graph("b").unwrap();
        catalog.add_label(a, "person", 1, LabelKind::Vertex).unwrap();
        catalog.add_label(b, "city", 1, LabelKind::Vertex).unwrap();

        let labels = catalog
            .labels_for_graph(GraphId::for_namespace(a).unwrap())
            .unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].name, "person");
    }

    #[test]
    fn test_injected_failure() {
        let catalog = InMemoryCatalog::new();
        catalog.fail_on(CatalogOperation::CreateSchema).unwrap();

        assert!(matches!(
            catalog.create_schema("x"),
            Err(Error::CatalogWrite { .. })
        ));

        catalog.clear_failures().unwrap();
        assert!(catalog.create_schema("x").is_ok());
    }

    #[test]
    fn test_delayed_failure() {
        let catalog = InMemoryCatalog::new();
        catalog.fail_after(CatalogOperation::RenameSchema, 1).unwrap();
        catalog.add_namespace("a").unwrap();

        assert!(catalog.rename_schema("a", "b").is_ok());
        assert!(catalog.rename_schema("b", "a").is_err());
        assert!(catalog.rename_schema("b", "a").is_ok());
        assert_eq!(
            catalog.calls().unwrap(),
            vec![CatalogOperation::RenameSchema; 3]
        );
    }
}
