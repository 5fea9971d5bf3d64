//! End-to-end clone scenarios against the in-memory catalog and tools.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use ag_clone_graph::catalog::{CatalogOperation, RelationEntry};
use ag_clone_graph::tools::InMemoryTools;
use ag_clone_graph::{
    CatalogBackend, CloneRequest, CloneStage, Error, GraphCloner, GraphId, InMemoryCatalog,
    LabelKind, Oid,
};
use std::path::PathBuf;
use tempfile::TempDir;

struct Scenario {
    catalog: InMemoryCatalog,
    tools: InMemoryTools,
    dir: TempDir,
}

impl Scenario {
    /// `gtemplate` at namespace 100 (graph 101) with `person` and `knows`.
    /// Oids allocated during the clone start at 200.
    fn social_graph() -> Self {
        let catalog = InMemoryCatalog::with_next_oid(100);
        let template = catalog.add_graph("gtemplate").unwrap();
        catalog
            .add_label(template, "person", 1, LabelKind::Vertex)
            .unwrap();
        catalog.add_label(template, "knows", 2, LabelKind::Edge).unwrap();
        catalog.set_next_oid(200).unwrap();

        let tools = InMemoryTools::new(catalog.clone());
        Self {
            catalog,
            tools,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn dump_file(&self) -> PathBuf {
        self.dir.path().join("new_schema.sql")
    }

    fn request(&self, rollback: bool) -> CloneRequest {
        CloneRequest {
            template: "gtemplate".to_string(),
            target: "new_graph".to_string(),
            dump_file: self.dump_file(),
            rollback,
        }
    }

    fn cloner(&self) -> GraphCloner<InMemoryCatalog, InMemoryTools> {
        GraphCloner::new(self.catalog.clone(), self.tools.clone())
    }

    fn relation(&self, namespace: Oid, name: &str) -> Option<RelationEntry> {
        self.catalog
            .relations_in_namespace(namespace)
            .unwrap()
            .into_iter()
            .find(|r| r.name == name)
    }

    fn assert_template_intact(&self) {
        assert_eq!(self.catalog.namespace_oid("gtemplate").unwrap(), Some(Oid(100)));
        assert_eq!(
            self.catalog.registered_namespace("gtemplate").unwrap(),
            Some(Oid(100))
        );
        assert_eq!(self.catalog.label_rows(GraphId(101)).unwrap().len(), 2);
    }
}

#[test]
fn test_clone_rewrites_labels_for_new_graph() {
    let scenario = Scenario::social_graph();
    let mut cloner = scenario.cloner();

    let report = cloner.clone_graph(&scenario.request(true)).unwrap();

    assert_eq!(cloner.stage(), CloneStage::Done);
    assert_eq!(report.template_namespace, Oid(100));
    assert_eq!(report.namespace, Oid(200));
    assert_eq!(report.graph_id, GraphId(201));
    assert!(report.skipped_labels.is_empty());

    let rows = scenario.catalog.label_rows(GraphId(201)).unwrap();
    assert_eq!(rows, report.labels);
    assert_eq!(rows.len(), 2);

    let knows = &rows[0];
    assert_eq!(knows.name, "knows");
    assert_eq!(knows.id, 2);
    assert_eq!(knows.kind, LabelKind::Edge);
    assert_eq!(
        Some(knows.relation),
        scenario.relation(Oid(200), "knows").map(|r| r.relfilenode)
    );

    let person = &rows[1];
    assert_eq!(person.name, "person");
    assert_eq!(person.id, 1);
    assert_eq!(person.kind, LabelKind::Vertex);
    assert_eq!(
        Some(person.relation),
        scenario.relation(Oid(200), "person").map(|r| r.relfilenode)
    );
    assert_ne!(person.relation, Oid(101));

    assert_eq!(
        scenario.catalog.registered_namespace("new_graph").unwrap(),
        Some(Oid(200))
    );
    scenario.assert_template_intact();
    assert!(!scenario.dump_file().exists());
}

#[test]
fn test_existing_target_fails_without_mutation() {
    let scenario = Scenario::social_graph();
    scenario.catalog.add_namespace("new_graph").unwrap();
    let mut cloner = scenario.cloner();

    let result = cloner.clone_graph(&scenario.request(true));

    assert!(matches!(result, Err(Error::AlreadyExists(ref name)) if name == "new_graph"));
    assert!(result.unwrap_err().to_string().contains("already exists"));
    assert_eq!(cloner.stage(), CloneStage::Aborted);
    assert_eq!(
        scenario.catalog.calls().unwrap(),
        vec![CatalogOperation::NamespaceOid]
    );
    assert_eq!(scenario.tools.invocations().unwrap(), (0, 0));
    scenario.assert_template_intact();
}

#[test]
fn test_missing_template_fails() {
    let scenario = Scenario::social_graph();
    let mut cloner = scenario.cloner();
    let request = CloneRequest {
        template: "absent".to_string(),
        ..scenario.request(true)
    };

    let result = cloner.clone_graph(&request);

    assert!(matches!(result, Err(Error::NotFound(ref name)) if name == "absent"));
    assert!(!scenario.catalog.namespace_exists("new_graph").unwrap());
}

#[test]
fn test_dump_failure_without_rollback_leaves_template_detached() {
    let scenario = Scenario::social_graph();
    scenario.tools.fail_dump().unwrap();
    let mut cloner = scenario.cloner();

    let result = cloner.clone_graph(&scenario.request(false));

    assert!(matches!(result, Err(Error::ExternalTool { ref tool, .. }) if tool == "pg_dump"));
    assert_eq!(cloner.stage(), CloneStage::Aborted);
    // Still renamed to the target and missing from ag_graph.
    assert_eq!(scenario.catalog.namespace_oid("gtemplate").unwrap(), None);
    assert_eq!(
        scenario.catalog.namespace_oid("new_graph").unwrap(),
        Some(Oid(100))
    );
    assert_eq!(scenario.catalog.registered_namespace("gtemplate").unwrap(), None);
    assert!(scenario.dump_file().exists());
}

#[test]
fn test_dump_failure_with_rollback_restores_template() {
    let scenario = Scenario::social_graph();
    scenario.tools.fail_dump().unwrap();
    let mut cloner = scenario.cloner();

    let result = cloner.clone_graph(&scenario.request(true));

    assert!(matches!(result, Err(Error::ExternalTool { .. })));
    scenario.assert_template_intact();
    assert!(!scenario.catalog.namespace_exists("new_graph").unwrap());
    assert!(!scenario.dump_file().exists());
}

#[test]
fn test_restore_failure_with_rollback_drops_new_schema() {
    let scenario = Scenario::social_graph();
    scenario.tools.fail_restore().unwrap();
    let mut cloner = scenario.cloner();

    let result = cloner.clone_graph(&scenario.request(true));

    assert!(matches!(result, Err(Error::ExternalTool { ref tool, .. }) if tool == "psql"));
    assert!(!scenario.catalog.namespace_exists("new_graph").unwrap());
    assert!(!scenario.dump_file().exists());
    scenario.assert_template_intact();
}

#[test]
fn test_restore_failure_without_rollback_keeps_partial_state() {
    let scenario = Scenario::social_graph();
    scenario.tools.fail_restore().unwrap();
    let mut cloner = scenario.cloner();

    let result = cloner.clone_graph(&scenario.request(false));

    assert!(result.is_err());
    let target = scenario.catalog.namespace_oid("new_graph").unwrap().unwrap();
    assert!(scenario.catalog.relations_in_namespace(target).unwrap().is_empty());
    assert!(scenario.dump_file().exists());
    scenario.assert_template_intact();
}

#[test]
fn test_missing_table_is_reported_as_skipped() {
    let scenario = Scenario::social_graph();
    scenario.tools.omit_on_restore("knows").unwrap();
    let mut cloner = scenario.cloner();

    let report = cloner.clone_graph(&scenario.request(true)).unwrap();

    assert_eq!(report.skipped_labels, vec!["knows".to_string()]);
    assert_eq!(report.labels.len(), 1);
    assert_eq!(report.labels[0].name, "person");
    assert!(report.summary().contains("1 skipped"));
    assert_eq!(scenario.catalog.label_rows(report.graph_id).unwrap().len(), 1);
}

#[test]
fn test_label_insert_failure_rolls_back_catalog_rows() {
    let scenario = Scenario::social_graph();
    scenario
        .catalog
        .fail_after(CatalogOperation::InsertLabel, 1)
        .unwrap();
    let mut cloner = scenario.cloner();

    let result = cloner.clone_graph(&scenario.request(true));

    assert!(matches!(result, Err(Error::CatalogWrite { .. })));
    assert!(scenario.catalog.label_rows(GraphId(201)).unwrap().is_empty());
    assert!(!scenario.catalog.namespace_exists("new_graph").unwrap());
    assert_eq!(scenario.catalog.registered_namespace("new_graph").unwrap(), None);
    scenario.assert_template_intact();
}

#[test]
fn test_second_clone_into_same_target_fails() {
    let scenario = Scenario::social_graph();
    let mut cloner = scenario.cloner();
    cloner.clone_graph(&scenario.request(true)).unwrap();

    let result = cloner.clone_graph(&scenario.request(true));

    assert!(matches!(result, Err(Error::AlreadyExists(_))));
    assert_eq!(scenario.catalog.label_rows(GraphId(201)).unwrap().len(), 2);
}

#[test]
fn test_names_are_matched_exactly() {
    let catalog = InMemoryCatalog::with_next_oid(100);
    let template = catalog.add_graph("Social.Graph").unwrap();
    catalog
        .add_label(template, "Person", 1, LabelKind::Vertex)
        .unwrap();
    let lowercase = catalog.add_graph("newgraph").unwrap();
    catalog.set_next_oid(200).unwrap();
    let tools = InMemoryTools::new(catalog.clone());
    let dir = tempfile::tempdir().unwrap();
    let mut cloner = GraphCloner::new(catalog.clone(), tools);

    let report = cloner
        .clone_graph(&CloneRequest {
            template: "Social.Graph".to_string(),
            target: "NewGraph".to_string(),
            dump_file: dir.path().join("new_schema.sql"),
            rollback: true,
        })
        .unwrap();

    assert_eq!(report.namespace, Oid(200));
    assert_eq!(report.labels.len(), 1);
    assert_eq!(report.labels[0].name, "Person");
    assert_eq!(
        catalog.registered_namespace("NewGraph").unwrap(),
        Some(Oid(200))
    );
    assert_eq!(catalog.registered_namespace("newgraph").unwrap(), Some(lowercase));
    assert!(catalog.relations_in_namespace(lowercase).unwrap().is_empty());
    assert_eq!(
        catalog.namespace_oid("Social.Graph").unwrap(),
        Some(template)
    );
}
