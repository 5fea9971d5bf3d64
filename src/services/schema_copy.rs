//! Schema duplication through dump and restore.
//!
//! `pg_dump` can only dump a schema under its current name, so the template
//! is briefly renamed to the target name, detached from the graph registry,
//! dumped, and then put back. The dump is finally restored into a freshly
//! created target schema.

use super::compensation::{CompensatingAction, UndoLog};
use crate::catalog::{CatalogBackend, Oid};
use crate::tools::DumpRestore;
use crate::{Error, Result};
use std::path::Path;
use tracing::instrument;

/// Copies a template schema into a new schema.
pub struct SchemaCopier<'a, C: ?Sized, T: ?Sized> {
    catalog: &'a C,
    tools: &'a T,
}

impl<'a, C, T> SchemaCopier<'a, C, T>
where
    C: CatalogBackend + ?Sized,
    T: DumpRestore + ?Sized,
{
    /// Creates a copier over a catalog and a dump/restore tool.
    #[must_use]
    pub const fn new(catalog: &'a C, tools: &'a T) -> Self {
        Self { catalog, tools }
    }

    /// Runs both halves of the copy. Returns the template namespace oid.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error. Completed steps are left in
    /// place; their inverses remain in `undo`.
    pub fn copy_schema(
        &self,
        template: &str,
        target: &str,
        dump_file: &Path,
        undo: &mut UndoLog,
    ) -> Result<Oid> {
        let template_oid = self.rename_and_backup(template, target, dump_file, undo)?;
        self.restore_and_recreate(target, dump_file, undo)?;
        Ok(template_oid)
    }

    /// Checks both names, detaches and renames the template, dumps it, and
    /// restores its name and registry row.
    ///
    /// Fails before any mutation if `target` exists or `template` does not.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`], [`Error::NotFound`], or the error of
    /// the failing catalog statement or dump.
    #[instrument(skip_all, fields(template = %template, target = %target))]
    pub fn rename_and_backup(
        &self,
        template: &str,
        target: &str,
        dump_file: &Path,
        undo: &mut UndoLog,
    ) -> Result<Oid> {
        tracing::debug!("Checking that the target does not exist");
        if self.catalog.namespace_exists(target)? {
            return Err(Error::AlreadyExists(target.to_string()));
        }

        tracing::debug!("Checking that the template exists");
        let template_oid = self
            .catalog
            .namespace_oid(template)?
            .ok_or_else(|| Error::NotFound(template.to_string()))?;

        tracing::debug!("Detaching template from ag_graph and renaming it to the target");
        let removed = self.catalog.unregister_graph(template)?;
        let reattach = CompensatingAction::ReattachGraph {
            name: template.to_string(),
            namespace: template_oid,
        };
        if removed > 0 {
            undo.push(reattach.clone());
        } else {
            tracing::warn!("Template has no ag_graph row; it will be registered when restored");
        }

        self.catalog.rename_schema(template, target)?;
        let rename_back = CompensatingAction::RenameSchema {
            from: target.to_string(),
            to: template.to_string(),
        };
        undo.push(rename_back.clone());

        tracing::debug!(file = %dump_file.display(), "Dumping renamed schema");
        undo.push(CompensatingAction::RemoveDumpFile {
            path: dump_file.to_path_buf(),
        });
        self.tools.dump_schema(target, dump_file)?;

        tracing::debug!("Renaming the schema back and re-registering the template");
        rename_back.apply(self.catalog)?;
        undo.discharge(&rename_back);
        reattach.apply(self.catalog)?;
        undo.discharge(&reattach);

        Ok(template_oid)
    }

    /// Creates the empty target schema, restores the dump into it, and
    /// removes the dump file.
    ///
    /// # Errors
    ///
    /// Returns the error of the failing statement, restore, or file removal.
    #[instrument(skip_all, fields(target = %target))]
    pub fn restore_and_recreate(
        &self,
        target: &str,
        dump_file: &Path,
        undo: &mut UndoLog,
    ) -> Result<()> {
        tracing::debug!("Creating new schema");
        self.catalog.create_schema(target)?;
        undo.push(CompensatingAction::DropSchema {
            name: target.to_string(),
        });

        tracing::debug!(file = %dump_file.display(), "Restoring data into new schema");
        self.tools.restore(dump_file)?;

        std::fs::remove_file(dump_file).map_err(|e| Error::OperationFailed {
            operation: "remove_dump_file".to_string(),
            cause: format!("{}: {e}", dump_file.display()),
        })?;
        undo.discharge(&CompensatingAction::RemoveDumpFile {
            path: dump_file.to_path_buf(),
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogOperation, InMemoryCatalog, LabelKind};
    use crate::tools::InMemoryTools;

    struct Fixture {
        catalog: InMemoryCatalog,
        tools: InMemoryTools,
        template_oid: Oid,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let catalog = InMemoryCatalog::with_next_oid(100);
            let template_oid = catalog.add_graph("gtemplate").unwrap();
            catalog
                .add_label(template_oid, "person", 1, LabelKind::Vertex)
                .unwrap();
            let tools = InMemoryTools::new(catalog.clone());
            Self {
                catalog,
                tools,
                template_oid,
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn dump_file(&self) -> std::path::PathBuf {
            self.dir.path().join("new_schema.sql")
        }

        fn copier(&self) -> SchemaCopier<'_, InMemoryCatalog, InMemoryTools> {
            SchemaCopier::new(&self.catalog, &self.tools)
        }
    }

    #[test]
    fn test_copy_schema_success() {
        let fx = Fixture::new();
        let mut undo = UndoLog::new();

        let oid = fx
            .copier()
            .copy_schema("gtemplate", "new_graph", &fx.dump_file(), &mut undo)
            .unwrap();

        assert_eq!(oid, fx.template_oid);
        assert_eq!(fx.catalog.namespace_oid("gtemplate").unwrap(), Some(oid));
        assert_eq!(fx.catalog.registered_namespace("gtemplate").unwrap(), Some(oid));

        let target = fx.catalog.namespace_oid("new_graph").unwrap().unwrap();
        assert_ne!(target, oid);
        let relations = fx.catalog.relations_in_namespace(target).unwrap();
        assert_eq!(relations.len(), 1);
        assert!(!fx.dump_file().exists());
        assert_eq!(
            undo.pending(),
            &[CompensatingAction::DropSchema {
                name: "new_graph".to_string()
            }]
        );
    }

    #[test]
    fn test_target_exists_fails_without_mutation() {
        let fx = Fixture::new();
        fx.catalog.add_namespace("new_graph").unwrap();
        let mut undo = UndoLog::new();

        let result =
            fx.copier()
                .copy_schema("gtemplate", "new_graph", &fx.dump_file(), &mut undo);

        assert!(matches!(result, Err(Error::AlreadyExists(ref n)) if n == "new_graph"));
        assert!(undo.is_empty());
        assert_eq!(
            fx.catalog.calls().unwrap(),
            vec![CatalogOperation::NamespaceOid]
        );
        assert_eq!(
            fx.catalog.registered_namespace("gtemplate").unwrap(),
            Some(fx.template_oid)
        );
        assert_eq!(fx.tools.invocations().unwrap(), (0, 0));
    }

    #[test]
    fn test_missing_template_fails() {
        let fx = Fixture::new();
        let mut undo = UndoLog::new();

        let result = fx
            .copier()
            .copy_schema("absent", "new_graph", &fx.dump_file(), &mut undo);

        assert!(matches!(result, Err(Error::NotFound(ref n)) if n == "absent"));
        assert!(undo.is_empty());
    }

    #[test]
    fn test_dump_failure_leaves_template_detached() {
        let fx = Fixture::new();
        fx.tools.fail_dump().unwrap();
        let mut undo = UndoLog::new();

        let result = fx
            .copier()
            .copy_schema("gtemplate", "new_graph", &fx.dump_file(), &mut undo);

        assert!(matches!(result, Err(Error::ExternalTool { .. })));
        assert_eq!(fx.catalog.namespace_oid("gtemplate").unwrap(), None);
        assert_eq!(
            fx.catalog.namespace_oid("new_graph").unwrap(),
            Some(fx.template_oid)
        );
        assert_eq!(fx.catalog.registered_namespace("gtemplate").unwrap(), None);
        assert_eq!(undo.pending().len(), 3);
    }

    #[test]
    fn test_restore_failure_leaves_empty_schema_and_dump_file() {
        let fx = Fixture::new();
        fx.tools.fail_restore().unwrap();
        let mut undo = UndoLog::new();

        let result = fx
            .copier()
            .copy_schema("gtemplate", "new_graph", &fx.dump_file(), &mut undo);

        assert!(matches!(result, Err(Error::ExternalTool { ref tool, .. }) if tool == "psql"));
        assert!(fx.catalog.namespace_exists("new_graph").unwrap());
        assert!(fx.dump_file().exists());
        assert_eq!(
            fx.catalog.registered_namespace("gtemplate").unwrap(),
            Some(fx.template_oid)
        );
        assert_eq!(undo.pending().len(), 2);
    }
}
