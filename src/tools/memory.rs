//! In-memory dump/restore for testing.
//!
//! Works against an [`InMemoryCatalog`]: a dump writes the relation names of
//! a schema to a real file, and a restore recreates those relations (with
//! fresh `relfilenode`s) in the schema named by the file.

use super::DumpRestore;
use crate::catalog::{CatalogBackend, InMemoryCatalog};
use crate::{Error, Result};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA_PREFIX: &str = "SCHEMA ";
const TABLE_PREFIX: &str = "TABLE ";

#[derive(Debug, Default)]
struct ToolBehavior {
    fail_dump: bool,
    fail_restore: bool,
    omitted: HashSet<String>,
    dumps: usize,
    restores: usize,
}

/// Dump/restore double backed by an [`InMemoryCatalog`].
#[derive(Debug, Clone)]
pub struct InMemoryTools {
    catalog: InMemoryCatalog,
    behavior: Arc<Mutex<ToolBehavior>>,
}

impl InMemoryTools {
    /// Creates tools operating on `catalog`.
    #[must_use]
    pub fn new(catalog: InMemoryCatalog) -> Self {
        Self {
            catalog,
            behavior: Arc::new(Mutex::new(ToolBehavior::default())),
        }
    }

    fn with_behavior<T>(&self, f: impl FnOnce(&mut ToolBehavior) -> T) -> Result<T> {
        let mut behavior = self.behavior.lock().map_err(|e| Error::OperationFailed {
            operation: "in_memory_tools_lock".to_string(),
            cause: e.to_string(),
        })?;
        Ok(f(&mut behavior))
    }

    /// Makes every dump exit non-zero (after writing a partial file).
    pub fn fail_dump(&self) -> Result<()> {
        self.with_behavior(|b| b.fail_dump = true)
    }

    /// Makes every restore exit non-zero (without loading anything).
    pub fn fail_restore(&self) -> Result<()> {
        self.with_behavior(|b| b.fail_restore = true)
    }

    /// Makes restores skip the relation called `name`.
    pub fn omit_on_restore(&self, name: &str) -> Result<()> {
        self.with_behavior(|b| {
            b.omitted.insert(name.to_string());
        })
    }

    /// Returns `(dumps, restores)` attempted so far.
    pub fn invocations(&self) -> Result<(usize, usize)> {
        self.with_behavior(|b| (b.dumps, b.restores))
    }
}

fn io_error(op: &str, path: &Path, e: &std::io::Error) -> Error {
    Error::ExternalTool {
        tool: op.to_string(),
        cause: format!("{}: {e}", path.display()),
    }
}

impl DumpRestore for InMemoryTools {
    fn dump_schema(&self, schema: &str, file: &Path) -> Result<()> {
        let fail = self.with_behavior(|b| {
            b.dumps += 1;
            b.fail_dump
        })?;

        let namespace = self
            .catalog
            .namespace_oid(schema)?
            .ok_or_else(|| Error::ExternalTool {
                tool: "pg_dump".to_string(),
                cause: format!("no matching schemas were found for \"{schema}\""),
            })?;

        let mut contents = format!("{SCHEMA_PREFIX}{schema}\n");
        if !fail {
            for relation in self.catalog.relations_in_namespace(namespace)? {
                contents.push_str(TABLE_PREFIX);
                contents.push_str(&relation.name);
                contents.push('\n');
            }
        }
        std::fs::write(file, contents).map_err(|e| io_error("pg_dump", file, &e))?;

        if fail {
            return Err(Error::ExternalTool {
                tool: "pg_dump".to_string(),
                cause: "exit status: 1".to_string(),
            });
        }
        Ok(())
    }

    fn restore(&self, file: &Path) -> Result<()> {
        let (fail, omitted) = self.with_behavior(|b| {
            b.restores += 1;
            (b.fail_restore, b.omitted.clone())
        })?;
        if fail {
            return Err(Error::ExternalTool {
                tool: "psql".to_string(),
                cause: "exit status: 2".to_string(),
            });
        }

        let contents = std::fs::read_to_string(file).map_err(|e| io_error("psql", file, &e))?;
        let mut lines = contents.lines();
        let schema = lines
            .next()
            .and_then(|l| l.strip_prefix(SCHEMA_PREFIX))
            .ok_or_else(|| Error::ExternalTool {
                tool: "psql".to_string(),
                cause: format!("{} is not a schema dump", file.display()),
            })?;

        // The dump's own CREATE SCHEMA fails harmlessly when the schema exists.
        let namespace = match self.catalog.namespace_oid(schema)? {
            Some(oid) => oid,
            None => self.catalog.add_namespace(schema)?,
        };

        for table in lines.filter_map(|l| l.strip_prefix(TABLE_PREFIX)) {
            if !omitted.contains(table) {
                self.catalog.add_relation(namespace, table)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::LabelKind;

    #[test]
    fn test_dump_then_restore_into_renamed_schema() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("dump.sql");
        let catalog = InMemoryCatalog::new();
        let oid = catalog.add_graph("new_graph").unwrap();
        catalog.add_label(oid, "person", 1, LabelKind::Vertex).unwrap();
        let tools = InMemoryTools::new(catalog.clone());

        tools.dump_schema("new_graph", &file).unwrap();
        catalog.rename_schema("new_graph", "gtemplate").unwrap();
        catalog.create_schema("new_graph").unwrap();
        tools.restore(&file).unwrap();

        let target = catalog.namespace_oid("new_graph").unwrap().unwrap();
        let relations = catalog.relations_in_namespace(target).unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].name, "person");
        assert_eq!(tools.invocations().unwrap(), (1, 1));
    }

    #[test]
    fn test_dump_missing_schema_fails() {
        let dir = tempfile::tempdir().unwrap();
        let tools = InMemoryTools::new(InMemoryCatalog::new());
        let result = tools.dump_schema("absent", &dir.path().join("d.sql"));
        assert!(matches!(result, Err(Error::ExternalTool { .. })));
    }

    #[test]
    fn test_restore_skips_omitted_relation() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("dump.sql");
        std::fs::write(&file, "SCHEMA g\nTABLE a\nTABLE b\n").unwrap();
        let catalog = InMemoryCatalog::new();
        let tools = InMemoryTools::new(catalog.clone());
        tools.omit_on_restore("b").unwrap();

        tools.restore(&file).unwrap();

        let oid = catalog.namespace_oid("g").unwrap().unwrap();
        let names: Vec<String> = catalog
            .relations_in_namespace(oid)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["a".to_string()]);
    }
}
