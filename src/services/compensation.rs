//! Compensating actions for multi-step catalog mutations.
//!
//! Nothing in a clone runs inside a transaction. Instead each mutation
//! records the action that reverses it. A later forward step that restores
//! the state itself (renaming the template back, say) discharges the
//! matching entry. Whatever remains when a step fails is what a rollback has
//! to undo.

use crate::catalog::{CatalogBackend, GraphId, Oid};
use crate::{Error, Result};
use std::fmt;
use std::path::PathBuf;

/// One reversing action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompensatingAction {
    /// Re-adds a graph registry row that was removed.
    ReattachGraph {
        /// Graph name.
        name: String,
        /// Namespace the row pointed at.
        namespace: Oid,
    },
    /// Renames a namespace back.
    RenameSchema {
        /// Current name.
        from: String,
        /// Name to restore.
        to: String,
    },
    /// Drops a namespace this run created.
    DropSchema {
        /// Namespace name.
        name: String,
    },
    /// Removes the intermediate dump file.
    RemoveDumpFile {
        /// File path.
        path: PathBuf,
    },
    /// Removes the label rows this run inserted.
    DeleteLabels {
        /// Graph the rows belong to.
        graph: GraphId,
    },
    /// Removes a graph registry row this run inserted.
    UnregisterGraph {
        /// Graph name.
        name: String,
    },
}

impl CompensatingAction {
    /// Performs the action.
    ///
    /// # Errors
    ///
    /// Returns the catalog or filesystem error that stopped it.
    pub fn apply<C: CatalogBackend + ?Sized>(&self, catalog: &C) -> Result<()> {
        match self {
            Self::ReattachGraph { name, namespace } => catalog.register_graph(name, *namespace),
            Self::RenameSchema { from, to } => catalog.rename_schema(from, to),
            Self::DropSchema { name } => catalog.drop_schema(name),
            Self::RemoveDumpFile { path } => match std::fs::remove_file(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(Error::OperationFailed {
                    operation: "remove_dump_file".to_string(),
                    cause: format!("{}: {e}", path.display()),
                }),
            },
            Self::DeleteLabels { graph } => catalog.delete_labels(*graph).map(|_| ()),
            Self::UnregisterGraph { name } => catalog.unregister_graph(name).map(|_| ()),
        }
    }
}

impl fmt::Display for CompensatingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReattachGraph { name, namespace } => {
                write!(f, "register graph '{name}' for namespace {namespace}")
            },
            Self::RenameSchema { from, to } => write!(f, "rename schema '{from}' to '{to}'"),
            Self::DropSchema { name } => write!(f, "drop schema '{name}'"),
            Self::RemoveDumpFile { path } => write!(f, "remove {}", path.display()),
            Self::DeleteLabels { graph } => write!(f, "delete labels of graph {graph}"),
            Self::UnregisterGraph { name } => write!(f, "unregister graph '{name}'"),
        }
    }
}

/// Result of a rollback.
#[derive(Debug, Default)]
pub struct RollbackOutcome {
    /// Actions that succeeded.
    pub applied: Vec<CompensatingAction>,
    /// Actions that failed, with the cause.
    pub failed: Vec<(CompensatingAction, String)>,
}

impl RollbackOutcome {
    /// Returns true if every action succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ordered journal of pending compensating actions.
#[derive(Debug, Default)]
pub struct UndoLog {
    actions: Vec<CompensatingAction>,
}

impl UndoLog {
    /// Creates an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Records the inverse of a mutation that just succeeded.
    pub fn push(&mut self, action: CompensatingAction) {
        tracing::trace!(%action, "Recorded compensating action");
        self.actions.push(action);
    }

    /// Drops the newest entry equal to `action`, because the forward path
    /// already performed it. Returns false if no entry matched.
    pub fn discharge(&mut self, action: &CompensatingAction) -> bool {
        match self.actions.iter().rposition(|a| a == action) {
            Some(index) => {
                self.actions.remove(index);
                true
            },
            None => false,
        }
    }

    /// Returns the pending actions, oldest first.
    #[must_use]
    pub fn pending(&self) -> &[CompensatingAction] {
        &self.actions
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Forgets every pending action.
    pub fn clear(&mut self) {
        self.actions.clear();
    }

    /// Runs every pending action, newest first, and empties the log.
    ///
    /// A failing action is logged and recorded; the remaining actions still
    /// run.
    pub fn rollback<C: CatalogBackend + ?Sized>(&mut self, catalog: &C) -> RollbackOutcome {
        let mut outcome = RollbackOutcome::default();

        while let Some(action) = self.actions.pop() {
            match action.apply(catalog) {
                Ok(()) => {
                    tracing::warn!(%action, "Rolled back");
                    outcome.applied.push(action);
                },
                Err(e) => {
                    tracing::warn!(%action, error = %e, "Rollback action failed");
                    outcome.failed.push((action, e.to_string()));
                },
            }
        }

        outcome
    }
}
