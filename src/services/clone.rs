//! Graph clone driver.
//!
//! ```text
//! Connect -> RenameAndBackup -> RestoreAndRecreate -> ReconcileCatalog -> Done
//!    |              |                  |                     |
//!    +--------------+------------------+---------------------+--> Aborted
//! ```

use super::catalog_rewrite::{CatalogRewrite, CatalogRewriter};
use super::compensation::UndoLog;
use super::schema_copy::SchemaCopier;
use crate::catalog::{CatalogBackend, GraphId, LabelRow, Oid, PostgresCatalog};
use crate::config::CloneConfig;
use crate::tools::{DumpRestore, PgTools};
use crate::Result;
use std::fmt;
use std::path::PathBuf;
use tracing::instrument;

/// Stage of a clone run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneStage {
    /// Connected, nothing done yet.
    Connect,
    /// Guards, detach, rename, dump, and rename back.
    RenameAndBackup,
    /// Create the target and restore the dump into it.
    RestoreAndRecreate,
    /// Write label and registry rows for the new graph.
    ReconcileCatalog,
    /// Finished successfully.
    Done,
    /// A stage failed.
    Aborted,
}

impl fmt::Display for CloneStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::RenameAndBackup => "rename-and-backup",
            Self::RestoreAndRecreate => "restore-and-recreate",
            Self::ReconcileCatalog => "reconcile-catalog",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// What to clone and how.
#[derive(Debug, Clone)]
pub struct CloneRequest {
    /// Graph to clone.
    pub template: String,
    /// Graph to create.
    pub target: String,
    /// Intermediate dump file.
    pub dump_file: PathBuf,
    /// Undo completed steps if a later step fails.
    pub rollback: bool,
}

/// Result of a successful clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneReport {
    /// Template graph name.
    pub template: String,
    /// New graph name.
    pub target: String,
    /// Template namespace oid.
    pub template_namespace: Oid,
    /// New namespace oid.
    pub namespace: Oid,
    /// New graph id.
    pub graph_id: GraphId,
    /// Label rows written for the new graph.
    pub labels: Vec<LabelRow>,
    /// Template labels that were not carried over.
    pub skipped_labels: Vec<String>,
}

impl CloneReport {
    /// Returns a one-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "graph '{}' cloned into '{}' (namespace {}, graph id {}): {} labels copied, {} skipped",
            self.template,
            self.target,
            self.namespace,
            self.graph_id,
            self.labels.len(),
            self.skipped_labels.len()
        )
    }
}

/// Runs the clone stages in order over one catalog connection.
pub struct GraphCloner<C, T> {
    catalog: C,
    tools: T,
    stage: CloneStage,
}

impl GraphCloner<PostgresCatalog, PgTools> {
    /// Connects to the configured database and prepares the client tools.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] if the connection fails.
    pub fn connect(config: &CloneConfig) -> Result<Self> {
        let catalog = PostgresCatalog::connect(&config.database)?;
        let tools = PgTools::new(&config.database, &config.tools);
        Ok(Self::new(catalog, tools))
    }
}

impl<C: CatalogBackend, T: DumpRestore> GraphCloner<C, T> {
    /// Creates a cloner over an open catalog and a dump/restore tool.
    #[must_use]
    pub const fn new(catalog: C, tools: T) -> Self {
        Self {
            catalog,
            tools,
            stage: CloneStage::Connect,
        }
    }

    /// Returns the current stage.
    #[must_use]
    pub const fn stage(&self) -> CloneStage {
        self.stage
    }

    /// Returns the catalog backend.
    #[must_use]
    pub const fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Clones `request.template` into `request.target`.
    ///
    /// On failure the stage becomes [`CloneStage::Aborted`]. With
    /// `request.rollback` set, the recorded compensating actions run before
    /// the original error is returned; otherwise partial state is left for
    /// the operator.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step.
    #[instrument(skip_all, fields(template = %request.template, target = %request.target))]
    pub fn clone_graph(&mut self, request: &CloneRequest) -> Result<CloneReport> {
        self.stage = CloneStage::Connect;
        let mut undo = UndoLog::new();

        match self.run_stages(request, &mut undo) {
            Ok(report) => {
                self.stage = CloneStage::Done;
                tracing::info!(summary = %report.summary(), "Clone finished");
                Ok(report)
            },
            Err(e) => {
                let failed = self.stage;
                self.stage = CloneStage::Aborted;
                tracing::error!(stage = %failed, error = %e, "Clone failed");
                self.handle_failure(request, &mut undo);
                Err(e)
            },
        }
    }

    fn run_stages(&mut self, request: &CloneRequest, undo: &mut UndoLog) -> Result<CloneReport> {
        let copier = SchemaCopier::new(&self.catalog, &self.tools);

        self.stage = CloneStage::RenameAndBackup;
        let template_namespace =
            copier.rename_and_backup(&request.template, &request.target, &request.dump_file, undo)?;

        self.stage = CloneStage::RestoreAndRecreate;
        copier.restore_and_recreate(&request.target, &request.dump_file, undo)?;
        tracing::debug!("Schema {} copied into {}", request.template, request.target);

        self.stage = CloneStage::ReconcileCatalog;
        let CatalogRewrite {
            namespace,
            graph_id,
            labels,
            skipped,
        } = CatalogRewriter::new(&self.catalog).rewrite(&request.template, &request.target, undo)?;

        undo.clear();
        Ok(CloneReport {
            template: request.template.clone(),
            target: request.target.clone(),
            template_namespace,
            namespace,
            graph_id,
            labels,
            skipped_labels: skipped,
        })
    }

    fn handle_failure(&self, request: &CloneRequest, undo: &mut UndoLog) {
        if undo.is_empty() {
            return;
        }

        if !request.rollback {
            for action in undo.pending() {
                tracing::warn!(%action, "Rollback disabled, manual cleanup needed");
            }
            return;
        }

        let outcome = undo.rollback(&self.catalog);
        if outcome.is_complete() {
            tracing::warn!(actions = outcome.applied.len(), "Rollback complete");
        } else {
            for (action, cause) in &outcome.failed {
                tracing::error!(%action, cause = %cause, "Rollback incomplete, manual cleanup needed");
            }
        }
    }
}
