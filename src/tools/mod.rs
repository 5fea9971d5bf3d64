//! External dump and restore utilities.
//!
//! The schema copy is delegated to PostgreSQL's own client binaries. Each
//! invocation is synchronous: the child is spawned and waited on, with no
//! timeout.

mod memory;

pub use memory::InMemoryTools;

use crate::catalog::quote_ident;
use crate::config::{DatabaseConfig, ToolsConfig};
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Bytes of child stderr kept in error messages.
const STDERR_TAIL_BYTES: usize = 2048;

/// Dumps a schema to a file and restores a file into the database.
pub trait DumpRestore: Send + Sync {
    /// Writes the contents of `schema` to `file`.
    fn dump_schema(&self, schema: &str, file: &Path) -> Result<()>;

    /// Loads `file` into the current database.
    fn restore(&self, file: &Path) -> Result<()>;
}

/// `pg_dump` / `psql` runner.
#[derive(Debug, Clone)]
pub struct PgTools {
    pg_dump: PathBuf,
    psql: PathBuf,
    user: String,
    host: String,
    port: u16,
    dbname: String,
    password: SecretString,
}

impl PgTools {
    /// Creates a runner using the connection settings of `database`.
    #[must_use]
    pub fn new(database: &DatabaseConfig, tools: &ToolsConfig) -> Self {
        Self {
            pg_dump: tools.binary("pg_dump"),
            psql: tools.binary("psql"),
            user: database.user.clone(),
            host: database.host.clone(),
            port: database.port,
            dbname: database.dbname.clone(),
            password: database.password.clone(),
        }
    }

    /// Arguments shared by both tools.
    fn connection_args(&self) -> Vec<OsString> {
        vec![
            "-U".into(),
            self.user.clone().into(),
            "-p".into(),
            self.port.to_string().into(),
            "-h".into(),
            self.host.clone().into(),
        ]
    }

    /// Arguments for dumping `schema` into `file`.
    ///
    /// `-n` takes a pattern: unquoted names are folded to lower case and
    /// `*`, `?` and `.` are special. The name is passed double-quoted so it
    /// matches exactly the schema the DDL created.
    #[must_use]
    pub fn dump_args(&self, schema: &str, file: &Path) -> Vec<OsString> {
        let mut args = self.connection_args();
        args.extend([
            "-n".into(),
            quote_ident(schema).into(),
            "-f".into(),
            file.as_os_str().to_owned(),
            self.dbname.clone().into(),
        ]);
        args
    }

    /// Arguments for restoring `file`.
    ///
    /// `ON_ERROR_STOP` stays off. The dump starts with `CREATE SCHEMA` for
    /// the already created target, and that error must not end the restore.
    #[must_use]
    pub fn restore_args(&self, file: &Path) -> Vec<OsString> {
        let mut args = self.connection_args();
        args.extend([
            "-q".into(),
            "-d".into(),
            self.dbname.clone().into(),
            "-f".into(),
            file.as_os_str().to_owned(),
        ]);
        args
    }

    /// Runs a tool to completion.
    fn run(&self, tool: &str, program: &Path, args: &[OsString]) -> Result<()> {
        tracing::debug!(
            tool,
            program = %program.display(),
            args = ?args,
            "Starting external tool"
        );

        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null());
        let password = self.password.expose_secret();
        if !password.is_empty() {
            command.env("PGPASSWORD", password);
        }

        let output = command.output().map_err(|e| Error::ExternalTool {
            tool: tool.to_string(),
            cause: format!("cannot start {}: {e}", program.display()),
        })?;

        if !output.status.success() {
            return Err(Error::ExternalTool {
                tool: tool.to_string(),
                cause: format!(
                    "{}: {}",
                    output.status,
                    stderr_tail(&output.stderr).trim()
                ),
            });
        }

        tracing::debug!(tool, "External tool finished");
        Ok(())
    }
}

impl DumpRestore for PgTools {
    fn dump_schema(&self, schema: &str, file: &Path) -> Result<()> {
        self.run("pg_dump", &self.pg_dump, &self.dump_args(schema, file))
    }

    fn restore(&self, file: &Path) -> Result<()> {
        self.run("psql", &self.psql, &self.restore_args(file))
    }
}

/// Returns the last few kilobytes of a child's stderr as text.
fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).into_owned()
}
