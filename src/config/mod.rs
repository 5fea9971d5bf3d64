//! Configuration management.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! command-line flags, then environment variables. Non-empty environment
//! values win over everything else.

use crate::services::CloneRequest;
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Longest identifier PostgreSQL keeps without truncation (`NAMEDATALEN - 1`).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Default location of the intermediate dump file.
pub const DEFAULT_DUMP_FILE: &str = "/tmp/new_schema.sql";

/// Database connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database user name.
    pub user: String,
    /// Database password.
    pub password: SecretString,
    /// Database name.
    pub dbname: String,
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Extra PEM root certificate trusted for the TLS handshake.
    pub ssl_root_cert: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            user: "postgres".to_string(),
            password: SecretString::from(String::new()),
            dbname: "test".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            ssl_root_cert: None,
        }
    }
}

impl DatabaseConfig {
    /// Returns true if a non-empty password is configured.
    #[must_use]
    pub fn has_password(&self) -> bool {
        !self.password.expose_secret().is_empty()
    }
}

/// Location of the PostgreSQL client binaries.
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    /// Directory holding `pg_dump` and `psql`.
    pub bin_prefix: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            bin_prefix: PathBuf::from("/usr/local/pgsql/bin/"),
        }
    }
}

impl ToolsConfig {
    /// Resolves the full path of a client binary.
    #[must_use]
    pub fn binary(&self, name: &str) -> PathBuf {
        self.bin_prefix.join(name)
    }
}

/// Main configuration for a clone run.
#[derive(Debug, Clone)]
pub struct CloneConfig {
    /// Database connection settings.
    pub database: DatabaseConfig,
    /// External tool settings.
    pub tools: ToolsConfig,
    /// Graph to clone.
    pub template_name: String,
    /// Name of the graph to create.
    pub new_graph_name: String,
    /// Intermediate dump file.
    pub dump_file: PathBuf,
    /// Undo completed steps when a later step fails.
    pub rollback: bool,
    /// Log every step.
    pub verbose: bool,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            tools: ToolsConfig::default(),
            template_name: "gtemplate".to_string(),
            new_graph_name: "new_graph".to_string(),
            dump_file: PathBuf::from(DEFAULT_DUMP_FILE),
            rollback: true,
            verbose: false,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Database section.
    pub database: Option<ConfigFileDatabase>,
    /// Directory holding the PostgreSQL client binaries.
    pub pg_prefix: Option<String>,
    /// Template graph name.
    pub template: Option<String>,
    /// New graph name.
    pub new_graph: Option<String>,
    /// Intermediate dump file.
    pub dump_file: Option<String>,
    /// Undo completed steps on failure.
    pub rollback: Option<bool>,
    /// Verbose logging.
    pub verbose: Option<bool>,
}

/// Database section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileDatabase {
    /// User name.
    pub user: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Database name.
    pub name: Option<String>,
    /// Host.
    pub host: Option<String>,
    /// Port.
    pub port: Option<u16>,
    /// Extra PEM root certificate.
    pub ssl_root_cert: Option<String>,
}

/// Values supplied on the command line. `None` leaves the current value.
#[derive(Debug, Default)]
pub struct CliOverrides {
    /// `--dbu`.
    pub user: Option<String>,
    /// `--dbpsw`.
    pub password: Option<SecretString>,
    /// `--dbn`.
    pub dbname: Option<String>,
    /// `--dbh`.
    pub host: Option<String>,
    /// `--dbport`.
    pub port: Option<u16>,
    /// `--ssl-root-cert`.
    pub ssl_root_cert: Option<PathBuf>,
    /// `--pgpref`.
    pub pg_prefix: Option<PathBuf>,
    /// `--template`.
    pub template: Option<String>,
    /// `--new-graph`.
    pub new_graph: Option<String>,
    /// `--dump-file`.
    pub dump_file: Option<PathBuf>,
    /// `--no-rollback`.
    pub no_rollback: bool,
    /// `--verbose`.
    pub verbose: bool,
}

impl CloneConfig {
    /// Loads configuration from a TOML file on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        Self::from_toml(&contents)
    }

    /// Parses TOML configuration on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the contents are not valid configuration TOML.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self::from_config_file(file))
    }

    /// Builds configuration from a parsed config file.
    #[must_use]
    pub fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(db) = file.database {
            if let Some(user) = db.user {
                config.database.user = user;
            }
            if let Some(password) = db.password {
                config.database.password = SecretString::from(password);
            }
            if let Some(name) = db.name {
                config.database.dbname = name;
            }
            if let Some(host) = db.host {
                config.database.host = host;
            }
            if let Some(port) = db.port {
                config.database.port = port;
            }
            config.database.ssl_root_cert = db.ssl_root_cert.map(PathBuf::from);
        }
        if let Some(prefix) = file.pg_prefix {
            config.tools.bin_prefix = PathBuf::from(prefix);
        }
        if let Some(template) = file.template {
            config.template_name = template;
        }
        if let Some(new_graph) = file.new_graph {
            config.new_graph_name = new_graph;
        }
        if let Some(dump_file) = file.dump_file {
            config.dump_file = PathBuf::from(dump_file);
        }
        if let Some(rollback) = file.rollback {
            config.rollback = rollback;
        }
        if let Some(verbose) = file.verbose {
            config.verbose = verbose;
        }

        config
    }

    /// Applies command-line values.
    #[must_use]
    pub fn with_cli_overrides(mut self, cli: CliOverrides) -> Self {
        if let Some(user) = cli.user {
            self.database.user = user;
        }
        if let Some(password) = cli.password {
            self.database.password = password;
        }
        if let Some(dbname) = cli.dbname {
            self.database.dbname = dbname;
        }
        if let Some(host) = cli.host {
            self.database.host = host;
        }
        if let Some(port) = cli.port {
            self.database.port = port;
        }
        if cli.ssl_root_cert.is_some() {
            self.database.ssl_root_cert = cli.ssl_root_cert;
        }
        if let Some(prefix) = cli.pg_prefix {
            self.tools.bin_prefix = prefix;
        }
        if let Some(template) = cli.template {
            self.template_name = template;
        }
        if let Some(new_graph) = cli.new_graph {
            self.new_graph_name = new_graph;
        }
        if let Some(dump_file) = cli.dump_file {
            self.dump_file = dump_file;
        }
        if cli.no_rollback {
            self.rollback = false;
        }
        self.verbose |= cli.verbose;
        self
    }

    /// Applies environment variable overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup`. Empty values are ignored.
    #[must_use]
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(user) = get("DB_USER") {
            self.database.user = user;
        }
        if let Some(password) = get("DB_PSW") {
            self.database.password = SecretString::from(password);
        }
        if let Some(dbname) = get("DB_NAME") {
            self.database.dbname = dbname;
        }
        if let Some(host) = get("DB_HOST") {
            self.database.host = host;
        }
        if let Some(raw) = get("DB_PORT") {
            match parse_port(&raw) {
                Some(port) => self.database.port = port,
                None => tracing::warn!(
                    value = %raw,
                    port = self.database.port,
                    "Invalid DB_PORT environment variable, keeping current port"
                ),
            }
        }
        if let Some(prefix) = get("AG_PG_PREFIX") {
            self.tools.bin_prefix = PathBuf::from(prefix);
        }
        if let Some(template) = get("AG_TEMPLATE_GRAPH") {
            self.template_name = template;
        }
        if let Some(new_graph) = get("AG_NEW_GRAPH") {
            self.new_graph_name = new_graph;
        }

        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        validate_graph_name("template graph", &self.template_name)?;
        validate_graph_name("new graph", &self.new_graph_name)?;

        if self.template_name == self.new_graph_name {
            return Err(Error::InvalidInput(format!(
                "template and new graph are both '{}'",
                self.template_name
            )));
        }
        if self.database.user.is_empty() {
            return Err(Error::InvalidInput("database user is empty".to_string()));
        }
        if self.database.dbname.is_empty() {
            return Err(Error::InvalidInput("database name is empty".to_string()));
        }
        if self.dump_file.as_os_str().is_empty() {
            return Err(Error::InvalidInput("dump file path is empty".to_string()));
        }

        Ok(())
    }

    /// Builds the clone request described by this configuration.
    #[must_use]
    pub fn request(&self) -> CloneRequest {
        CloneRequest {
            template: self.template_name.clone(),
            target: self.new_graph_name.clone(),
            dump_file: self.dump_file.clone(),
            rollback: self.rollback,
        }
    }
}

/// Parses a TCP port, rejecting zero.
fn parse_port(raw: &str) -> Option<u16> {
    raw.trim().parse::<u16>().ok().filter(|p| *p > 0)
}

/// Checks a graph name against PostgreSQL identifier limits.
fn validate_graph_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput(format!("{what} name is empty")));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::InvalidInput(format!(
            "{what} name '{name}' is longer than {MAX_IDENTIFIER_LEN} bytes"
        )));
    }
    if name.contains('\0') {
        return Err(Error::InvalidInput(format!(
            "{what} name contains a NUL byte"
        )));
    }
    Ok(())
}
