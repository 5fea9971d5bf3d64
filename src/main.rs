//! Binary entry point for ag-clone-graph.
//!
//! Clones an `AgensGraph` graph into a new graph on the same database.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use ag_clone_graph::config::CliOverrides;
use ag_clone_graph::observability;
use ag_clone_graph::{CloneConfig, GraphCloner};
use clap::Parser;
use secrecy::SecretString;
use std::path::PathBuf;
use std::process::ExitCode;

/// Clone an `AgensGraph` graph (schema plus catalog metadata) into a new graph.
#[derive(Parser)]
#[command(name = "ag-clone-graph")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database user.
    #[arg(long = "dbu")]
    user: Option<String>,

    /// Database password.
    #[arg(long = "dbpsw")]
    password: Option<String>,

    /// Database name.
    #[arg(long = "dbn")]
    dbname: Option<String>,

    /// Database host.
    #[arg(long = "dbh")]
    host: Option<String>,

    /// Database port.
    #[arg(long = "dbport")]
    port: Option<u16>,

    /// Directory holding `pg_dump` and `psql`.
    #[arg(long = "pgpref")]
    pg_prefix: Option<PathBuf>,

    /// Graph to clone.
    #[arg(short, long)]
    template: Option<String>,

    /// Name of the graph to create.
    #[arg(short, long = "new-graph")]
    new_graph: Option<String>,

    /// Intermediate dump file.
    #[arg(long)]
    dump_file: Option<PathBuf>,

    /// PEM root certificate; enables certificate and host name verification.
    #[arg(long)]
    ssl_root_cert: Option<PathBuf>,

    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Leave partial state in place when a step fails.
    #[arg(long)]
    no_rollback: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            user: self.user.clone(),
            password: self.password.clone().map(SecretString::from),
            dbname: self.dbname.clone(),
            host: self.host.clone(),
            port: self.port,
            ssl_root_cert: self.ssl_root_cert.clone(),
            pg_prefix: self.pg_prefix.clone(),
            template: self.template.clone(),
            new_graph: self.new_graph.clone(),
            dump_file: self.dump_file.clone(),
            no_rollback: self.no_rollback,
            verbose: self.verbose,
        }
    }
}

fn load_config(cli: &Cli) -> ag_clone_graph::Result<CloneConfig> {
    let base = match cli.config.as_deref() {
        Some(path) => CloneConfig::load_from_file(path)?,
        None => CloneConfig::default(),
    };

    Ok(base.with_cli_overrides(cli.overrides()))
}

fn main() -> ExitCode {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init_from_env(config.verbose) {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    let config = config.with_env_overrides();
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!(
        template = %config.template_name,
        target = %config.new_graph_name,
        database = %config.database.dbname,
        host = %config.database.host,
        "Cloning graph"
    );

    let result = GraphCloner::connect(&config)
        .and_then(|mut cloner| cloner.clone_graph(&config.request()));

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}
