//! Command-line interface for `snowgeo`, which publishes ServiceNow ticket
//! tables as point feature collections.
//!
//! This binary provides a thin façade over the [`snowgeo_core`] library: it
//! parses arguments, configures logging, loads the connection configuration
//! and delegates to command handlers.
//!
//! # Architecture
//!
//! The CLI is built using [`clap`] for argument parsing and [`tracing`] for structured logging.
//! Library logs emitted through the `log` facade are bridged into `tracing`.
//!
//! # Available Commands
//!
//! - `tables` - List the supported ticket tables
//! - `fields` - Resolve and display the schema of a table
//! - `fetch` - Fetch a table and write its feature collection as JSON

mod display;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

use snowgeo_core::client::ServiceNowClient;
use snowgeo_core::tables::{get_tables, resolve_table};
use snowgeo_core::{FeatureService, ServiceNowConfig, SnowGeoError};

#[derive(Parser)]
#[command(
    name = "snowgeo",
    version,
    about = "Publish ServiceNow tickets as GeoJSON",
    long_about = "snowgeo reads ServiceNow incident and request tables through the Table API\n\
                  and turns located tickets into point feature collections."
)]
/// Command-line arguments and options for the `snowgeo` CLI.
struct Cli {
    /// Enable verbose (INFO level) logging output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug (DEBUG level) logging output with detailed diagnostics.
    #[arg(short, long, global = true)]
    debug: bool,

    /// Path to the ServiceNow configuration file (JSON).
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the `snowgeo` CLI.
#[derive(Subcommand)]
enum Commands {
    /// Lists the supported ticket tables.
    Tables,

    /// Resolves and displays the schema of a ticket table.
    Fields {
        /// Table id (e.g. "incidents", "requests").
        #[arg(short, long, value_name = "TABLE")]
        table: String,
    },

    /// Fetches a ticket table and writes its feature collection.
    ///
    /// The collection is written to standard output unless an output file is given.
    Fetch {
        /// Table id (e.g. "incidents", "requests").
        #[arg(short, long, value_name = "TABLE")]
        table: String,

        /// Path of the output JSON file.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Pretty-print the JSON output.
        #[arg(long)]
        pretty: bool,
    },
}

/// Entry point for the `snowgeo` command-line interface.
///
/// Errors from the engine are reported with their user message and, when
/// available, a recovery suggestion.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity flags
    let log_level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    if let Err(e) = init_logging(log_level) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        },
    }
}

fn init_logging(level: Level) -> Result<()> {
    // Bridge logs from the `log` crate to the `tracing` ecosystem.
    LogTracer::init()?;

    // stdout may carry the collection, so logs go to stderr
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn report(error: &anyhow::Error) {
    match error.downcast_ref::<SnowGeoError>() {
        Some(e) => {
            eprintln!("{}", e.user_message());
            if let Some(suggestion) = e.recovery_suggestion() {
                eprintln!("\n{suggestion}");
            }
        },
        None => eprintln!("Error: {error:#}"),
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Tables => handle_tables(),
        Commands::Fields { table } => {
            info!("Resolving fields of {table}");
            handle_fields(cli.config.as_deref(), &table).await
        },
        Commands::Fetch {
            table,
            output,
            pretty,
        } => {
            info!("Fetching {table}");
            handle_fetch(cli.config.as_deref(), &table, output.as_deref(), pretty).await
        },
    }
}

/// Builds the service from the configuration file.
fn build_service(config: Option<&Path>) -> Result<FeatureService<ServiceNowClient>> {
    let path = config.ok_or_else(|| {
        anyhow!("A configuration file is required for this command (use --config <FILE>).")
    })?;
    let config = ServiceNowConfig::load(path)?;
    let client = ServiceNowClient::new(config.client_settings()?)?;
    Ok(FeatureService::new(Arc::new(client), config.engine_options()))
}

#[allow(clippy::unnecessary_wraps)] // Keeps the handler signatures uniform
fn handle_tables() -> Result<()> {
    display::display_tables(get_tables());
    Ok(())
}

async fn handle_fields(config: Option<&Path>, table: &str) -> Result<()> {
    // unsupported ids fail before any configuration or network access
    resolve_table(table)?;
    let service = build_service(config)?;
    let schema = service.resolve_schema(table).await?;
    display::display_schema(&schema);
    Ok(())
}

async fn handle_fetch(
    config: Option<&Path>,
    table: &str,
    output: Option<&Path>,
    pretty: bool,
) -> Result<()> {
    resolve_table(table)?;
    let service = build_service(config)?;
    let collection = service.get_data(table).await?;
    let json = collection.to_json_string(pretty)?;

    match output {
        Some(path) => {
            fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(
                "Wrote {} feature(s) to {}",
                collection.features.len(),
                path.display()
            );
        },
        None => println!("{json}"),
    }
    Ok(())
}
