//! TableKeeper server and command-line tool.
//!
//! Provisions and repairs allow-listed tables on request. The `serve`
//! subcommand exposes the HTTP endpoint; the other subcommands run the same
//! engine from a terminal.
//!
//! # Security Guarantees
//! - Only allow-listed tables are created or altered
//! - Database credentials are redacted in logs
//! - Secrets are never logged

mod server;
mod ws;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};
use tablekeeper_core::{
    ConfigProvider, EnvConfigProvider, FileConfigProvider, ReconcileRequest, ReconcileStatus,
    Reconciler,
    adapters::{DatabaseAdapter, create_adapter},
    error::redact_database_url,
    logging::{LogFormat, init_logging},
};
use tracing::{error, info, warn};

use crate::server::{AppState, ServerOptions};
use crate::ws::EventHub;

#[derive(Parser)]
#[command(name = "tablekeeper")]
#[command(about = "Schema reconciliation for allow-listed tables")]
#[command(version)]
#[command(long_about = "
TableKeeper - schema reconciliation for allow-listed tables

Creates missing tables and appends missing columns according to a
configured canonical layout. Tables whose column order has drifted are
reported and left untouched. Denials and failures are written to an
audit table.

SUPPORTED DATABASES:
- SQLite (sqlite:// or .db/.sqlite files)
- SQL Server (mssql://) [if compiled with --features mssql]

CONFIGURATION:
  --config FILE          JSON configuration file
  (otherwise)            SCHEMA_SECRET, TABLE_<n>, COLUMN_<TABLE>_<n>,
                         AUDIT_TABLE, AUDIT_COLUMN_<n> environment variables
  ./.env                 loaded at startup; existing variables win

EXAMPLES:
  tablekeeper --database-url sqlite://./app.db serve --bind 0.0.0.0:5001
  tablekeeper --config tables.json plan Chamados
  TABLEKEEPER_SECRET=... tablekeeper reconcile Chamados Historico
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    quiet: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Text)]
    log_format: LogFormatArg,

    /// Database connection URL
    #[arg(
        long,
        global = true,
        env = "DATABASE_URL",
        hide_env_values = true,
        help = "Database connection string (credentials will be sanitized in logs)"
    )]
    database_url: Option<String>,

    /// JSON configuration file
    #[arg(
        long,
        global = true,
        env = "TABLEKEEPER_CONFIG",
        help = "JSON configuration file (defaults to environment variables)"
    )]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP and WebSocket server
    Serve(ServeArgs),
    /// Reconcile tables once and print the outcome
    Reconcile(ReconcileArgs),
    /// Show what would change without touching the database
    Plan(PlanArgs),
    /// Load and validate the configuration
    CheckConfig,
    /// Test database connection
    Test,
}

#[derive(Args)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "TABLEKEEPER_BIND", default_value = "0.0.0.0:5001")]
    bind: SocketAddr,

    /// Allowed CORS origin
    #[arg(long, env = "TABLEKEEPER_CORS_ORIGIN")]
    cors_origin: Option<String>,

    /// Directory served for unmatched paths
    #[arg(long, env = "TABLEKEEPER_STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// Events buffered per WebSocket client
    #[arg(long, default_value = "256")]
    event_capacity: usize,
}

#[derive(Args)]
struct ReconcileArgs {
    /// Tables to reconcile, in order
    #[arg(required = true)]
    tables: Vec<String>,

    /// Shared secret
    #[arg(long, env = "TABLEKEEPER_SECRET", hide_env_values = true)]
    secret: String,
}

#[derive(Args)]
struct PlanArgs {
    /// Tables to plan
    #[arg(required = true)]
    tables: Vec<String>,
}

/// Environment file read at startup when present.
const ENV_FILE: &str = ".env";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // before parsing, so DATABASE_URL and friends can come from the file
    let env_file = load_env_file(Path::new(ENV_FILE));
    let cli = Cli::parse();

    init_logging(
        cli.global.verbose,
        cli.global.quiet,
        cli.global.log_format.into(),
    )?;

    match env_file {
        Ok(true) => info!("Loaded environment from {}", ENV_FILE),
        Ok(false) => {}
        Err(e) => warn!("Ignoring {}: {}", ENV_FILE, e),
    }

    let provider = config_provider(&cli.global);

    match cli.command {
        Command::CheckConfig => check_config(provider.as_ref()),
        Command::Test => {
            let adapter = connect(&cli.global).await?;
            adapter.test_connection().await.map_err(|e| {
                error!("Connection test failed: {}", e);
                e
            })?;
            info!("Connection test successful");
            println!("Connection to {} database successful", adapter.database_type());
            Ok(())
        }
        Command::Plan(args) => {
            let adapter = connect(&cli.global).await?;
            let reconciler = Reconciler::new(Arc::from(adapter), provider);
            let plans = reconciler.plan_tables(&args.tables).await?;
            println!("{}", serde_json::to_string_pretty(&plans)?);
            Ok(())
        }
        Command::Reconcile(args) => {
            let adapter = connect(&cli.global).await?;
            let reconciler = Reconciler::new(Arc::from(adapter), provider);
            let outcome = reconciler
                .reconcile(&ReconcileRequest::new(args.secret, args.tables))
                .await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            match outcome.status {
                ReconcileStatus::Done => Ok(()),
                ReconcileStatus::Denied => std::process::exit(2),
                ReconcileStatus::Failed => std::process::exit(1),
            }
        }
        Command::Serve(args) => {
            let adapter = connect(&cli.global).await?;
            let events = EventHub::new(args.event_capacity);
            let reconciler = Reconciler::new(Arc::from(adapter), provider)
                .with_notifier(Arc::new(events.clone()));
            let state = AppState {
                reconciler: Arc::new(reconciler),
                events,
            };
            let options = ServerOptions {
                cors_origin: args.cors_origin,
                static_dir: args.static_dir,
            };
            let app = server::router(state, &options)?;
            server::serve(args.bind, app).await
        }
    }
}

/// Loads `path` into the process environment without overriding variables
/// that are already set.
///
/// Returns `Ok(false)` when the file does not exist.
fn load_env_file(path: &Path) -> Result<bool, dotenvy::Error> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

fn config_provider(global: &GlobalArgs) -> Arc<dyn ConfigProvider> {
    let provider: Arc<dyn ConfigProvider> = match &global.config {
        Some(path) => Arc::new(FileConfigProvider::new(path)),
        None => Arc::new(EnvConfigProvider),
    };
    info!(source = %provider.describe(), "Using configuration");
    provider
}

async fn connect(global: &GlobalArgs) -> anyhow::Result<Box<dyn DatabaseAdapter>> {
    let Some(database_url) = &global.database_url else {
        bail!("Database URL is required (--database-url or DATABASE_URL)");
    };

    info!("Target: {}", redact_database_url(database_url));
    let adapter = create_adapter(database_url)
        .await
        .context("Failed to create database adapter")?;
    info!("Created {} adapter", adapter.database_type());
    Ok(adapter)
}

fn check_config(provider: &dyn ConfigProvider) -> anyhow::Result<()> {
    let config = provider
        .snapshot()
        .with_context(|| format!("Invalid configuration from {}", provider.describe()))?;

    println!("Configuration from {} is valid", provider.describe());
    for table in config.tables() {
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| {
                if c.is_configured() {
                    format!("{}:{}", c.position, c.name)
                } else {
                    format!("{}:<missing {}>", c.position, c.config_reference(&table.name))
                }
            })
            .collect();
        println!("  table {} [{}]", table.name, columns.join(", "));
    }
    match config.audit() {
        Some(audit) => println!(
            "  audit {} ({} columns)",
            audit.table,
            audit.columns.len()
        ),
        None => println!("  audit table not configured"),
    }
    Ok(())
}
