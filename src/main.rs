//! fleetd - process supervisor with nginx config generation.
//!
//! - `fleetd run <manifest>`: start the fleet and supervise it until SIGINT/SIGTERM
//! - `fleetd plan <manifest>`: show which worker lands on which port
//! - `fleetd render <manifest>`: print the generated nginx config
//! - `fleetd check <manifest>`: validate the manifest
//!
//! See `fleetd --help` for full usage information.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use fleetd::logging::{LogConfig, LogFormat, init_logging};

mod commands;

const AFTER_HELP: &str = "\
EXAMPLES:
  fleetd check fleet.json           Validate a manifest
  fleetd plan fleet.json --json     Worker plan as JSON
  fleetd render fleet.json > nginx.conf
  fleetd run fleet.toml             Start and supervise the fleet

The manifest may be JSON or TOML (picked by file extension).";

#[derive(Parser)]
#[command(name = "fleetd")]
#[command(version)]
#[command(about = "Run a fleet of worker processes behind nginx")]
#[command(after_help = AFTER_HELP)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose/debug output for any command
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every worker, keep them alive, and manage the proxy config
    ///
    /// Runs until SIGINT or SIGTERM, then terminates all workers.
    Run {
        /// Path to the manifest
        manifest: PathBuf,
    },
    /// Print the worker plan without starting anything
    Plan {
        /// Path to the manifest
        manifest: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the generated nginx config to stdout
    Render {
        /// Path to the manifest
        manifest: PathBuf,
    },
    /// Validate the manifest and exit
    Check {
        /// Path to the manifest
        manifest: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&LogConfig::for_cli(cli.log_format, cli.verbose));

    match cli.command {
        Commands::Run { manifest } => {
            commands::run::execute(&manifest).await?;
        },
        Commands::Plan { manifest, json } => {
            commands::inspect::plan(&manifest, json)?;
        },
        Commands::Render { manifest } => {
            commands::inspect::render(&manifest)?;
        },
        Commands::Check { manifest } => {
            commands::inspect::check(&manifest)?;
        },
    }

    Ok(())
}
