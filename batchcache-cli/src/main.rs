//! BatchCache CLI - Command-line interface
//!
//! Scans a dataset directory into a batch tree and drives the prefetching
//! caches over it.

mod commands;
mod error;
mod image_source;
mod scan;

use std::path::PathBuf;

use batchcache::logging::init_logging;
use clap::{Parser, Subcommand};
use tracing::debug;

use commands::common::CommandContext;
use commands::config::ConfigCommands;
use commands::run::RunArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "batchcache", version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: <config dir>/batchcache/config.ini)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Dataset root directory (overrides dataset.root)
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Also write logs to this file (overrides logging.file)
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the batch tree of the dataset
    Tree,

    /// Show which leaf batch a global packet index belongs to
    Resolve {
        /// Global packet index
        index: usize,
    },

    /// Read every packet through the prefetch caches and report statistics
    Run(RunArgs),

    /// View and change configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let ctx = CommandContext::load(cli.config.as_deref(), cli.root.as_deref())?;

    let mut logging = ctx.config.logging_config().with_verbosity(cli.verbose);
    if let Some(path) = &cli.log_file {
        logging = logging.with_file(path);
    }
    let _guard = init_logging(&logging)?;
    debug!(config = %ctx.config_path.display(), "Configuration loaded");

    match cli.command {
        Commands::Tree => commands::tree::run(&ctx),
        Commands::Resolve { index } => commands::resolve::run(&ctx, index),
        Commands::Run(args) => commands::run::run(&ctx, args),
        Commands::Config { command } => commands::config::run(&ctx, command),
    }
}
