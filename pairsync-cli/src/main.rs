//! pairsync: offline tooling for snapshots, the content store and configuration.
//!
//! # Usage
//!
//! ```text
//! pairsync diff <old.json> <new.json> [--forced] [--json]
//! pairsync store status [--root DIR] [--json]
//! pairsync store ingest <files...> [--root DIR]
//! pairsync config show
//! pairsync config init [--force]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config::ConfigCommand, diff::DiffArgs, store::StoreCommand};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "pairsync",
    version,
    about = "Inspect visual-state snapshots and manage the local content store",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show which changes applying <new> over <old> would raise.
    Diff(DiffArgs),

    /// Inspect or fill the content store.
    Store {
        #[command(subcommand)]
        command: StoreCommand,
    },

    /// Show or initialize ~/.pairsync/config.yaml.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    pairsync_runtime::init_tracing("warn");
    let cli = Cli::parse();
    match cli.command {
        Commands::Diff(args) => args.run(),
        Commands::Store { command } => commands::store::run(command),
        Commands::Config { command } => commands::config::run(command),
    }
}
