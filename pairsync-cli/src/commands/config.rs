//! `pairsync config show` and `pairsync config init`

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use pairsync_core::config::{self, SyncConfig};

use super::home_dir;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration (defaults fill missing fields).
    Show,

    /// Write a config file with every default spelled out.
    Init(InitArgs),
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config file.
    #[arg(long)]
    pub force: bool,
}

pub fn run(cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => show(),
        ConfigCommand::Init(args) => init(args),
    }
}

fn show() -> Result<()> {
    let home = home_dir()?;
    let path = config::config_path_at(&home);
    let config = config::load_at(&home)
        .with_context(|| format!("failed to load '{}'", path.display()))?;

    if path.exists() {
        println!("# {}", path.display());
    } else {
        println!("# {} (not found, showing defaults)", path.display());
    }
    print!(
        "{}",
        serde_yaml::to_string(&config).context("failed to serialize config")?
    );
    Ok(())
}

fn init(args: InitArgs) -> Result<()> {
    let home = home_dir()?;
    let path = config::config_path_at(&home);
    if path.exists() && !args.force {
        bail!(
            "config already exists at {}; pass --force to overwrite",
            path.display()
        );
    }
    let written = config::save_at(&home, &SyncConfig::default())
        .with_context(|| format!("failed to write '{}'", path.display()))?;
    println!("✓ Wrote default config to {}", written.display());
    Ok(())
}
