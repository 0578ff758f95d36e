//! `pairsync store status` and `pairsync store ingest <files...>`

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use pairsync_core::config;
use pairsync_core::content::ContentResolver;
use pairsync_sync::FileContentStore;

use super::home_dir;

#[derive(Subcommand, Debug)]
pub enum StoreCommand {
    /// Summarize the store manifest and report records whose file is gone.
    Status(StatusArgs),

    /// Copy files into the store under their SHA-256 digest.
    Ingest(IngestArgs),
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Store directory. Defaults to the configured store root.
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Files to add.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Store directory. Defaults to the configured store root.
    #[arg(long)]
    pub root: Option<PathBuf>,
}

#[derive(Tabled)]
struct IngestRow {
    #[tabled(rename = "hash")]
    hash: String,
    #[tabled(rename = "file")]
    file: String,
}

pub fn run(cmd: StoreCommand) -> Result<()> {
    match cmd {
        StoreCommand::Status(args) => status(args),
        StoreCommand::Ingest(args) => ingest(args),
    }
}

fn open_store(root: Option<PathBuf>) -> Result<FileContentStore> {
    let root = match root {
        Some(root) => root,
        None => {
            let home = home_dir()?;
            let config = config::load_at(&home).context("failed to load config")?;
            config.store_root_at(&home)
        }
    };
    FileContentStore::open(&root)
        .with_context(|| format!("cannot open content store at '{}'", root.display()))
}

fn status(args: StatusArgs) -> Result<()> {
    let store = open_store(args.root)?;
    let status = store.status();

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).context("failed to serialize store status")?
        );
        return Ok(());
    }

    println!("Store:    {}", status.root.display());
    println!("Records:  {}", status.records);
    println!("Updated:  {}", format_age(status.updated_at));
    if status.missing.is_empty() {
        println!("{}", "All records present.".green());
        return Ok(());
    }
    println!(
        "{}",
        format!("{} record(s) point at missing files:", status.missing.len()).yellow()
    );
    for hash in &status.missing {
        println!("  {hash}");
    }
    Ok(())
}

fn ingest(args: IngestArgs) -> Result<()> {
    let store = open_store(args.root)?;

    let mut rows = Vec::new();
    for file in &args.files {
        let record = store
            .ingest(file)
            .with_context(|| format!("failed to ingest '{}'", file.display()))?;
        rows.push(IngestRow {
            hash: record.hash.0,
            file: file.display().to_string(),
        });
    }
    store
        .persist_manifest()
        .context("failed to write store manifest")?;

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!(
        "✓ Ingested {} file(s) into {}",
        args.files.len(),
        store.root().display()
    );
    Ok(())
}

fn format_age(at: DateTime<Utc>) -> String {
    let seconds = Utc::now().signed_duration_since(at).num_seconds().max(0);
    let age = match seconds {
        0..=59 => "just now".to_string(),
        60..=3_599 => format!("{}m ago", seconds / 60),
        3_600..=86_399 => format!("{}h ago", seconds / 3_600),
        _ => format!("{}d ago", seconds / 86_400),
    };
    format!("{} ({age})", at.to_rfc3339())
}
