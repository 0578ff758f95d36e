//! `pairsync diff <old> <new>`: classify the changes between two snapshot files.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use pairsync_core::types::ContentHash;
use pairsync_sync::{diff, load_snapshot, CategoryReport, ChangeOptions};

/// Arguments for `pairsync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Snapshot currently applied (JSON).
    pub old: PathBuf,

    /// Snapshot to apply next (JSON).
    pub new: PathBuf,

    /// Re-raise every present payload, as a forced re-apply would.
    #[arg(long)]
    pub forced: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct DiffJson<'a> {
    old_hash: &'a ContentHash,
    new_hash: &'a ContentHash,
    identical: bool,
    categories: &'a [CategoryReport],
}

#[derive(Tabled)]
struct DiffRow {
    #[tabled(rename = "category")]
    category: String,
    #[tabled(rename = "changes")]
    changes: String,
    #[tabled(rename = "redraw")]
    redraw: String,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let old = load_snapshot(&self.old)
            .with_context(|| format!("cannot load snapshot '{}'", self.old.display()))?;
        let new = load_snapshot(&self.new)
            .with_context(|| format!("cannot load snapshot '{}'", self.new.display()))?;

        let identical = old.aggregate_hash() == new.aggregate_hash();
        let options = if self.forced {
            ChangeOptions::forced()
        } else {
            ChangeOptions::default()
        };
        let categories = diff::report(&diff::compute(Some(&old), &new, options));

        if self.json {
            let payload = DiffJson {
                old_hash: old.aggregate_hash(),
                new_hash: new.aggregate_hash(),
                identical,
                categories: &categories,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize diff JSON")?
            );
            return Ok(());
        }

        if identical && !self.forced {
            println!("Snapshots are identical ({}).", short_hash(new.aggregate_hash()));
            return Ok(());
        }
        if categories.is_empty() {
            println!("No changes.");
            return Ok(());
        }

        let rows: Vec<DiffRow> = categories
            .iter()
            .map(|report| DiffRow {
                category: report.kind.to_string(),
                changes: report
                    .changes
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
                redraw: if report.needs_redraw {
                    "yes".yellow().to_string()
                } else {
                    "no".to_string()
                },
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!(
            "{} → {}",
            short_hash(old.aggregate_hash()).bright_black(),
            short_hash(new.aggregate_hash()).bold()
        );
        println!("{table}");
        Ok(())
    }
}

fn short_hash(hash: &ContentHash) -> String {
    hash.0.chars().take(12).collect()
}
