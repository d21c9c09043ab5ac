//! `cadenza library`: completed artifacts, newest first.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use cadenza_core::Artifact;
use cadenza_daemon::request_library;

use super::home_dir;

#[derive(Args, Debug)]
pub struct LibraryArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct ArtifactRow {
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "title")]
    title: String,
    #[tabled(rename = "length")]
    length: String,
    #[tabled(rename = "model")]
    model: String,
    #[tabled(rename = "created")]
    created: String,
}

impl LibraryArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let data = request_library(&home).context("failed to read library")?;
        let artifacts: Vec<Artifact> =
            serde_json::from_value(data).context("daemon returned malformed library")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&artifacts)
                    .context("failed to serialize library JSON")?
            );
            return Ok(());
        }

        if artifacts.is_empty() {
            println!("Library is empty.");
            return Ok(());
        }

        println!("{} tracks", artifacts.len().to_string().bold());
        let rows: Vec<ArtifactRow> = artifacts
            .iter()
            .map(|artifact| ArtifactRow {
                id: artifact.id.to_string(),
                title: if artifact.is_playable() {
                    artifact.title.clone()
                } else {
                    format!("{} {}", artifact.title, "(no audio)".bright_black())
                },
                length: format_length(artifact.duration_secs),
                model: artifact.model_name.clone(),
                created: artifact.created_at.format("%Y-%m-%d %H:%M").to_string(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

/// `m:ss`.
fn format_length(secs: f64) -> String {
    let total = secs.round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
