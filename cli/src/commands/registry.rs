// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Registry inspection commands

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use colony_core::application::RegistryArtifact;
use colony_core::domain::config::CoordinatorConfigManifest;

#[derive(Subcommand)]
pub enum RegistryCommand {
    /// List registry entries
    List {
        /// Only agents declaring this capability
        #[arg(long)]
        capability: Option<String>,

        /// Print the raw artifact as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: RegistryCommand, config_path: Option<PathBuf>) -> Result<()> {
    let config = CoordinatorConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    let registry_file = config.spec.paths.resolve().registry_file;

    match command {
        RegistryCommand::List { capability, json } => {
            if !registry_file.exists() {
                println!(
                    "{}",
                    format!("No registry at {} (has the coordinator run?)", registry_file.display())
                        .yellow()
                );
                return Ok(());
            }

            let artifact = RegistryArtifact::read_from(&registry_file)
                .await
                .with_context(|| format!("Failed to read {}", registry_file.display()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&artifact)?);
                return Ok(());
            }

            let entries: Vec<_> = artifact
                .agents
                .iter()
                .filter(|e| capability.as_deref().map_or(true, |c| e.capabilities.contains(c)))
                .collect();

            println!(
                "{} agents (updated {})",
                entries.len(),
                artifact.updated_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!("{:<20} {:<8} {:<9} {}", "NAME", "KIND", "STATUS", "CAPABILITIES");
            for entry in entries {
                let status = if entry.is_active() {
                    entry.status.to_string().green()
                } else {
                    entry.status.to_string().dimmed()
                };
                println!(
                    "{:<20} {:<8} {:<9} {}",
                    entry.name.bold(),
                    entry.kind,
                    status,
                    entry.capabilities.iter().cloned().collect::<Vec<_>>().join(", ")
                );
            }
            Ok(())
        }
    }
}
