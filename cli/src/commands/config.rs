// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use colony_core::domain::config::CoordinatorConfigManifest;

const EXAMPLES_HEADER: &str = "\
# Colony coordinator configuration
#
# spec.paths        every unset path is derived from data_dir (default ~/.colony)
# spec.monitor      strategy: auto | event | poll; intervals are humantime durations
# spec.router       tick_interval: how often outboxes are swept
# spec.channel      response_timeout: agent-side wait limit, unset waits forever
# spec.thinking     command: [program, args...] run once per channel request;
#                   the request arrives on stdin, stdout becomes the response
#
# Environment overrides: COLONY_DATA_DIR, COLONY_MONITOR_STRATEGY
";

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./colony-config.yaml)
        #[arg(short, long, default_value = "./colony-config.yaml")]
        output: PathBuf,

        /// Include explanatory comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(&output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = CoordinatorConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. COLONY_CONFIG_PATH: {}",
            std::env::var("COLONY_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./colony-config.yaml");
        println!("  4. ~/.colony/config.yaml");
        println!("  5. /etc/colony/config.yaml");
        println!();
    }

    let spec = &config.spec;
    let paths = spec.paths.resolve();

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Paths:".bold());
    println!("  Agents:   {}", paths.agents_dir.display());
    println!("  State:    {}", paths.state_dir.display());
    println!("  Registry: {}", paths.registry_file.display());
    println!();

    println!("{}", "Channel monitor:".bold());
    println!("  Strategy: {:?}", spec.monitor.strategy);
    println!("  Busy interval: {:?}", spec.monitor.busy_interval);
    println!("  Idle interval: {:?}", spec.monitor.idle_interval);
    println!();

    println!("{}", "Mailbox router:".bold());
    println!("  Tick interval: {:?}", spec.router.tick_interval);
    println!();

    println!("{}", "Thinking:".bold());
    match &spec.thinking.command {
        Some(command) => println!("  Command: {}", command.join(" ")),
        None => println!("  Command: {}", "(none, requests fail)".dimmed()),
    }
    println!(
        "  Response timeout: {}",
        spec.channel
            .response_timeout
            .map(|t| format!("{:?}", t))
            .unwrap_or_else(|| "(none)".to_string())
    );

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = CoordinatorConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: &Path, with_examples: bool) -> Result<()> {
    let yaml = CoordinatorConfigManifest::default().to_yaml_str()?;
    let sample = if with_examples {
        format!("{}\n{}", EXAMPLES_HEADER, yaml)
    } else {
        yaml
    };

    std::fs::write(output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_generated_config_validates() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("colony-config.yaml");

        generate(&output, true).await.unwrap();

        let config = CoordinatorConfigManifest::from_yaml_file(&output).unwrap();
        config.validate().unwrap();
        assert!(std::fs::read_to_string(&output).unwrap().starts_with("# Colony"));
    }
}
