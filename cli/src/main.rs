// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Colony Coordinator CLI
//!
//! The `colony` binary runs the coordinator for a fleet of filesystem agents
//! and inspects its on-disk state.
//!
//! ## Commands
//!
//! - `colony run` - Serve channels and route mail until Ctrl+C/SIGTERM
//! - `colony agent list|show|create|remove|sleep|wake` - Offline lifecycle operations
//! - `colony registry list` - Print the registry artifact
//! - `colony config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use colony::commands::{self, AgentCommand, ConfigCommand, RegistryCommand};
use colony::daemon;

/// Colony - coordinate filesystem agents
#[derive(Parser)]
#[command(name = "colony")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "COLONY_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "COLONY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordinator in the foreground
    #[command(name = "run")]
    Run,

    /// Agent lifecycle records
    #[command(name = "agent")]
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },

    /// Aggregate registry
    #[command(name = "registry")]
    Registry {
        #[command(subcommand)]
        command: RegistryCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Run) => daemon::run_coordinator(cli.config).await,
        Some(Commands::Agent { command }) => commands::agent::handle_command(command, cli.config).await,
        Some(Commands::Registry { command }) => {
            commands::registry::handle_command(command, cli.config).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
