// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Offline agent commands
//!
//! These operate directly on the state directory and agent sandboxes. A
//! running coordinator picks the changes up the next time it starts.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use colony_core::application::{AgentLifecycleService, CreateAgentRequest, StandardAgentLifecycleService};
use colony_core::domain::agent::{AgentKind, AgentState};
use colony_core::domain::config::CoordinatorConfigManifest;
use colony_core::domain::sandbox::{SandboxError, SandboxProvisioner};
use colony_core::infrastructure::repositories::FileAgentStateRepository;
use colony_core::infrastructure::{EventBus, LocalSandboxProvisioner};

#[derive(Subcommand)]
pub enum AgentCommand {
    /// List agent records
    List,

    /// Show one agent record (YAML)
    Show {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Create an agent record and its sandbox
    Create {
        /// Agent kind (general, gateway)
        #[arg(short, long, default_value = "general")]
        kind: AgentKind,

        /// Explicit name (default: next free name for the kind)
        #[arg(short, long)]
        name: Option<String>,

        /// Declared capability (repeatable)
        #[arg(long = "capability", value_name = "CAPABILITY")]
        capabilities: Vec<String>,
    },

    /// Delete an agent record and its sandbox
    Remove {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Mark an agent dormant so the coordinator leaves it inactive
    Sleep {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Clear an agent's dormant flag
    Wake {
        #[arg(value_name = "NAME")]
        name: String,
    },
}

struct Offline {
    lifecycle: StandardAgentLifecycleService,
    provisioner: LocalSandboxProvisioner,
}

impl Offline {
    fn open(config_path: Option<PathBuf>) -> Result<Self> {
        let config = CoordinatorConfigManifest::load_or_default(config_path)
            .context("Failed to load configuration")?;
        let paths = config.spec.paths.resolve();

        let repository = Arc::new(FileAgentStateRepository::new(paths.state_dir));
        Ok(Self {
            lifecycle: StandardAgentLifecycleService::new(repository, EventBus::with_default_capacity()),
            provisioner: LocalSandboxProvisioner::new(paths.agents_dir)
                .context("Failed to open agents directory")?,
        })
    }
}

pub async fn handle_command(command: AgentCommand, config_path: Option<PathBuf>) -> Result<()> {
    let offline = Offline::open(config_path)?;

    match command {
        AgentCommand::List => list_agents(&offline).await,
        AgentCommand::Show { name } => show_agent(&offline, &name).await,
        AgentCommand::Create { kind, name, capabilities } => {
            create_agent(&offline, kind, name, capabilities).await
        }
        AgentCommand::Remove { name } => remove_agent(&offline, &name).await,
        AgentCommand::Sleep { name } => set_dormant(&offline, &name, true).await,
        AgentCommand::Wake { name } => set_dormant(&offline, &name, false).await,
    }
}

async fn list_agents(offline: &Offline) -> Result<()> {
    let agents = offline.lifecycle.load_all().await?;

    if agents.is_empty() {
        println!("{}", "No agents found".yellow());
        return Ok(());
    }

    println!("{} agents found:", agents.len());
    println!(
        "{:<20} {:<8} {:<8} {:>11} {:>10} {}",
        "NAME", "KIND", "STATE", "ACTIVATIONS", "UPTIME", "LAST ACTIVE"
    );

    for agent in agents {
        println!(
            "{:<20} {:<8} {:<8} {:>11} {:>10} {}",
            agent.name().bold(),
            agent.kind(),
            state_label(&agent),
            agent.activation_count,
            format!("{}s", agent.total_uptime.as_secs()),
            agent
                .last_active
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string())
        );
    }

    Ok(())
}

fn state_label(agent: &AgentState) -> String {
    if agent.dormant {
        "dormant".dimmed().to_string()
    } else {
        "awake".green().to_string()
    }
}

async fn show_agent(offline: &Offline, name: &str) -> Result<()> {
    let agent = offline
        .lifecycle
        .get(name)
        .await?
        .with_context(|| format!("Agent '{}' not found", name))?;

    println!("{}", serde_yaml::to_string(&agent)?);
    Ok(())
}

async fn create_agent(
    offline: &Offline,
    kind: AgentKind,
    name: Option<String>,
    capabilities: Vec<String>,
) -> Result<()> {
    // Seed the name allocator from existing records.
    offline.lifecycle.load_all().await?;

    let mut request = CreateAgentRequest::new(kind);
    if let Some(name) = name {
        request = request.named(name);
    }
    for capability in capabilities {
        request = request.with_capability(capability);
    }

    let agent = offline.lifecycle.create(request).await?;
    if let Err(e) = offline.provisioner.provision(agent.name(), kind).await {
        offline.lifecycle.delete(agent.name()).await?;
        return Err(e).context("Failed to provision sandbox");
    }

    let paths = offline.provisioner.paths(agent.name());
    println!(
        "{}",
        format!("✓ Agent created: {} ({})", agent.name(), agent.kind()).green()
    );
    println!("  Home: {}", paths.home.display());
    println!("  Channel: {}", paths.channel.display());
    Ok(())
}

async fn remove_agent(offline: &Offline, name: &str) -> Result<()> {
    offline.lifecycle.delete(name).await?;
    match offline.provisioner.teardown(name).await {
        Ok(()) | Err(SandboxError::NotFound(_)) => {}
        Err(e) => return Err(e).context("Failed to remove sandbox"),
    }

    println!("{}", format!("✓ Agent removed: {}", name).green());
    Ok(())
}

async fn set_dormant(offline: &Offline, name: &str, dormant: bool) -> Result<()> {
    let agent = offline.lifecycle.set_dormant(name, dormant).await?;
    println!(
        "{}",
        format!("✓ {} is now {}", agent.name(), if dormant { "dormant" } else { "awake" }).green()
    );
    Ok(())
}
