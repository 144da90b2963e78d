// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Local Filesystem Sandbox Provisioner
//!
//! Creates each agent's home tree directly under `agents_dir` for single-host
//! deployments and tests. Process isolation is someone else's concern; this
//! provider only guarantees that the paths the monitor and router expect
//! exist before an agent is watched or routed.

use crate::domain::agent::AgentKind;
use crate::domain::channel::idle_sentinel;
use crate::domain::naming::validate_agent_name;
use crate::domain::sandbox::{AgentPaths, SandboxError, SandboxProvisioner};
use crate::infrastructure::atomic_file::write_atomic;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Local filesystem sandbox provisioner
pub struct LocalSandboxProvisioner {
    /// Parent of every agent home (e.g. "~/.colony/agents")
    agents_dir: PathBuf,
}

impl LocalSandboxProvisioner {
    /// Create the provisioner, making sure `agents_dir` exists and is writable.
    pub fn new(agents_dir: impl Into<PathBuf>) -> Result<Self, SandboxError> {
        let agents_dir = agents_dir.into();

        std::fs::create_dir_all(&agents_dir).map_err(|e| {
            SandboxError::Io(format!(
                "Failed to create agents directory {}: {}",
                agents_dir.display(),
                e
            ))
        })?;

        let test_file = agents_dir.join(".colony-write-test");
        std::fs::write(&test_file, b"test").map_err(|e| {
            SandboxError::Io(format!(
                "Agents directory {} is not writable: {}",
                agents_dir.display(),
                e
            ))
        })?;
        std::fs::remove_file(&test_file)
            .map_err(|e| SandboxError::Io(format!("Failed to cleanup test file: {}", e)))?;

        Ok(Self { agents_dir })
    }

    pub fn agents_dir(&self) -> &Path {
        &self.agents_dir
    }

    fn provision_blocking(paths: &AgentPaths, kind: AgentKind) -> Result<(), SandboxError> {
        for dir in paths.directories() {
            std::fs::create_dir_all(dir).map_err(|e| {
                SandboxError::Io(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }

        // An existing channel may hold a pending request from before a restart.
        if !paths.channel.exists() {
            write_atomic(&paths.channel, idle_sentinel(kind).as_bytes()).map_err(|e| {
                SandboxError::Io(format!(
                    "Failed to seed channel {}: {}",
                    paths.channel.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl SandboxProvisioner for LocalSandboxProvisioner {
    async fn provision(&self, name: &str, kind: AgentKind) -> Result<AgentPaths, SandboxError> {
        validate_agent_name(name).map_err(|e| SandboxError::InvalidName(e.to_string()))?;

        let paths = self.paths(name);
        let task_paths = paths.clone();
        tokio::task::spawn_blocking(move || Self::provision_blocking(&task_paths, kind))
            .await
            .map_err(|e| SandboxError::Io(format!("provisioning task failed: {}", e)))??;

        debug!(agent = %name, home = %paths.home.display(), "Sandbox provisioned");
        Ok(paths)
    }

    async fn teardown(&self, name: &str) -> Result<(), SandboxError> {
        validate_agent_name(name).map_err(|e| SandboxError::InvalidName(e.to_string()))?;

        let home = self.paths(name).home;
        if !home.exists() {
            return Err(SandboxError::NotFound(name.to_string()));
        }

        tokio::fs::remove_dir_all(&home).await.map_err(|e| {
            SandboxError::Io(format!("Failed to remove {}: {}", home.display(), e))
        })?;
        debug!(agent = %name, "Sandbox removed");
        Ok(())
    }

    fn paths(&self, name: &str) -> AgentPaths {
        AgentPaths::for_agent(&self.agents_dir, name)
    }
}
