// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Agent Registry
//!
//! Directory of known agents with their kind, status and capabilities. It is
//! derived data: the coordinator rebuilds it from lifecycle records at start.
//!
//! Every mutation rewrites the aggregate artifact file under the registry
//! mutex. Other agents and external tooling read that file directly instead
//! of asking the coordinator. Failing to write it is the one fatal error
//! class here, since the artifact is shared, non-agent-specific state.

use crate::domain::agent::{AgentIdentity, AgentKind, AgentState, AgentStatus};
use crate::infrastructure::atomic_file::write_atomic_async;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    pub kind: AgentKind,
    pub status: AgentStatus,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

impl RegistryEntry {
    pub fn from_identity(identity: &AgentIdentity, status: AgentStatus) -> Self {
        Self {
            name: identity.name.clone(),
            kind: identity.kind,
            status,
            capabilities: identity.capabilities.clone(),
        }
    }

    pub fn identity(&self) -> AgentIdentity {
        AgentIdentity::new(self.name.clone(), self.kind)
            .with_capabilities(self.capabilities.iter().cloned())
    }

    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }
}

/// On-disk registry artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryArtifact {
    pub updated_at: DateTime<Utc>,
    pub agents: Vec<RegistryEntry>,
}

impl RegistryArtifact {
    pub async fn read_from(path: &Path) -> anyhow::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Agent not registered: {0}")]
    NotFound(String),

    #[error("Agent already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Failed to write registry artifact {path}: {source}")]
    ArtifactWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl RegistryError {
    /// Only failures on the shared artifact should stop the coordinator.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RegistryError::ArtifactWrite { .. })
    }
}

pub struct AgentRegistry {
    entries: Mutex<BTreeMap<String, RegistryEntry>>,
    artifact_path: PathBuf,
}

impl AgentRegistry {
    pub fn new(artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            artifact_path: artifact_path.into(),
        }
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// Write `next` to disk, then adopt it. The caller holds the mutex.
    async fn commit(
        &self,
        current: &mut BTreeMap<String, RegistryEntry>,
        next: BTreeMap<String, RegistryEntry>,
    ) -> Result<(), RegistryError> {
        let artifact = RegistryArtifact {
            updated_at: Utc::now(),
            agents: next.values().cloned().collect(),
        };
        let path = self.artifact_path.clone();
        let write_error = |source: std::io::Error| RegistryError::ArtifactWrite {
            path: path.display().to_string(),
            source,
        };

        let bytes = serde_json::to_vec_pretty(&artifact)
            .map_err(|e| write_error(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
        }
        write_atomic_async(path.clone(), bytes)
            .await
            .map_err(write_error)?;

        debug!(agents = artifact.agents.len(), path = %path.display(), "Registry artifact rewritten");
        *current = next;
        Ok(())
    }

    pub async fn register(
        &self,
        identity: &AgentIdentity,
        status: AgentStatus,
    ) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&identity.name) {
            return Err(RegistryError::AlreadyRegistered(identity.name.clone()));
        }

        let mut next = entries.clone();
        next.insert(
            identity.name.clone(),
            RegistryEntry::from_identity(identity, status),
        );
        self.commit(&mut entries, next).await
    }

    pub async fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(name) {
            return Err(RegistryError::NotFound(name.to_string()));
        }

        let mut next = entries.clone();
        next.remove(name);
        self.commit(&mut entries, next).await
    }

    pub async fn set_status(&self, name: &str, status: AgentStatus) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        match next.get_mut(name) {
            Some(entry) if entry.status == status => return Ok(()),
            Some(entry) => entry.status = status,
            None => return Err(RegistryError::NotFound(name.to_string())),
        }
        self.commit(&mut entries, next).await
    }

    /// Mark every entry inactive in a single artifact write.
    pub async fn deactivate_all(&self) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock().await;
        if !entries.values().any(RegistryEntry::is_active) {
            return Ok(());
        }
        let mut next = entries.clone();
        for entry in next.values_mut() {
            entry.status = AgentStatus::Inactive;
        }
        self.commit(&mut entries, next).await
    }

    /// Replace every entry with ones derived from lifecycle records.
    pub async fn rebuild_from<F>(&self, states: &[AgentState], status_of: F) -> Result<(), RegistryError>
    where
        F: Fn(&AgentState) -> AgentStatus,
    {
        let mut entries = self.entries.lock().await;
        let next = states
            .iter()
            .map(|state| {
                (
                    state.name().to_string(),
                    RegistryEntry::from_identity(&state.identity, status_of(state)),
                )
            })
            .collect();
        self.commit(&mut entries, next).await
    }

    /// Names of active agents declaring `capability`, in name order.
    pub async fn find_by_capability(&self, capability: &str) -> Vec<String> {
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| e.is_active() && e.capabilities.contains(capability))
            .map(|e| e.name.clone())
            .collect()
    }

    pub async fn list_by_kind(&self, kind: AgentKind) -> Vec<AgentIdentity> {
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| e.kind == kind)
            .map(RegistryEntry::identity)
            .collect()
    }

    pub async fn get(&self, name: &str) -> Option<RegistryEntry> {
        self.entries.lock().await.get(name).cloned()
    }

    pub async fn list(&self) -> Vec<RegistryEntry> {
        self.entries.lock().await.values().cloned().collect()
    }
}
