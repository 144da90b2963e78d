// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::agent::{AgentKind, AgentState};
use crate::domain::naming::NamingError;
use crate::domain::repository::RepositoryError;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use thiserror::Error;

/// Input to [`AgentLifecycleService::create`]. Without a name one is allocated.
#[derive(Debug, Clone, Default)]
pub struct CreateAgentRequest {
    pub name: Option<String>,
    pub kind: AgentKind,
    pub capabilities: BTreeSet<String>,
    pub config: BTreeMap<String, serde_json::Value>,
}

impl CreateAgentRequest {
    pub fn new(kind: AgentKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Agent not found: {0}")]
    NotFound(String),

    #[error("Agent already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid agent name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for LifecycleError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(name) => LifecycleError::NotFound(name),
            RepositoryError::AlreadyExists(name) => LifecycleError::AlreadyExists(name),
            other => LifecycleError::Repository(other),
        }
    }
}

impl From<NamingError> for LifecycleError {
    fn from(e: NamingError) -> Self {
        match e {
            NamingError::AlreadyExists(name) => LifecycleError::AlreadyExists(name),
            NamingError::InvalidName { name, reason } => LifecycleError::InvalidName { name, reason },
        }
    }
}

/// Persisted lifecycle of every agent: creation, counters, snapshots, removal.
///
/// Each mutation rewrites that agent's record before returning.
#[async_trait]
pub trait AgentLifecycleService: Send + Sync {
    async fn create(&self, request: CreateAgentRequest) -> Result<AgentState, LifecycleError>;
    async fn get(&self, name: &str) -> Result<Option<AgentState>, LifecycleError>;
    async fn list(&self) -> Result<Vec<AgentState>, LifecycleError>;
    async fn record_activation(&self, name: &str) -> Result<AgentState, LifecycleError>;
    async fn record_deactivation(
        &self,
        name: &str,
        session_uptime: Duration,
    ) -> Result<AgentState, LifecycleError>;
    async fn save_snapshot(&self, name: &str, blob: Vec<u8>) -> Result<(), LifecycleError>;
    async fn set_dormant(&self, name: &str, dormant: bool) -> Result<AgentState, LifecycleError>;
    async fn delete(&self, name: &str) -> Result<(), LifecycleError>;

    /// Recover every readable record and seed the name allocator from it.
    async fn load_all(&self) -> Result<Vec<AgentState>, LifecycleError>;
}
