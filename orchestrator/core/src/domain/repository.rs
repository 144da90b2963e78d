// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contract for the [`AgentState`] aggregate. The interface is
//! defined here and implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `AgentStateRepository` | `AgentState` | `InMemoryAgentStateRepository`, `FileAgentStateRepository` |
//!
//! ## Storage Backend Abstraction
//!
//! The file backend keeps one record per agent so that updates to different
//! agents never touch the same file. The in-memory backend is used for tests.

use async_trait::async_trait;
use std::path::PathBuf;
use crate::domain::agent::AgentState;

/// Storage backend selection for lifecycle records
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    Files { state_dir: PathBuf },
}

/// A persisted record that could not be decoded during recovery.
#[derive(Debug, Clone)]
pub struct CorruptRecord {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a full recovery scan. Corrupt records are reported, not fatal.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub states: Vec<AgentState>,
    pub corrupt: Vec<CorruptRecord>,
}

/// Repository interface for AgentState aggregates
#[async_trait]
pub trait AgentStateRepository: Send + Sync {
    /// Save state (create or overwrite)
    async fn save(&self, state: &AgentState) -> Result<(), RepositoryError>;

    /// Find state by agent name
    async fn find_by_name(&self, name: &str) -> Result<Option<AgentState>, RepositoryError>;

    /// Read every record, skipping the ones that fail to parse
    async fn load_all(&self) -> Result<LoadReport, RepositoryError>;

    /// Delete state by agent name
    async fn delete(&self, name: &str) -> Result<(), RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    #[error("Corrupt state record {path}: {reason}")]
    CorruptState { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for RepositoryError {
    fn from(e: std::io::Error) -> Self {
        RepositoryError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(e: serde_json::Error) -> Self {
        RepositoryError::Serialization(e.to_string())
    }
}
