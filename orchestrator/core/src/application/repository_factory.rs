// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations based on storage backend
//! configuration, keeping the domain layer free of infrastructure types.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Select the lifecycle record store

use std::sync::Arc;

use crate::domain::repository::{AgentStateRepository, StorageBackend};
use crate::infrastructure::repositories::{FileAgentStateRepository, InMemoryAgentStateRepository};

/// Creates an AgentStateRepository implementation based on the configured backend
pub fn create_agent_state_repository(backend: &StorageBackend) -> Arc<dyn AgentStateRepository> {
    match backend {
        StorageBackend::InMemory => Arc::new(InMemoryAgentStateRepository::new()),
        StorageBackend::Files { state_dir } => Arc::new(FileAgentStateRepository::new(state_dir.clone())),
    }
}
