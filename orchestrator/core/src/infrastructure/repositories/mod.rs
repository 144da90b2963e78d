// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! This module provides infrastructure implementations of repository abstractions
//! defined in the domain layer, following the Repository pattern from DDD.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve lifecycle records
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **FileAgentStateRepository** - one JSON record per agent, replaced atomically
//! - **InMemoryAgentStateRepository** - thread-safe HashMap-backed storage for tests

pub mod file_state;

pub use file_state::FileAgentStateRepository;

use crate::domain::agent::AgentState;
use crate::domain::repository::{AgentStateRepository, LoadReport, RepositoryError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct InMemoryAgentStateRepository {
    states: Arc<RwLock<HashMap<String, AgentState>>>,
}

impl InMemoryAgentStateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentStateRepository for InMemoryAgentStateRepository {
    async fn save(&self, state: &AgentState) -> Result<(), RepositoryError> {
        self.states
            .write()
            .insert(state.name().to_string(), state.clone());
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<AgentState>, RepositoryError> {
        Ok(self.states.read().get(name).cloned())
    }

    async fn load_all(&self) -> Result<LoadReport, RepositoryError> {
        let mut states: Vec<AgentState> = self.states.read().values().cloned().collect();
        states.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(LoadReport {
            states,
            corrupt: Vec::new(),
        })
    }

    async fn delete(&self, name: &str) -> Result<(), RepositoryError> {
        match self.states.write().remove(name) {
            Some(_) => Ok(()),
            None => Err(RepositoryError::NotFound(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentIdentity, AgentKind};
    use chrono::Utc;
    use std::collections::BTreeMap;

    #[test]
    fn test_in_memory_round_trip() {
        let repo = InMemoryAgentStateRepository::new();
        let state = AgentState::new(
            AgentIdentity::new("Alice", AgentKind::General),
            BTreeMap::new(),
            Utc::now(),
        );

        tokio_test::block_on(repo.save(&state)).unwrap();
        assert_eq!(
            tokio_test::block_on(repo.find_by_name("Alice")).unwrap(),
            Some(state)
        );
        assert_eq!(tokio_test::block_on(repo.load_all()).unwrap().states.len(), 1);

        tokio_test::block_on(repo.delete("Alice")).unwrap();
        assert!(tokio_test::block_on(repo.find_by_name("Alice")).unwrap().is_none());
        assert!(matches!(
            tokio_test::block_on(repo.delete("Alice")),
            Err(RepositoryError::NotFound(_))
        ));
    }
}
