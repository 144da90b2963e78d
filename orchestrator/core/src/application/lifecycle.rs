// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

use crate::application::agent::{AgentLifecycleService, CreateAgentRequest, LifecycleError};
use crate::domain::agent::{AgentIdentity, AgentState};
use crate::domain::events::AgentLifecycleEvent;
use crate::domain::naming::{validate_agent_name, NameAllocator};
use crate::domain::repository::{AgentStateRepository, RepositoryError};
use crate::infrastructure::event_bus::EventBus;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct StandardAgentLifecycleService {
    repository: Arc<dyn AgentStateRepository>,
    /// Also serializes every read-modify-write of a record.
    names: Mutex<NameAllocator>,
    event_bus: EventBus,
}

impl StandardAgentLifecycleService {
    pub fn new(repository: Arc<dyn AgentStateRepository>, event_bus: EventBus) -> Self {
        Self {
            repository,
            names: Mutex::new(NameAllocator::new()),
            event_bus,
        }
    }

    async fn require(&self, name: &str) -> Result<AgentState, LifecycleError> {
        self.repository
            .find_by_name(name)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))
    }

    /// Read, mutate and rewrite one record while holding the mutation lock.
    async fn update<F>(&self, name: &str, mutate: F) -> Result<AgentState, LifecycleError>
    where
        F: FnOnce(&mut AgentState) + Send,
    {
        let _guard = self.names.lock().await;
        let mut state = self.require(name).await?;
        mutate(&mut state);
        self.repository.save(&state).await?;
        Ok(state)
    }
}

#[async_trait]
impl AgentLifecycleService for StandardAgentLifecycleService {
    async fn create(&self, request: CreateAgentRequest) -> Result<AgentState, LifecycleError> {
        let mut names = self.names.lock().await;

        let name = match request.name {
            Some(name) => {
                validate_agent_name(&name)?;
                match self.repository.find_by_name(&name).await {
                    Ok(None) => {}
                    Ok(Some(_)) | Err(RepositoryError::CorruptState { .. }) => {
                        names.reserve(&name).ok();
                        return Err(LifecycleError::AlreadyExists(name));
                    }
                    Err(e) => return Err(e.into()),
                }
                names.reserve(&name)?;
                name
            }
            None => loop {
                // Skip names whose record exists on disk but was never loaded,
                // including records that no longer parse.
                let candidate = names.allocate(request.kind);
                match self.repository.find_by_name(&candidate).await {
                    Ok(None) => break candidate,
                    Ok(Some(_)) | Err(RepositoryError::CorruptState { .. }) => continue,
                    Err(e) => {
                        names.release(&candidate);
                        return Err(e.into());
                    }
                }
            },
        };

        let identity =
            AgentIdentity::new(name.clone(), request.kind).with_capabilities(request.capabilities);
        let state = AgentState::new(identity, request.config, Utc::now());

        if let Err(e) = self.repository.save(&state).await {
            names.release(&name);
            return Err(e.into());
        }

        info!(agent = %name, kind = %state.kind(), "Agent created");
        self.event_bus.publish_agent_event(AgentLifecycleEvent::AgentCreated {
            name,
            kind: state.kind(),
            created_at: state.created_at,
        });
        Ok(state)
    }

    async fn get(&self, name: &str) -> Result<Option<AgentState>, LifecycleError> {
        Ok(self.repository.find_by_name(name).await?)
    }

    async fn list(&self) -> Result<Vec<AgentState>, LifecycleError> {
        Ok(self.repository.load_all().await?.states)
    }

    async fn record_activation(&self, name: &str) -> Result<AgentState, LifecycleError> {
        let now = Utc::now();
        let state = self
            .update(name, |state| state.record_activation(now))
            .await?;

        self.event_bus.publish_agent_event(AgentLifecycleEvent::AgentActivated {
            name: name.to_string(),
            activation_count: state.activation_count,
            activated_at: now,
        });
        Ok(state)
    }

    async fn record_deactivation(
        &self,
        name: &str,
        session_uptime: Duration,
    ) -> Result<AgentState, LifecycleError> {
        let state = self
            .update(name, |state| state.record_deactivation(session_uptime))
            .await?;

        self.event_bus.publish_agent_event(AgentLifecycleEvent::AgentDeactivated {
            name: name.to_string(),
            session_uptime,
            deactivated_at: Utc::now(),
        });
        Ok(state)
    }

    async fn save_snapshot(&self, name: &str, blob: Vec<u8>) -> Result<(), LifecycleError> {
        self.update(name, |state| state.save_snapshot(blob)).await?;
        Ok(())
    }

    async fn set_dormant(&self, name: &str, dormant: bool) -> Result<AgentState, LifecycleError> {
        self.update(name, |state| state.dormant = dormant).await
    }

    async fn delete(&self, name: &str) -> Result<(), LifecycleError> {
        let mut names = self.names.lock().await;
        self.repository.delete(name).await?;
        names.release(name);

        info!(agent = %name, "Agent record deleted");
        self.event_bus.publish_agent_event(AgentLifecycleEvent::AgentRemoved {
            name: name.to_string(),
            removed_at: Utc::now(),
        });
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<AgentState>, LifecycleError> {
        let report = self.repository.load_all().await?;

        for corrupt in &report.corrupt {
            warn!(path = %corrupt.path.display(), reason = %corrupt.reason, "Agent state skipped during recovery");
            self.event_bus.publish_agent_event(AgentLifecycleEvent::StateRecordSkipped {
                path: corrupt.path.display().to_string(),
                reason: corrupt.reason.clone(),
            });
        }

        let mut names = self.names.lock().await;
        for state in &report.states {
            // Already-used means a create in this process got there first.
            names.reserve(state.name()).ok();
        }
        // A corrupt record still owns its name until someone removes the file.
        for corrupt in &report.corrupt {
            if let Some(stem) = corrupt.path.file_stem().and_then(|s| s.to_str()) {
                if validate_agent_name(stem).is_ok() {
                    names.reserve(stem).ok();
                }
            }
        }

        info!(
            recovered = report.states.len(),
            skipped = report.corrupt.len(),
            "Lifecycle records loaded"
        );
        Ok(report.states)
    }
}
