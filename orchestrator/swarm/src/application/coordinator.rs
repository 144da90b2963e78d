// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Coordinator
//!
//! Owns the agent fleet for one coordinator process: recovers lifecycle
//! records, provisions sandboxes, keeps the registry artifact current, and
//! drives the channel monitor and mailbox router until shutdown.
//!
//! ## Startup
//!
//! 1. Recover every readable lifecycle record (corrupt ones are skipped).
//! 2. Provision each sandbox idempotently; an agent whose sandbox cannot be
//!    provisioned stays out of the active roster.
//! 3. Rebuild the registry. Dormant agents are listed inactive.
//! 4. Record an activation and start watching the channel of every active agent.
//!
//! ## Shutdown
//!
//! Pending channel requests are answered with a cancellation, each session's
//! uptime is added to its agent's record, and the registry is marked inactive.

use crate::application::router::{MailboxRouter, RouteReport, RouterError};
use colony_core::application::agent::{AgentLifecycleService, CreateAgentRequest, LifecycleError};
use colony_core::application::lifecycle::StandardAgentLifecycleService;
use colony_core::application::registry::{AgentRegistry, RegistryError};
use colony_core::application::repository_factory::create_agent_state_repository;
use colony_core::domain::agent::{AgentState, AgentStatus};
use colony_core::domain::channel::{ChannelError, ChannelHandler};
use colony_core::domain::config::CoordinatorConfigSpec;
use colony_core::domain::repository::StorageBackend;
use colony_core::domain::sandbox::{AgentPaths, SandboxError, SandboxProvisioner};
use colony_core::infrastructure::channel::ChannelMonitor;
use colony_core::infrastructure::event_bus::EventBus;
use colony_core::infrastructure::sandbox::LocalSandboxProvisioner;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error("Agent '{0}' is not active")]
    NotActive(String),

    #[error("Agent '{0}' is already active")]
    AlreadyActive(String),
}

impl CoordinatorError {
    /// Failures in shared state that the process cannot continue past.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoordinatorError::Registry(e) if e.is_fatal())
    }
}

/// Result of [`Coordinator::start`].
#[derive(Debug, Clone, Default)]
pub struct StartReport {
    pub active: Vec<String>,
    pub dormant: Vec<String>,
    /// Agents left out of the roster, with the reason.
    pub unavailable: Vec<(String, String)>,
}

pub struct Coordinator {
    lifecycle: Arc<dyn AgentLifecycleService>,
    registry: Arc<AgentRegistry>,
    provisioner: Arc<dyn SandboxProvisioner>,
    monitor: Arc<ChannelMonitor>,
    router: MailboxRouter,
    handler: Arc<dyn ChannelHandler>,
    event_bus: EventBus,
    router_tick: Duration,
    /// Start of the current session per active agent.
    sessions: Mutex<HashMap<String, Instant>>,
}

impl Coordinator {
    pub fn new(
        lifecycle: Arc<dyn AgentLifecycleService>,
        registry: Arc<AgentRegistry>,
        provisioner: Arc<dyn SandboxProvisioner>,
        monitor: Arc<ChannelMonitor>,
        handler: Arc<dyn ChannelHandler>,
        event_bus: EventBus,
        router_tick: Duration,
    ) -> Self {
        let router = MailboxRouter::new(registry.clone(), provisioner.clone(), event_bus.clone());
        Self {
            lifecycle,
            registry,
            provisioner,
            monitor,
            router,
            handler,
            event_bus,
            router_tick,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Wire the file-backed stack described by `spec`.
    pub fn from_config(
        spec: &CoordinatorConfigSpec,
        handler: Arc<dyn ChannelHandler>,
        event_bus: EventBus,
    ) -> Result<Self, CoordinatorError> {
        let paths = spec.paths.resolve();
        let repository = create_agent_state_repository(&StorageBackend::Files {
            state_dir: paths.state_dir,
        });
        let lifecycle = Arc::new(StandardAgentLifecycleService::new(repository, event_bus.clone()));
        let provisioner = Arc::new(LocalSandboxProvisioner::new(paths.agents_dir)?);
        let monitor = Arc::new(ChannelMonitor::new(spec.monitor.clone(), event_bus.clone())?);
        let registry = Arc::new(AgentRegistry::new(paths.registry_file));

        Ok(Self::new(
            lifecycle,
            registry,
            provisioner,
            monitor,
            handler,
            event_bus,
            spec.router.tick_interval,
        ))
    }

    pub fn lifecycle(&self) -> &Arc<dyn AgentLifecycleService> {
        &self.lifecycle
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn monitor(&self) -> &Arc<ChannelMonitor> {
        &self.monitor
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn paths(&self, name: &str) -> AgentPaths {
        self.provisioner.paths(name)
    }

    /// Recover the fleet and begin serving it.
    pub async fn start(&self) -> Result<StartReport, CoordinatorError> {
        let states = self.lifecycle.load_all().await?;
        let mut report = StartReport::default();

        let mut provisioned = Vec::with_capacity(states.len());
        for state in states {
            match self.provisioner.provision(state.name(), state.kind()).await {
                Ok(paths) => provisioned.push((state, paths)),
                Err(e) => {
                    warn!(agent = %state.name(), error = %e, "Sandbox unavailable, agent left out of roster");
                    report.unavailable.push((state.name().to_string(), e.to_string()));
                }
            }
        }

        let roster: Vec<AgentState> = provisioned.iter().map(|(s, _)| s.clone()).collect();
        self.registry
            .rebuild_from(&roster, |s| {
                if s.dormant {
                    AgentStatus::Inactive
                } else {
                    AgentStatus::Active
                }
            })
            .await?;

        for (state, paths) in provisioned {
            let name = state.name().to_string();
            if state.dormant {
                report.dormant.push(name);
                continue;
            }
            match self.activate(&name, &paths).await {
                Ok(()) => report.active.push(name),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(agent = %name, error = %e, "Agent could not be activated");
                    report.unavailable.push((name, e.to_string()));
                }
            }
        }

        info!(
            active = report.active.len(),
            dormant = report.dormant.len(),
            unavailable = report.unavailable.len(),
            "Coordinator started"
        );
        Ok(report)
    }

    /// Begin a session: bump the activation counter and watch the channel.
    async fn activate(&self, name: &str, paths: &AgentPaths) -> Result<(), CoordinatorError> {
        let activated = async {
            self.lifecycle.record_activation(name).await?;
            self.monitor
                .watch(name, paths.channel.clone(), self.handler.clone())?;
            Ok::<_, CoordinatorError>(())
        }
        .await;

        match activated {
            Ok(()) => {
                self.sessions.lock().insert(name.to_string(), Instant::now());
                Ok(())
            }
            Err(e) => {
                self.registry.set_status(name, AgentStatus::Inactive).await?;
                Err(e)
            }
        }
    }

    /// End a session, folding its uptime into the record.
    async fn deactivate(&self, name: &str) -> Result<(), CoordinatorError> {
        self.monitor.unwatch(name);
        let started = self.sessions.lock().remove(name);
        if let Some(started) = started {
            self.lifecycle
                .record_deactivation(name, started.elapsed())
                .await?;
        }
        Ok(())
    }

    /// Create, provision, register and activate a new agent.
    pub async fn create_agent(&self, request: CreateAgentRequest) -> Result<AgentState, CoordinatorError> {
        let state = self.lifecycle.create(request).await?;
        let name = state.name().to_string();

        let paths = match self.provisioner.provision(&name, state.kind()).await {
            Ok(paths) => paths,
            Err(e) => {
                if let Err(cleanup) = self.lifecycle.delete(&name).await {
                    warn!(agent = %name, error = %cleanup, "Failed to discard record of unprovisioned agent");
                }
                return Err(e.into());
            }
        };

        self.registry
            .register(&state.identity, AgentStatus::Active)
            .await?;
        self.activate(&name, &paths).await?;

        info!(agent = %name, kind = %state.kind(), "Agent created");
        Ok(state)
    }

    /// Put an active agent to sleep. It stays dormant across restarts.
    pub async fn sleep_agent(&self, name: &str) -> Result<AgentState, CoordinatorError> {
        match self.registry.get(name).await {
            Some(entry) if entry.is_active() => {}
            Some(_) => return Err(CoordinatorError::NotActive(name.to_string())),
            None => return Err(RegistryError::NotFound(name.to_string()).into()),
        }

        self.deactivate(name).await?;
        let state = self.lifecycle.set_dormant(name, true).await?;
        self.registry.set_status(name, AgentStatus::Inactive).await?;
        info!(agent = %name, "Agent put to sleep");
        Ok(state)
    }

    pub async fn wake_agent(&self, name: &str) -> Result<AgentState, CoordinatorError> {
        match self.registry.get(name).await {
            Some(entry) if entry.is_active() => {
                return Err(CoordinatorError::AlreadyActive(name.to_string()))
            }
            Some(_) => {}
            None => return Err(RegistryError::NotFound(name.to_string()).into()),
        }

        let state = self.lifecycle.set_dormant(name, false).await?;
        let paths = self.provisioner.provision(name, state.kind()).await?;
        self.registry.set_status(name, AgentStatus::Active).await?;
        self.activate(name, &paths).await?;
        info!(agent = %name, "Agent woken");
        Ok(state)
    }

    /// Stop serving an agent and delete its record and sandbox.
    pub async fn remove_agent(&self, name: &str) -> Result<(), CoordinatorError> {
        if self.lifecycle.get(name).await?.is_none() {
            return Err(LifecycleError::NotFound(name.to_string()).into());
        }

        self.deactivate(name).await?;
        match self.registry.unregister(name).await {
            Ok(()) | Err(RegistryError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.lifecycle.delete(name).await?;
        match self.provisioner.teardown(name).await {
            Ok(()) | Err(SandboxError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        info!(agent = %name, "Agent removed");
        Ok(())
    }

    pub async fn route_once(&self) -> Result<RouteReport, CoordinatorError> {
        Ok(self.router.route_once().await?)
    }

    /// Serve channels and route mail until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), CoordinatorError> {
        info!(router_tick = ?self.router_tick, "Coordinator running");

        let (monitored, routed) = tokio::join!(
            self.monitor.run(shutdown.clone()),
            self.route_until(shutdown.clone())
        );

        self.stop().await?;
        monitored?;
        routed
    }

    async fn route_until(&self, shutdown: CancellationToken) -> Result<(), CoordinatorError> {
        let mut ticker = tokio::time::interval(self.router_tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.router.route_once().await {
                error!(error = %e, "Routing pass failed");
            }
        }
    }

    /// Close every open session. Safe to call more than once.
    pub async fn stop(&self) -> Result<(), CoordinatorError> {
        self.monitor.cancel_pending().await;

        let sessions: Vec<(String, Instant)> = self.sessions.lock().drain().collect();
        let closed = sessions.into_iter().map(|(name, started)| async move {
            self.monitor.unwatch(&name);
            if let Err(e) = self
                .lifecycle
                .record_deactivation(&name, started.elapsed())
                .await
            {
                warn!(agent = %name, error = %e, "Failed to record session uptime");
            }
        });
        join_all(closed).await;

        self.registry.deactivate_all().await?;
        info!("Coordinator stopped");
        Ok(())
    }
}
