// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Coordinator process: wire, recover, serve until a shutdown signal.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use colony_core::domain::channel::ChannelHandler;
use colony_core::domain::config::{CoordinatorConfigManifest, ThinkingConfig};
use colony_core::infrastructure::event_bus::EventBusError;
use colony_core::infrastructure::thinking::{ProcessThinkingHandler, UnavailableHandler};
use colony_core::infrastructure::EventBus;
use colony_swarm::Coordinator;

pub async fn run_coordinator(config_path: Option<PathBuf>) -> Result<()> {
    let config = CoordinatorConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    info!("Configuration loaded: name={}", config.metadata.name);

    let event_bus = EventBus::with_default_capacity();
    let journal = tokio::spawn(journal_events(event_bus.clone()));

    let handler = thinking_handler(&config.spec.thinking)?;
    let coordinator = Coordinator::from_config(&config.spec, handler, event_bus)
        .context("Failed to initialize coordinator")?;

    let report = coordinator
        .start()
        .await
        .context("Failed to recover agents")?;
    for (agent, reason) in &report.unavailable {
        warn!(agent = %agent, reason = %reason, "Agent unavailable");
    }

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let result = coordinator.run(shutdown).await;
    journal.abort();
    result.context("Coordinator failed")?;

    info!("Coordinator shut down");
    Ok(())
}

/// External command when configured, otherwise a handler that fails every request.
pub fn thinking_handler(config: &ThinkingConfig) -> Result<Arc<dyn ChannelHandler>> {
    match &config.command {
        Some(command) => {
            info!(command = %command.join(" "), "Using external thinking command");
            Ok(Arc::new(ProcessThinkingHandler::new(command)?))
        }
        None => {
            warn!("No thinking command configured; channel requests will be answered with errors");
            Ok(Arc::new(UnavailableHandler))
        }
    }
}

/// Mirror domain events into the log at debug level.
async fn journal_events(event_bus: EventBus) {
    let mut events = event_bus.subscribe();
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => debug!(event = %json, "Domain event"),
                Err(e) => debug!(error = %e, "Unserializable domain event"),
            },
            Err(EventBusError::Lagged(_)) | Err(EventBusError::Empty) => continue,
            Err(EventBusError::Closed) => break,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_thinking_handler_selection() {
        let none = thinking_handler(&ThinkingConfig::default()).unwrap();
        assert!(none.handle("Alice", "q".to_string()).await.is_err());

        let configured = ThinkingConfig {
            command: Some(vec!["cat".to_string()]),
        };
        assert!(thinking_handler(&configured).is_ok());
    }
}
