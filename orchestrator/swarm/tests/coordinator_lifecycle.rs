// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Coordinator sessions end to end: restart recovery, sleep and wake,
//! serving channels and mail while running, and cancellation on shutdown.

use async_trait::async_trait;
use colony_core::application::registry::RegistryArtifact;
use colony_core::application::CreateAgentRequest;
use colony_core::domain::agent::{AgentKind, AgentStatus};
use colony_core::domain::channel::{ChannelError, ChannelHandler};
use colony_core::domain::config::{CoordinatorConfigSpec, MonitorConfig, MonitorStrategy};
use colony_core::infrastructure::{ChannelClient, EventBus};
use colony_swarm::application::router::post;
use colony_swarm::domain::message::{Message, MessageBody};
use colony_swarm::{Coordinator, CoordinatorError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Answers arithmetic instantly and never answers "slow".
struct Oracle;

#[async_trait]
impl ChannelHandler for Oracle {
    async fn handle(&self, _agent: &str, request: String) -> anyhow::Result<String> {
        if request == "slow" {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(r#"{"a":"4"}"#.to_string())
    }
}

fn spec(dir: &TempDir) -> CoordinatorConfigSpec {
    let mut spec = CoordinatorConfigSpec::default();
    spec.paths.data_dir = Some(dir.path().to_path_buf());
    spec.monitor = MonitorConfig {
        strategy: MonitorStrategy::Poll,
        busy_interval: Duration::from_millis(5),
        idle_interval: Duration::from_millis(20),
    };
    spec.router.tick_interval = Duration::from_millis(20);
    spec
}

fn coordinator(dir: &TempDir) -> Coordinator {
    Coordinator::from_config(&spec(dir), Arc::new(Oracle), EventBus::new(64)).unwrap()
}

async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn sleeping_agents_stay_asleep_across_restarts() {
    let dir = TempDir::new().unwrap();

    let first = coordinator(&dir);
    assert!(first.start().await.unwrap().active.is_empty());
    let alice = first.create_agent(CreateAgentRequest::new(AgentKind::General)).await.unwrap();
    let bob = first.create_agent(CreateAgentRequest::new(AgentKind::General)).await.unwrap();
    assert_eq!((alice.name(), bob.name()), ("Alice", "Bob"));
    assert!(first.monitor().is_watching("Bob"));

    first.sleep_agent("Bob").await.unwrap();
    assert!(!first.monitor().is_watching("Bob"));
    assert!(matches!(
        first.sleep_agent("Bob").await,
        Err(CoordinatorError::NotActive(_))
    ));
    first.stop().await.unwrap();

    let second = coordinator(&dir);
    let report = second.start().await.unwrap();
    assert_eq!(report.active, vec!["Alice"]);
    assert_eq!(report.dormant, vec!["Bob"]);
    assert!(second.monitor().is_watching("Alice"));
    assert!(!second.monitor().is_watching("Bob"));
    assert_eq!(
        second.registry().get("Bob").await.unwrap().status,
        AgentStatus::Inactive
    );

    let alice = second.lifecycle().get("Alice").await.unwrap().unwrap();
    assert_eq!(alice.activation_count, 2);

    let bob = second.wake_agent("Bob").await.unwrap();
    assert!(!bob.dormant);
    assert!(second.monitor().is_watching("Bob"));
    assert!(second.registry().get("Bob").await.unwrap().is_active());

    // Names are never reused while a record exists.
    let charlie = second.create_agent(CreateAgentRequest::new(AgentKind::General)).await.unwrap();
    assert_eq!(charlie.name(), "Charlie");
}

#[tokio::test]
async fn removing_an_agent_deletes_everything() {
    let dir = TempDir::new().unwrap();
    let coordinator = coordinator(&dir);
    coordinator.start().await.unwrap();
    let hermes = coordinator
        .create_agent(CreateAgentRequest::new(AgentKind::Gateway).with_capability("email"))
        .await
        .unwrap();
    let home = coordinator.paths(hermes.name()).home;
    assert!(home.is_dir());
    assert_eq!(coordinator.registry().find_by_capability("email").await, vec!["Hermes"]);

    coordinator.remove_agent("Hermes").await.unwrap();
    assert!(!home.exists());
    assert!(coordinator.registry().get("Hermes").await.is_none());
    assert!(coordinator.lifecycle().get("Hermes").await.unwrap().is_none());
    assert!(!coordinator.monitor().is_watching("Hermes"));
    assert!(coordinator.remove_agent("Hermes").await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn running_coordinator_serves_channels_and_mail() {
    let dir = TempDir::new().unwrap();
    let coordinator = Arc::new(coordinator(&dir));
    coordinator.start().await.unwrap();
    coordinator.create_agent(CreateAgentRequest::new(AgentKind::General)).await.unwrap();
    coordinator.create_agent(CreateAgentRequest::new(AgentKind::General)).await.unwrap();

    let shutdown = CancellationToken::new();
    let running = tokio::spawn({
        let coordinator = coordinator.clone();
        let shutdown = shutdown.clone();
        async move { coordinator.run(shutdown).await }
    });

    let alice = ChannelClient::new(coordinator.paths("Alice").channel, AgentKind::General)
        .with_poll_interval(Duration::from_millis(5))
        .with_response_timeout(Some(Duration::from_secs(5)));
    assert_eq!(alice.request(r#"{"q":"2+2"}"#).await.unwrap(), r#"{"a":"4"}"#);

    let alice_inbox = coordinator.paths("Alice").inbox;
    post(
        &coordinator.paths("Bob").outbox,
        &Message::new("Bob", "Alice", MessageBody::Notification { content: json!("hello") }),
    )
    .unwrap();
    eventually(|| std::fs::read_dir(&alice_inbox).map(|d| d.count() == 1).unwrap_or(false)).await;

    let bob = ChannelClient::new(coordinator.paths("Bob").channel, AgentKind::General)
        .with_poll_interval(Duration::from_millis(5));
    let pending = tokio::spawn(async move { bob.request("slow").await });
    eventually(|| coordinator.monitor().dispatched_count("Bob") == Some(1)).await;

    shutdown.cancel();
    running.await.unwrap().unwrap();
    assert!(matches!(pending.await.unwrap(), Err(ChannelError::Cancelled)));

    let alice = coordinator.lifecycle().get("Alice").await.unwrap().unwrap();
    assert!(alice.total_uptime > Duration::ZERO);

    let artifact = RegistryArtifact::read_from(coordinator.registry().artifact_path())
        .await
        .unwrap();
    assert_eq!(artifact.agents.len(), 2);
    assert!(artifact.agents.iter().all(|entry| !entry.is_active()));
}
