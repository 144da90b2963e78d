// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Lifecycle records across coordinator restarts, using the file backend.

use colony_core::application::{
    AgentLifecycleService, CreateAgentRequest, LifecycleError, StandardAgentLifecycleService,
};
use colony_core::domain::agent::AgentKind;
use colony_core::domain::events::AgentLifecycleEvent;
use colony_core::infrastructure::repositories::FileAgentStateRepository;
use colony_core::infrastructure::{DomainEvent, EventBus};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn boot(state_dir: &Path) -> StandardAgentLifecycleService {
    StandardAgentLifecycleService::new(
        Arc::new(FileAgentStateRepository::new(state_dir)),
        EventBus::new(64),
    )
}

#[tokio::test]
async fn counters_survive_restart_without_double_counting() {
    let dir = TempDir::new().unwrap();

    {
        let service = boot(dir.path());
        for _ in 0..3 {
            service.create(CreateAgentRequest::new(AgentKind::General)).await.unwrap();
        }
        for name in ["Alice", "Bob", "Charlie"] {
            service.record_activation(name).await.unwrap();
            service.record_deactivation(name, Duration::from_secs(60)).await.unwrap();
        }
        // Second session: started but never stopped before the "crash".
        service.record_activation("Alice").await.unwrap();
        // A write interrupted mid-flight leaves only a temp file behind.
        std::fs::write(dir.path().join(".Bob.json.deadbeef.tmp"), b"{\"name\":").unwrap();
    }

    let service = boot(dir.path());
    let states = service.load_all().await.unwrap();
    assert_eq!(states.len(), 3);

    let alice = service.get("Alice").await.unwrap().unwrap();
    assert_eq!(alice.activation_count, 2);
    assert_eq!(alice.total_uptime, Duration::from_secs(60));

    let bob = service.get("Bob").await.unwrap().unwrap();
    assert_eq!(bob.activation_count, 1);
    assert_eq!(bob.total_uptime, Duration::from_secs(60));

    service.record_deactivation("Alice", Duration::from_secs(5)).await.unwrap();
    let alice = service.get("Alice").await.unwrap().unwrap();
    assert_eq!(alice.total_uptime, Duration::from_secs(65));
}

#[tokio::test]
async fn snapshot_round_trips_byte_for_byte() {
    let dir = TempDir::new().unwrap();
    let blob: Vec<u8> = (0..=255u8).chain([0, 0, 0xff, b'\n']).collect();

    {
        let service = boot(dir.path());
        let agent = service
            .create(CreateAgentRequest::new(AgentKind::Gateway).with_capability("net"))
            .await
            .unwrap();
        assert_eq!(agent.name(), "Hermes");
        service.save_snapshot("Hermes", blob.clone()).await.unwrap();
    }

    let service = boot(dir.path());
    service.load_all().await.unwrap();
    let restored = service.get("Hermes").await.unwrap().unwrap();
    assert_eq!(restored.memory_snapshot.as_deref(), Some(blob.as_slice()));
    assert_eq!(restored.kind(), AgentKind::Gateway);
    assert!(restored.identity.has_capability("net"));
}

#[tokio::test]
async fn corrupt_record_is_skipped_not_fatal() {
    let dir = TempDir::new().unwrap();
    {
        let service = boot(dir.path());
        service.create(CreateAgentRequest::new(AgentKind::General)).await.unwrap();
        service.create(CreateAgentRequest::new(AgentKind::General)).await.unwrap();
    }
    std::fs::write(dir.path().join("Bob.json"), b"{ truncated").unwrap();

    let event_bus = EventBus::new(64);
    let mut events = event_bus.subscribe();
    let service = StandardAgentLifecycleService::new(
        Arc::new(FileAgentStateRepository::new(dir.path())),
        event_bus,
    );

    let states = service.load_all().await.unwrap();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].name(), "Alice");

    match events.try_recv().unwrap() {
        DomainEvent::AgentLifecycle(AgentLifecycleEvent::StateRecordSkipped { path, .. }) => {
            assert!(path.ends_with("Bob.json"));
        }
        other => panic!("unexpected event {:?}", other),
    }

    // The corrupt record still occupies its name.
    let err = service
        .create(CreateAgentRequest::new(AgentKind::General).named("Bob"))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::AlreadyExists(_)));
}

#[tokio::test]
async fn names_stay_unique_across_restarts() {
    let dir = TempDir::new().unwrap();
    let mut seen = HashSet::new();

    for _boot in 0..4 {
        let service = boot(dir.path());
        service.load_all().await.unwrap();
        for _ in 0..10 {
            let state = service
                .create(CreateAgentRequest::new(AgentKind::General))
                .await
                .unwrap();
            assert!(seen.insert(state.name().to_string()), "duplicate {}", state.name());
        }
    }

    assert_eq!(seen.len(), 40);
    assert!(seen.contains("Zane"));
    assert!(seen.contains("Alice-2"));
}

#[tokio::test]
async fn names_unique_even_without_recovery() {
    let dir = TempDir::new().unwrap();
    {
        let service = boot(dir.path());
        service.create(CreateAgentRequest::new(AgentKind::General)).await.unwrap();
    }

    // load_all() skipped: allocation still checks the store.
    let service = boot(dir.path());
    let next = service
        .create(CreateAgentRequest::new(AgentKind::General))
        .await
        .unwrap();
    assert_eq!(next.name(), "Bob");
}

#[tokio::test]
async fn automatic_names_skip_corrupt_records() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("Alice.json"), b"{ not json").unwrap();

    let service = boot(dir.path());
    service.load_all().await.unwrap();
    let first = service
        .create(CreateAgentRequest::new(AgentKind::General))
        .await
        .unwrap();
    assert_eq!(first.name(), "Bob");

    // Same outcome when recovery never ran.
    std::fs::write(dir.path().join("Charlie.json"), b"{ not json").unwrap();
    let fresh = boot(dir.path());
    let names: Vec<String> = [
        fresh.create(CreateAgentRequest::new(AgentKind::General)).await.unwrap(),
        fresh.create(CreateAgentRequest::new(AgentKind::General)).await.unwrap(),
    ]
    .iter()
    .map(|s| s.name().to_string())
    .collect();
    assert_eq!(names, ["Diana", "Eve"]);

    assert_eq!(
        std::fs::read(dir.path().join("Alice.json")).unwrap(),
        b"{ not json"
    );
}
