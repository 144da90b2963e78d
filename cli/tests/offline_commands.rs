// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Offline agent commands against a temporary data directory.

use colony::commands::agent::{handle_command, AgentCommand};
use colony_core::domain::agent::AgentKind;
use colony_core::domain::config::CoordinatorConfigManifest;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(dir: &TempDir) -> PathBuf {
    let mut config = CoordinatorConfigManifest::default();
    config.spec.paths.data_dir = Some(dir.path().join("data"));
    let path = dir.path().join("colony-config.yaml");
    config.to_yaml_file(&path).unwrap();
    path
}

#[tokio::test]
async fn create_sleep_and_remove_agents() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let data = dir.path().join("data");

    for _ in 0..2 {
        handle_command(
            AgentCommand::Create {
                kind: AgentKind::General,
                name: None,
                capabilities: vec!["net".to_string()],
            },
            Some(config.clone()),
        )
        .await
        .unwrap();
    }

    assert!(data.join("state").join("Alice.json").is_file());
    assert!(data.join("state").join("Bob.json").is_file());
    assert!(data.join("agents").join("Bob").join(".internal").join("thinking").is_file());

    handle_command(AgentCommand::Sleep { name: "Bob".into() }, Some(config.clone()))
        .await
        .unwrap();
    let record = std::fs::read_to_string(data.join("state").join("Bob.json")).unwrap();
    assert!(record.contains("\"dormant\": true"));

    handle_command(AgentCommand::Remove { name: "Alice".into() }, Some(config.clone()))
        .await
        .unwrap();
    assert!(!data.join("state").join("Alice.json").exists());
    assert!(!data.join("agents").join("Alice").exists());

    assert!(handle_command(AgentCommand::Show { name: "Alice".into() }, Some(config.clone()))
        .await
        .is_err());
    handle_command(AgentCommand::List, Some(config)).await.unwrap();
}
