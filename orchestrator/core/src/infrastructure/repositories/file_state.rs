// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! File-backed lifecycle records.
//!
//! One `<name>.json` per agent under the state directory. Every save is a
//! full atomic rewrite of that agent's file, so agents never share a file
//! and a crash leaves either the old or the new record.

use crate::domain::agent::AgentState;
use crate::domain::repository::{
    AgentStateRepository, CorruptRecord, LoadReport, RepositoryError,
};
use crate::infrastructure::atomic_file::{is_ignored_file_name, write_atomic};
use async_trait::async_trait;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const RECORD_EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct FileAgentStateRepository {
    state_dir: PathBuf,
}

impl FileAgentStateRepository {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn record_path(&self, name: &str) -> PathBuf {
        self.state_dir.join(format!("{}.{}", name, RECORD_EXTENSION))
    }

    fn read_record(path: &Path) -> Result<Option<AgentState>, RepositoryError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| RepositoryError::CorruptState {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }

    fn scan(state_dir: &Path) -> Result<LoadReport, RepositoryError> {
        let mut report = LoadReport::default();
        let entries = match fs::read_dir(state_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if is_ignored_file_name(file_name)
                || path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION)
            {
                continue;
            }

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();

            match Self::read_record(&path) {
                Ok(Some(state)) if state.name() == stem => report.states.push(state),
                Ok(Some(state)) => {
                    warn!(path = %path.display(), name = %state.name(), "State record name does not match its file; skipping");
                    report.corrupt.push(CorruptRecord {
                        reason: format!("record names '{}' but file is '{}'", state.name(), stem),
                        path,
                    });
                }
                Ok(None) => {}
                Err(RepositoryError::CorruptState { reason, .. }) => {
                    warn!(path = %path.display(), %reason, "Skipping corrupt state record");
                    report.corrupt.push(CorruptRecord { path, reason });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable state record");
                    report.corrupt.push(CorruptRecord {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        report.states.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(report)
    }
}

async fn blocking<T, F>(f: F) -> Result<T, RepositoryError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RepositoryError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RepositoryError::Io(format!("blocking task failed: {}", e)))?
}

#[async_trait]
impl AgentStateRepository for FileAgentStateRepository {
    async fn save(&self, state: &AgentState) -> Result<(), RepositoryError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        let state_dir = self.state_dir.clone();
        let path = self.record_path(state.name());
        debug!(agent = %state.name(), path = %path.display(), "Saving state record");

        blocking(move || {
            fs::create_dir_all(&state_dir)?;
            write_atomic(&path, &bytes)?;
            Ok(())
        })
        .await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<AgentState>, RepositoryError> {
        let path = self.record_path(name);
        blocking(move || Self::read_record(&path)).await
    }

    async fn load_all(&self) -> Result<LoadReport, RepositoryError> {
        let state_dir = self.state_dir.clone();
        blocking(move || Self::scan(&state_dir)).await
    }

    async fn delete(&self, name: &str) -> Result<(), RepositoryError> {
        let path = self.record_path(name);
        let name = name.to_string();
        blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(RepositoryError::NotFound(name)),
            Err(e) => Err(e.into()),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentIdentity, AgentKind};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn state(name: &str) -> AgentState {
        AgentState::new(
            AgentIdentity::new(name, AgentKind::General).with_capabilities(["net"]),
            BTreeMap::new(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_save_creates_one_file_per_agent() {
        let dir = TempDir::new().unwrap();
        let repo = FileAgentStateRepository::new(dir.path().join("state"));

        repo.save(&state("Alice")).await.unwrap();
        repo.save(&state("Bob")).await.unwrap();

        assert!(repo.record_path("Alice").exists());
        assert!(repo.record_path("Bob").exists());
        let loaded = repo.find_by_name("Bob").await.unwrap().unwrap();
        assert!(loaded.identity.has_capability("net"));
    }

    #[tokio::test]
    async fn test_load_all_skips_corrupt_records() {
        let dir = TempDir::new().unwrap();
        let repo = FileAgentStateRepository::new(dir.path());

        repo.save(&state("Alice")).await.unwrap();
        fs::write(dir.path().join("Mallory.json"), b"{ not json").unwrap();
        fs::write(dir.path().join(".Alice.json.1234.tmp"), b"partial").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let report = repo.load_all().await.unwrap();
        assert_eq!(report.states.len(), 1);
        assert_eq!(report.states[0].name(), "Alice");
        assert_eq!(report.corrupt.len(), 1);
        assert!(report.corrupt[0].path.ends_with("Mallory.json"));
    }

    #[tokio::test]
    async fn test_find_corrupt_record_is_an_error() {
        let dir = TempDir::new().unwrap();
        let repo = FileAgentStateRepository::new(dir.path());
        fs::write(repo.record_path("Mallory"), b"[]").unwrap();

        assert!(matches!(
            repo.find_by_name("Mallory").await,
            Err(RepositoryError::CorruptState { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_state_dir_loads_empty() {
        let dir = TempDir::new().unwrap();
        let repo = FileAgentStateRepository::new(dir.path().join("absent"));
        let report = repo.load_all().await.unwrap();
        assert!(report.states.is_empty());
        assert!(repo.find_by_name("Alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let dir = TempDir::new().unwrap();
        let repo = FileAgentStateRepository::new(dir.path());
        repo.save(&state("Alice")).await.unwrap();

        repo.delete("Alice").await.unwrap();
        assert!(!repo.record_path("Alice").exists());
        assert!(matches!(
            repo.delete("Alice").await,
            Err(RepositoryError::NotFound(_))
        ));
    }
}
