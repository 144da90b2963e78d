// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Sandbox Provisioner Trait - boundary to the process-isolation collaborator
//!
//! The orchestration core never creates an agent's filesystem tree on its own
//! terms; it asks a [`SandboxProvisioner`] to do so and then assumes the paths
//! in [`AgentPaths`] exist. Every per-agent path is derived here so that the
//! channel monitor and the mailbox router share one layout.
//!
//! ```text
//! <agents_dir>/<name>/
//! ├── .internal/thinking        channel file
//! ├── inbox/                    pending receipt
//! ├── outbox/                   pending send
//! └── mail_archive/             delivered (sender side)
//!     └── undeliverable/        originals that produced a delivery error
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use crate::domain::agent::AgentKind;

pub const CHANNEL_DIR: &str = ".internal";
pub const THINKING_CHANNEL: &str = "thinking";
pub const INBOX_DIR: &str = "inbox";
pub const OUTBOX_DIR: &str = "outbox";
pub const ARCHIVE_DIR: &str = "mail_archive";
pub const UNDELIVERABLE_DIR: &str = "undeliverable";

/// Filesystem locations belonging to one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentPaths {
    pub home: PathBuf,
    pub channel: PathBuf,
    pub inbox: PathBuf,
    pub outbox: PathBuf,
    pub archive: PathBuf,
    pub undeliverable: PathBuf,
}

impl AgentPaths {
    pub fn for_agent(agents_dir: &Path, name: &str) -> Self {
        let home = agents_dir.join(name);
        let archive = home.join(ARCHIVE_DIR);
        Self {
            channel: home.join(CHANNEL_DIR).join(THINKING_CHANNEL),
            inbox: home.join(INBOX_DIR),
            outbox: home.join(OUTBOX_DIR),
            undeliverable: archive.join(UNDELIVERABLE_DIR),
            archive,
            home,
        }
    }

    /// Directories that must exist before the agent can be watched or routed.
    pub fn directories(&self) -> Vec<&Path> {
        let channel_dir = self.channel.parent().unwrap_or(&self.home);
        vec![
            &self.home,
            channel_dir,
            &self.inbox,
            &self.outbox,
            &self.archive,
            &self.undeliverable,
        ]
    }
}

/// Sandbox provisioning trait
///
/// Implementations create and tear down the per-agent filesystem tree.
/// Provisioning an existing sandbox is not an error; it only fills in what is
/// missing so recovery after a restart is idempotent.
#[async_trait]
pub trait SandboxProvisioner: Send + Sync {
    /// Create (or complete) the agent's tree and seed its channel file
    async fn provision(&self, name: &str, kind: AgentKind) -> Result<AgentPaths, SandboxError>;

    /// Remove the agent's tree entirely
    async fn teardown(&self, name: &str) -> Result<(), SandboxError>;

    /// Resolve paths without touching the filesystem
    fn paths(&self, name: &str) -> AgentPaths;
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Invalid agent name: {0}")]
    InvalidName(String),

    #[error("Sandbox not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_layout() {
        let paths = AgentPaths::for_agent(Path::new("/srv/agents"), "Alice");
        assert_eq!(paths.home, PathBuf::from("/srv/agents/Alice"));
        assert_eq!(paths.channel, PathBuf::from("/srv/agents/Alice/.internal/thinking"));
        assert_eq!(paths.inbox, PathBuf::from("/srv/agents/Alice/inbox"));
        assert_eq!(paths.outbox, PathBuf::from("/srv/agents/Alice/outbox"));
        assert_eq!(
            paths.undeliverable,
            PathBuf::from("/srv/agents/Alice/mail_archive/undeliverable")
        );
        assert_eq!(paths.directories().len(), 6);
    }
}
