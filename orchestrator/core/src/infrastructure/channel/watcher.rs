// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Filesystem notifications for channel files.
//!
//! Watches each agent's channel directory (not the file itself, since every
//! write replaces the file by rename) and forwards a wake-up whenever an
//! event touches a file with the channel's name.

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::ffi::OsString;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub struct ChannelWatcher {
    watcher: Mutex<RecommendedWatcher>,
}

impl ChannelWatcher {
    /// Start a watcher that signals on events touching `channel_file_name`.
    pub fn new(
        channel_file_name: &str,
    ) -> notify::Result<(Self, mpsc::UnboundedReceiver<()>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let wanted = OsString::from(channel_file_name);

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let relevant = event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(wanted.as_os_str()));
                if relevant {
                    // Receiver gone means the monitor stopped.
                    let _ = tx.send(());
                }
            }
            Err(e) => warn!(error = %e, "Filesystem watch error"),
        })?;

        Ok((
            Self {
                watcher: Mutex::new(watcher),
            },
            rx,
        ))
    }

    pub fn watch_dir(&self, dir: &Path) -> notify::Result<()> {
        debug!(dir = %dir.display(), "Watching channel directory");
        self.watcher.lock().watch(dir, RecursiveMode::NonRecursive)
    }

    pub fn unwatch_dir(&self, dir: &Path) {
        if let Err(e) = self.watcher.lock().unwatch(dir) {
            debug!(dir = %dir.display(), error = %e, "Unwatch failed");
        }
    }
}
