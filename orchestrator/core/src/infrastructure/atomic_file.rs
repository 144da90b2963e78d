// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Whole-file replacement via write-to-temp-then-rename.
//!
//! Every file another process may read (channel files, state records, mail,
//! the registry artifact) is written through here, so a reader sees either
//! the previous contents or the new contents and never a partial write.
//! Temp files are hidden (`.` prefix) and carry a `.tmp` suffix so directory
//! scanners skip them.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const TEMP_SUFFIX: &str = ".tmp";

/// True for files that are never picked up by scanners.
pub fn is_ignored_file_name(name: &str) -> bool {
    name.starts_with('.') || name.ends_with(TEMP_SUFFIX)
}

fn temp_path_for(path: &Path) -> io::Result<PathBuf> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        )
    })?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    Ok(parent.join(format!(
        ".{}.{}{}",
        file_name,
        Uuid::new_v4().simple(),
        TEMP_SUFFIX
    )))
}

/// Atomically replace `path` with `contents`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let temp = temp_path_for(path)?;
    let result = (|| {
        let mut file = File::create(&temp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&temp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

/// [`write_atomic`] on the blocking pool.
pub async fn write_atomic_async(path: PathBuf, contents: Vec<u8>) -> io::Result<()> {
    tokio::task::spawn_blocking(move || write_atomic(&path, &contents))
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}
