// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Mailbox Router
//!
//! Moves message files from each agent's `outbox/` to the recipient's
//! `inbox/`, one pass per [`MailboxRouter::route_once`] call.
//!
//! ## Per-message protocol
//!
//! 1. Copy the file into the sender's `mail_archive/` (temp + rename, same
//!    file name, so a re-run overwrites instead of duplicating).
//! 2. Rename `outbox/<file>` to `<recipient>/inbox/<file>`. This rename is the
//!    commit point: until it happens the message is still pending.
//!
//! A message that cannot be delivered produces an `error` message in the
//! sender's own inbox under a name derived from the original file, then the
//! original moves to `mail_archive/undeliverable/`. Either way the outbox
//! entry disappears exactly once, so crashes and restarts never deliver a
//! message twice.
//!
//! A failure confined to one file or one sender is logged and left for the
//! next pass; it never stops the rest of the sweep.

use crate::domain::message::{ErrorCode, Message, MessageError};
use chrono::Utc;
use colony_core::application::registry::AgentRegistry;
use colony_core::domain::agent::AgentStatus;
use colony_core::domain::events::MailEvent;
use colony_core::domain::sandbox::{AgentPaths, SandboxProvisioner};
use colony_core::infrastructure::atomic_file::{is_ignored_file_name, write_atomic};
use colony_core::infrastructure::event_bus::EventBus;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Suffix appended to an undeliverable message's stem to name its error reply.
pub const ERROR_REPLY_SUFFIX: &str = "_error";

/// Outcome counts of one routing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteReport {
    pub delivered: usize,
    /// Well-formed messages bounced with `DELIVERY_ERROR`.
    pub failed: usize,
    /// Malformed messages bounced with `INVALID_MESSAGE`.
    pub rejected: usize,
    /// Files left in place after an I/O error; retried next pass.
    pub deferred: usize,
}

impl RouteReport {
    pub fn delivered_count(&self) -> usize {
        self.delivered
    }

    pub fn is_empty(&self) -> bool {
        self == &RouteReport::default()
    }
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Routing task failed: {0}")]
    Task(String),
}

/// Why a message was bounced back to its sender.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryFailure {
    UnknownRecipient(String),
    InactiveRecipient(String),
    MailboxUnavailable(String),
    Invalid(MessageError),
}

impl DeliveryFailure {
    pub fn code(&self) -> ErrorCode {
        match self {
            DeliveryFailure::Invalid(_) => ErrorCode::InvalidMessage,
            _ => ErrorCode::DeliveryError,
        }
    }
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryFailure::UnknownRecipient(name) => write!(f, "unknown recipient '{}'", name),
            DeliveryFailure::InactiveRecipient(name) => write!(f, "recipient '{}' is not active", name),
            DeliveryFailure::MailboxUnavailable(name) => {
                write!(f, "inbox of recipient '{}' is unavailable", name)
            }
            DeliveryFailure::Invalid(e) => write!(f, "{}", e),
        }
    }
}

/// Registry view captured at the start of a pass.
struct Directory {
    senders: Vec<(String, AgentPaths)>,
    recipients: HashMap<String, (AgentStatus, AgentPaths)>,
}

enum Outcome {
    Delivered {
        message_id: String,
        from: String,
        to: String,
    },
    Bounced {
        message_id: String,
        from: String,
        to: String,
        failure: DeliveryFailure,
    },
    Deferred,
}

pub struct MailboxRouter {
    registry: Arc<AgentRegistry>,
    provisioner: Arc<dyn SandboxProvisioner>,
    event_bus: EventBus,
    pass: Mutex<()>,
}

impl MailboxRouter {
    pub fn new(
        registry: Arc<AgentRegistry>,
        provisioner: Arc<dyn SandboxProvisioner>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            registry,
            provisioner,
            event_bus,
            pass: Mutex::new(()),
        }
    }

    /// Sweep every registered agent's outbox once.
    pub async fn route_once(&self) -> Result<RouteReport, RouterError> {
        let _pass = self.pass.lock().await;

        let entries = self.registry.list().await;
        let directory = Directory {
            senders: entries
                .iter()
                .map(|e| (e.name.clone(), self.provisioner.paths(&e.name)))
                .collect(),
            recipients: entries
                .iter()
                .map(|e| (e.name.clone(), (e.status, self.provisioner.paths(&e.name))))
                .collect(),
        };

        let outcomes = tokio::task::spawn_blocking(move || route_all(&directory))
            .await
            .map_err(|e| RouterError::Task(e.to_string()))?;

        let mut report = RouteReport::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Delivered { message_id, from, to } => {
                    report.delivered += 1;
                    self.event_bus.publish_mail_event(MailEvent::MessageDelivered {
                        message_id,
                        from,
                        to,
                        delivered_at: Utc::now(),
                    });
                }
                Outcome::Bounced { message_id, from, to, failure } => {
                    match failure {
                        DeliveryFailure::Invalid(_) => report.rejected += 1,
                        _ => report.failed += 1,
                    }
                    self.event_bus.publish_mail_event(MailEvent::DeliveryFailed {
                        message_id,
                        from,
                        to,
                        reason: failure.to_string(),
                        failed_at: Utc::now(),
                    });
                }
                Outcome::Deferred => report.deferred += 1,
            }
        }

        if !report.is_empty() {
            info!(
                delivered = report.delivered,
                failed = report.failed,
                rejected = report.rejected,
                deferred = report.deferred,
                "Mail routed"
            );
        }
        Ok(report)
    }
}

fn route_all(directory: &Directory) -> Vec<Outcome> {
    let mut outcomes = Vec::new();
    for (owner, paths) in &directory.senders {
        match pending_files(&paths.outbox) {
            Ok(files) => {
                for file in files {
                    outcomes.push(route_file(directory, owner, paths, &file));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(agent = %owner, error = %e, "Failed to scan outbox"),
        }
    }
    outcomes
}

/// Outbox entries in name order, which is send order for conforming agents.
fn pending_files(outbox: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(outbox)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        match name.to_str() {
            Some(name) if !is_ignored_file_name(name) => files.push(entry.path()),
            _ => {}
        }
    }
    files.sort();
    Ok(files)
}

fn route_file(directory: &Directory, owner: &str, sender: &AgentPaths, file: &Path) -> Outcome {
    let (Some(file_name), Some(stem)) = (
        file.file_name().and_then(|n| n.to_str()),
        file.file_stem().and_then(|n| n.to_str()),
    ) else {
        return Outcome::Deferred;
    };

    let bytes = match fs::read(file) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(agent = %owner, file = %file.display(), error = %e, "Failed to read outgoing message");
            return Outcome::Deferred;
        }
    };

    let message = match Message::parse(&bytes, stem).and_then(|m| {
        if m.from != owner {
            return Err(MessageError::SenderMismatch {
                claimed: m.from,
                owner: owner.to_string(),
            });
        }
        m.validate().map(|_| m)
    }) {
        Ok(message) => message,
        Err(e) => {
            return bounce(sender, owner, file, file_name, stem, stem, "", DeliveryFailure::Invalid(e))
        }
    };

    let failure = match directory.recipients.get(&message.to) {
        None => Some(DeliveryFailure::UnknownRecipient(message.to.clone())),
        Some((status, _)) if *status != AgentStatus::Active => {
            Some(DeliveryFailure::InactiveRecipient(message.to.clone()))
        }
        Some((_, paths)) if !paths.inbox.is_dir() => {
            Some(DeliveryFailure::MailboxUnavailable(message.to.clone()))
        }
        Some(_) => None,
    };
    if let Some(failure) = failure {
        return bounce(
            sender, owner, file, file_name, stem, &message.id, &message.to, failure,
        );
    }

    let Some((_, recipient)) = directory.recipients.get(&message.to) else {
        return Outcome::Deferred;
    };

    if let Err(e) = write_atomic(&sender.archive.join(file_name), &bytes) {
        warn!(agent = %owner, error = %e, "Failed to archive outgoing message");
        return Outcome::Deferred;
    }

    let target = free_target(&recipient.inbox, file_name);
    if let Err(e) = fs::rename(file, &target) {
        warn!(
            from = %owner,
            to = %message.to,
            error = %e,
            "Failed to move message into inbox"
        );
        return Outcome::Deferred;
    }

    debug!(id = %message.id, from = %owner, to = %message.to, "Message delivered");
    Outcome::Delivered {
        message_id: message.id,
        from: message.from,
        to: message.to,
    }
}

/// Reply to the sender with an error message, then retire the original.
#[allow(clippy::too_many_arguments)]
fn bounce(
    sender: &AgentPaths,
    owner: &str,
    file: &Path,
    file_name: &str,
    stem: &str,
    message_id: &str,
    to: &str,
    failure: DeliveryFailure,
) -> Outcome {
    let reply = Message::error_reply(owner, message_id, failure.code(), failure.to_string());
    let written = reply
        .to_json()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        .and_then(|json| match reply_target(&sender.inbox, stem, message_id) {
            Some(reply_path) => write_atomic(&reply_path, &json),
            None => Ok(()),
        });
    if let Err(e) = written {
        warn!(agent = %owner, error = %e, "Failed to write delivery error");
        return Outcome::Deferred;
    }

    if let Err(e) = fs::rename(file, free_target(&sender.undeliverable, file_name)) {
        warn!(agent = %owner, error = %e, "Failed to retire undeliverable message");
        return Outcome::Deferred;
    }

    warn!(
        agent = %owner,
        id = %message_id,
        code = %failure.code(),
        reason = %failure,
        "Message bounced"
    );
    Outcome::Bounced {
        message_id: message_id.to_string(),
        from: owner.to_string(),
        to: to.to_string(),
        failure,
    }
}

/// Where the error reply for `message_id` goes, or `None` if it is already there.
///
/// `<stem>_error.json` first, then `<stem>_error-N.json`. A reply to the same
/// message is reused so a re-run after a crash writes nothing new; a reply to
/// a different message that happened to share the file name is kept.
fn reply_target(inbox: &Path, stem: &str, message_id: &str) -> Option<PathBuf> {
    let base = format!("{}{}", stem, ERROR_REPLY_SUFFIX);
    let candidates = std::iter::once(inbox.join(format!("{}.json", base)))
        .chain((1..).map(|n| inbox.join(format!("{}-{}.json", base, n))));

    for candidate in candidates {
        let Ok(bytes) = fs::read(&candidate) else {
            return Some(candidate);
        };
        let answers_same = Message::parse(&bytes, "")
            .map(|existing| existing.replies_to() == Some(message_id))
            .unwrap_or(false);
        if answers_same {
            return None;
        }
    }
    None
}

/// `dir/file_name`, or `dir/<stem>-N.<ext>` if that is already taken.
fn free_target(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let path = Path::new(file_name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(file_name);
    let extension = path.extension().and_then(|e| e.to_str());
    (1..)
        .map(|n| match extension {
            Some(ext) => dir.join(format!("{}-{}.{}", stem, n, ext)),
            None => dir.join(format!("{}-{}", stem, n)),
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Drop `message` into `outbox` the way a conforming agent would.
pub fn post(outbox: &Path, message: &Message) -> io::Result<PathBuf> {
    let path = outbox.join(message.file_name());
    let json = message
        .to_json()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_atomic(&path, &json)?;
    Ok(path)
}
