// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # `colony-swarm` — Fleet Coordination Crate
//!
//! Runs a fleet of agents on top of `colony-core`: routes mailbox messages
//! between agents and owns the coordinator that ties lifecycle, registry,
//! channel monitoring and routing together.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Message`, `MessageBody`, `ErrorCode` |
//! | [`application`] | Application | `MailboxRouter`, `Coordinator` |
//!
//! ## Key Concepts
//!
//! - **Mailbox**: every agent owns an `inbox/` and an `outbox/`. Agents drop
//!   one JSON file per message into their outbox; the router moves it.
//! - **Exactly-once delivery**: a message leaves an outbox through a single
//!   rename, into either the recipient's inbox or the sender's
//!   `mail_archive/undeliverable/`.
//! - **Coordinator**: one per process; the only writer of the registry artifact.

pub mod application;
pub mod domain;

pub use application::{Coordinator, CoordinatorError, MailboxRouter, RouteReport};
pub use domain::*;
