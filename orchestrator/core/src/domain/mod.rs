// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Pure types and collaborator traits for the colony coordinator.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Agent identity and lifecycle records, deterministic naming,
//!   the channel protocol state machine, configuration schema, domain events,
//!   and the persistence and sandbox boundaries.

pub mod agent;
pub mod channel;
pub mod config;
pub mod events;
pub mod naming;
pub mod repository;
pub mod sandbox;
