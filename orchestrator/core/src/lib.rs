// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Colony Core
//!
//! Filesystem-IPC substrate for a fleet of sandboxed agents: lifecycle
//! records, deterministic naming, the agent registry, and the per-agent
//! thinking channel with its monitor.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain types, use-case services, and filesystem adapters

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
