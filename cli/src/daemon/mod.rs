// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Foreground coordinator mode
//!
//! Handles:
//! - Configuration loading and validation
//! - Thinking handler selection
//! - Graceful shutdown on Ctrl+C/SIGTERM

pub mod server;

pub use server::{run_coordinator, thinking_handler};
