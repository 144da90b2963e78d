// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the colony CLI

pub mod agent;
pub mod config;
pub mod registry;

pub use self::agent::AgentCommand;
pub use self::config::ConfigCommand;
pub use self::registry::RegistryCommand;
