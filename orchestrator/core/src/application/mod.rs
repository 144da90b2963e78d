// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod agent;
pub mod lifecycle;
pub mod registry;
pub mod repository_factory;

// Re-export services for convenience
pub use agent::{AgentLifecycleService, CreateAgentRequest, LifecycleError};
pub use lifecycle::StandardAgentLifecycleService;
pub use registry::{AgentRegistry, RegistryArtifact, RegistryEntry, RegistryError};
