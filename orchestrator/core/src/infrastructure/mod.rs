// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod atomic_file;
pub mod channel;
pub mod event_bus;
pub mod repositories;
pub mod sandbox;
pub mod thinking;

pub use channel::{ChannelClient, ChannelMonitor};
pub use event_bus::{DomainEvent, EventBus};
pub use sandbox::LocalSandboxProvisioner;
