// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Thinking channel infrastructure: the coordinator-side monitor, its
//! filesystem watcher, and the agent-side client.

pub mod client;
pub mod monitor;
pub mod watcher;

pub use client::ChannelClient;
pub use monitor::ChannelMonitor;
