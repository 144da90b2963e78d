// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Domain events published on the event bus.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use std::time::Duration;
use crate::domain::agent::AgentKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentLifecycleEvent {
    AgentCreated {
        name: String,
        kind: AgentKind,
        created_at: DateTime<Utc>,
    },
    AgentActivated {
        name: String,
        activation_count: u64,
        activated_at: DateTime<Utc>,
    },
    AgentDeactivated {
        name: String,
        #[serde(with = "humantime_serde")]
        session_uptime: Duration,
        deactivated_at: DateTime<Utc>,
    },
    AgentRemoved {
        name: String,
        removed_at: DateTime<Utc>,
    },
    StateRecordSkipped {
        path: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChannelEvent {
    RequestDispatched {
        agent: String,
        request_bytes: usize,
        dispatched_at: DateTime<Utc>,
    },
    ResponseWritten {
        agent: String,
        response_bytes: usize,
        failed: bool,
        duration_ms: u64,
        written_at: DateTime<Utc>,
    },
    RequestCancelled {
        agent: String,
        cancelled_at: DateTime<Utc>,
    },
    ProtocolViolation {
        agent: String,
        detail: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MailEvent {
    MessageDelivered {
        message_id: String,
        from: String,
        to: String,
        delivered_at: DateTime<Utc>,
    },
    DeliveryFailed {
        message_id: String,
        from: String,
        to: String,
        reason: String,
        failed_at: DateTime<Utc>,
    },
}

impl AgentLifecycleEvent {
    pub fn agent(&self) -> Option<&str> {
        match self {
            AgentLifecycleEvent::AgentCreated { name, .. }
            | AgentLifecycleEvent::AgentActivated { name, .. }
            | AgentLifecycleEvent::AgentDeactivated { name, .. }
            | AgentLifecycleEvent::AgentRemoved { name, .. } => Some(name),
            AgentLifecycleEvent::StateRecordSkipped { .. } => None,
        }
    }
}

impl ChannelEvent {
    pub fn agent(&self) -> &str {
        match self {
            ChannelEvent::RequestDispatched { agent, .. }
            | ChannelEvent::ResponseWritten { agent, .. }
            | ChannelEvent::RequestCancelled { agent, .. }
            | ChannelEvent::ProtocolViolation { agent, .. } => agent,
        }
    }
}

impl MailEvent {
    /// Sender and recipient
    pub fn parties(&self) -> (&str, &str) {
        match self {
            MailEvent::MessageDelivered { from, to, .. }
            | MailEvent::DeliveryFailed { from, to, .. } => (from, to),
        }
    }
}
