// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Domain Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Observers (CLI, tests) subscribe to lifecycle, channel and mail events.
// Events published while nobody listens are dropped.

use crate::domain::events::{AgentLifecycleEvent, ChannelEvent, MailEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    AgentLifecycle(AgentLifecycleEvent),
    Channel(ChannelEvent),
    Mail(MailEvent),
}

impl DomainEvent {
    /// Agents this event concerns
    pub fn involves(&self, agent: &str) -> bool {
        match self {
            DomainEvent::AgentLifecycle(event) => event.agent() == Some(agent),
            DomainEvent::Channel(event) => event.agent() == agent,
            DomainEvent::Mail(event) => {
                let (from, to) = event.parties();
                from == agent || to == agent
            }
        }
    }
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_agent_event(&self, event: AgentLifecycleEvent) {
        self.publish(DomainEvent::AgentLifecycle(event));
    }

    pub fn publish_channel_event(&self, event: ChannelEvent) {
        self.publish(DomainEvent::Channel(event));
    }

    pub fn publish_mail_event(&self, event: MailEvent) {
        self.publish(DomainEvent::Mail(event));
    }

    fn publish(&self, event: DomainEvent) {
        debug!("Publishing event: {:?}", event);

        // send() errors only when there are no receivers
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all domain events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe and filter for a single agent
    pub fn subscribe_agent(&self, agent: impl Into<String>) -> AgentEventReceiver {
        AgentEventReceiver {
            receiver: self.sender.subscribe(),
            agent: agent.into(),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver for one agent's events (filtered)
pub struct AgentEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    agent: String,
}

impl AgentEventReceiver {
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.involves(&self.agent) {
                return Ok(event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentKind;
    use chrono::Utc;

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        event_bus.publish_agent_event(AgentLifecycleEvent::AgentCreated {
            name: "Alice".to_string(),
            kind: AgentKind::General,
            created_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            DomainEvent::AgentLifecycle(AgentLifecycleEvent::AgentCreated { name, .. }) => {
                assert_eq!(name, "Alice");
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_agent_event_filtering() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe_agent("Bob");

        event_bus.publish_channel_event(ChannelEvent::RequestDispatched {
            agent: "Alice".to_string(),
            request_bytes: 3,
            dispatched_at: Utc::now(),
        });
        event_bus.publish_mail_event(MailEvent::DeliveryFailed {
            message_id: "m-1".to_string(),
            from: "Bob".to_string(),
            to: "Zephyr".to_string(),
            reason: "unknown recipient".to_string(),
            failed_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            DomainEvent::Mail(MailEvent::DeliveryFailed { from, .. }) => assert_eq!(from, "Bob"),
            other => panic!("Wrong event received: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let event_bus = EventBus::default();
        assert_eq!(event_bus.subscriber_count(), 0);
        event_bus.publish_channel_event(ChannelEvent::RequestCancelled {
            agent: "Alice".to_string(),
            cancelled_at: Utc::now(),
        });
    }

    #[test]
    fn test_try_recv_empty() {
        let event_bus = EventBus::new(4);
        let mut receiver = event_bus.subscribe();
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }
}
