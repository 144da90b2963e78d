// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Aggregate
//!
//! Identity and persisted lifecycle record for one sandboxed agent.
//!
//! - [`AgentIdentity`] is fixed at registration time and never mutated.
//! - [`AgentState`] is the lifecycle record: timestamps, accumulated uptime,
//!   activation counter, opaque config and the agent-owned memory snapshot.
//!   The coordinator never interprets the snapshot bytes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Declared agent type. Drives name pools and the idle sentinel text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    General,
    Gateway,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::General => "general",
            AgentKind::Gateway => "gateway",
        }
    }
}

impl Default for AgentKind {
    fn default() -> Self {
        AgentKind::General
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "general" => Ok(AgentKind::General),
            "gateway" => Ok(AgentKind::Gateway),
            other => Err(format!("unknown agent kind '{}' (expected general|gateway)", other)),
        }
    }
}

/// Registry status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Inactive,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Active => f.write_str("active"),
            AgentStatus::Inactive => f.write_str("inactive"),
        }
    }
}

/// Immutable identity of an agent. `name` is the primary key everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub name: String,
    pub kind: AgentKind,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

impl AgentIdentity {
    pub fn new(name: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            capabilities: BTreeSet::new(),
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

/// Persisted lifecycle record. One file per agent, rewritten on every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    #[serde(flatten)]
    pub identity: AgentIdentity,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,

    /// Accumulated across every completed session.
    #[serde(with = "humantime_serde", default)]
    pub total_uptime: Duration,

    #[serde(default)]
    pub activation_count: u64,

    /// Opaque agent configuration.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, serde_json::Value>,

    /// Agent-owned memory snapshot, stored base64-encoded.
    #[serde(
        default,
        with = "snapshot_encoding",
        skip_serializing_if = "Option::is_none"
    )]
    pub memory_snapshot: Option<Vec<u8>>,

    /// Set while the agent is put to sleep; dormant agents are not watched on restart.
    #[serde(default)]
    pub dormant: bool,
}

impl AgentState {
    pub fn new(
        identity: AgentIdentity,
        config: BTreeMap<String, serde_json::Value>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            identity,
            created_at,
            last_active: None,
            total_uptime: Duration::ZERO,
            activation_count: 0,
            config,
            memory_snapshot: None,
            dormant: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn kind(&self) -> AgentKind {
        self.identity.kind
    }

    pub fn record_activation(&mut self, at: DateTime<Utc>) {
        self.activation_count += 1;
        self.last_active = Some(at);
    }

    pub fn record_deactivation(&mut self, session_uptime: Duration) {
        self.total_uptime = self.total_uptime.saturating_add(session_uptime);
    }

    pub fn save_snapshot(&mut self, blob: Vec<u8>) {
        self.memory_snapshot = Some(blob);
    }
}

mod snapshot_encoding {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> AgentState {
        let identity = AgentIdentity::new("Alice", AgentKind::General)
            .with_capabilities(["network", "filesystem"]);
        AgentState::new(identity, BTreeMap::new(), Utc::now())
    }

    #[test]
    fn test_activation_and_uptime_accumulate() {
        let mut state = sample_state();
        let now = Utc::now();

        state.record_activation(now);
        state.record_deactivation(Duration::from_secs(30));
        state.record_activation(now);
        state.record_deactivation(Duration::from_millis(1500));

        assert_eq!(state.activation_count, 2);
        assert_eq!(state.last_active, Some(now));
        assert_eq!(state.total_uptime, Duration::from_millis(31_500));
    }

    #[test]
    fn test_state_json_keeps_snapshot_bytes() {
        let mut state = sample_state();
        let blob: Vec<u8> = (0u8..=255).collect();
        state.save_snapshot(blob.clone());

        let json = serde_json::to_string(&state).unwrap();
        let parsed: AgentState = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.memory_snapshot, Some(blob));
        assert_eq!(parsed.identity, state.identity);
        assert!(json.contains("\"name\":\"Alice\""));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Gateway".parse::<AgentKind>().unwrap(), AgentKind::Gateway);
        assert!("robot".parse::<AgentKind>().is_err());
    }
}
