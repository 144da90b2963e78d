// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Name Allocator Domain Service
//!
//! Hands out unique, human-readable agent names from a fixed, ordered pool per
//! [`AgentKind`]. When a pool is exhausted, each base name is retried with a
//! numeric suffix (`Alice-2`, `Bob-2`, ..., then `Alice-3`, ...), so allocation
//! never fails and the sequence is fully deterministic for a given used-set.
//!
//! The used-set lives in memory only; it is replayed from the lifecycle store
//! on startup.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Deterministic, collision-free agent naming

use crate::domain::agent::AgentKind;
use std::collections::HashSet;
use thiserror::Error;

const GENERAL_NAMES: &[&str] = &[
    "Alice", "Bob", "Charlie", "Diana", "Eve", "Frank", "Grace", "Henry", "Iris", "Jack",
    "Kate", "Leo", "Maya", "Noah", "Olivia", "Paul", "Quinn", "Rose", "Sam", "Tara", "Uma",
    "Victor", "Wendy", "Xavier", "Yara", "Zane",
];

const GATEWAY_NAMES: &[&str] = &["Hermes", "Iris-Gate", "Mercury", "Janus", "Heimdall"];

const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NamingError {
    #[error("Agent name already in use: {0}")]
    AlreadyExists(String),

    #[error("Invalid agent name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

/// Check that a name is safe to use as a directory and file stem.
pub fn validate_agent_name(name: &str) -> Result<(), NamingError> {
    let invalid = |reason: &str| NamingError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name longer than 64 characters"));
    }
    if name.starts_with('.') {
        return Err(invalid("name cannot start with '.'"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(invalid("only ASCII letters, digits, '-' and '_' are allowed"));
    }
    Ok(())
}

pub struct NameAllocator {
    used: HashSet<String>,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self {
            used: HashSet::new(),
        }
    }

    /// Seed the used-set, typically from every recovered lifecycle record.
    pub fn with_used<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            used: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn base_names(kind: AgentKind) -> &'static [&'static str] {
        match kind {
            AgentKind::General => GENERAL_NAMES,
            AgentKind::Gateway => GATEWAY_NAMES,
        }
    }

    pub fn is_used(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    /// Return the next free name for `kind` and mark it used.
    pub fn allocate(&mut self, kind: AgentKind) -> String {
        let bases = Self::base_names(kind);

        if let Some(base) = bases.iter().find(|b| !self.used.contains(**b)) {
            let name = (*base).to_string();
            self.used.insert(name.clone());
            return name;
        }

        let mut suffix: u64 = 2;
        loop {
            for base in bases {
                let candidate = format!("{}-{}", base, suffix);
                if !self.used.contains(&candidate) {
                    self.used.insert(candidate.clone());
                    return candidate;
                }
            }
            suffix += 1;
        }
    }

    /// Claim an explicit name. Fails if it is malformed or already taken.
    pub fn reserve(&mut self, name: &str) -> Result<(), NamingError> {
        validate_agent_name(name)?;
        if !self.used.insert(name.to_string()) {
            return Err(NamingError::AlreadyExists(name.to_string()));
        }
        Ok(())
    }

    /// Return a name to the pool after permanent removal.
    pub fn release(&mut self, name: &str) -> bool {
        self.used.remove(name)
    }
}

impl Default for NameAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_allocates_in_pool_order() {
        let mut allocator = NameAllocator::new();
        assert_eq!(allocator.allocate(AgentKind::General), "Alice");
        assert_eq!(allocator.allocate(AgentKind::General), "Bob");
        assert_eq!(allocator.allocate(AgentKind::Gateway), "Hermes");
    }

    #[test]
    fn test_skips_names_already_used() {
        let mut allocator = NameAllocator::with_used(["Alice", "Charlie"]);
        assert_eq!(allocator.allocate(AgentKind::General), "Bob");
        assert_eq!(allocator.allocate(AgentKind::General), "Diana");
    }

    #[test]
    fn test_overflow_appends_suffix_per_base() {
        let mut allocator = NameAllocator::with_used(GATEWAY_NAMES.iter().copied());
        assert_eq!(allocator.allocate(AgentKind::Gateway), "Hermes-2");
        assert_eq!(allocator.allocate(AgentKind::Gateway), "Iris-Gate-2");

        for _ in 0..3 {
            allocator.allocate(AgentKind::Gateway);
        }
        assert_eq!(allocator.allocate(AgentKind::Gateway), "Hermes-3");
    }

    #[test]
    fn test_reserve_rejects_taken_and_invalid() {
        let mut allocator = NameAllocator::new();
        allocator.reserve("Zephyr").unwrap();
        assert_eq!(
            allocator.reserve("Zephyr"),
            Err(NamingError::AlreadyExists("Zephyr".to_string()))
        );
        assert!(matches!(
            allocator.reserve("../etc"),
            Err(NamingError::InvalidName { .. })
        ));
        assert!(matches!(
            allocator.reserve(""),
            Err(NamingError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_reserved_name_is_not_allocated() {
        let mut allocator = NameAllocator::new();
        allocator.reserve("Alice").unwrap();
        assert_eq!(allocator.allocate(AgentKind::General), "Bob");
    }

    #[test]
    fn test_release_makes_name_available_again() {
        let mut allocator = NameAllocator::new();
        let first = allocator.allocate(AgentKind::General);
        assert!(allocator.release(&first));
        assert_eq!(allocator.allocate(AgentKind::General), first);
    }

    proptest! {
        #[test]
        fn prop_allocated_names_are_unique_across_restarts(
            kinds in prop::collection::vec(prop::bool::ANY, 1..120),
            restart_at in 0usize..120,
        ) {
            let mut allocator = NameAllocator::new();
            let mut issued: Vec<String> = Vec::new();

            for (i, gateway) in kinds.iter().enumerate() {
                if i == restart_at {
                    allocator = NameAllocator::with_used(issued.clone());
                }
                let kind = if *gateway { AgentKind::Gateway } else { AgentKind::General };
                let name = allocator.allocate(kind);
                prop_assert!(validate_agent_name(&name).is_ok());
                prop_assert!(!issued.contains(&name));
                issued.push(name);
            }
        }
    }
}
