// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Application Layer
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`router`] | `MailboxRouter`, `RouteReport`, `DeliveryFailure` |
//! | [`coordinator`] | `Coordinator`, `StartReport` |

pub mod coordinator;
pub mod router;

pub use coordinator::{Coordinator, CoordinatorError, StartReport};
pub use router::{DeliveryFailure, MailboxRouter, RouteReport, RouterError};
