// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Colony CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Command handlers and the foreground coordinator runner

pub mod commands;
pub mod daemon;
