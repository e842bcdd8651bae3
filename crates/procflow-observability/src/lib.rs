// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # procflow-observability
//!
//! Logging infrastructure shared by the procflow controller and its worker
//! processes, with per-crate debug flag support.
//!
//! ## Features
//! - `file-logging`: JSON log files with daily rotation and run-folder retention

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

pub use cli::*;
pub use config::*;
pub use init::*;

/// Known procflow crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "procflow-config",
    "procflow-observability",
    "procflow-transports",
    "procflow-engine",
];
