// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! nh library - helpers around the Nix toolchain
//!
//! The interesting part is gcroot housekeeping: [`scanner`] finds build
//! result symlinks that keep store paths alive, [`registry`] recovers when
//! each was registered, [`age`] decides which are stale and
//! [`gcroot::GcRoot::remove`] drops them. The remaining modules build and
//! activate NixOS systems, update pins and search packages.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod age;
pub mod cache;
pub mod commands;
pub mod config;
pub mod error;
pub mod exec;
pub mod gcroot;
pub mod nixfile;
pub mod registry;
pub mod scanner;

/// Prelude for common imports
pub mod prelude {
    pub use crate::age::{AgeFilter, Cutoff, Selection, UnknownAgePolicy};
    pub use crate::gcroot::{GcRoot, Registration, RemovedRoot};
    pub use crate::nixfile::{ConfigurationUnit, UnitKind};
    pub use crate::registry::Registry;
    pub use crate::scanner::{scan_path, ScanConfig};
    pub use anyhow::{Context, Result};
}
