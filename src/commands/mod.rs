// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Command implementations

pub mod completions;
pub mod config;
pub mod gcr_clean;
pub mod rebuild;
pub mod repl;
pub mod search;
pub mod update;
