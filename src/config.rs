// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Configuration management
//!
//! Layers, lowest first: built-in defaults, the TOML config file, then
//! `NH__SECTION__KEY` environment variables.

use crate::age::UnknownAgePolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "hyperpolymath", "nh")
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for cached data (search index)
    pub cache_dir: PathBuf,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Store layout
    pub store: StoreConfig,
    /// gcroot cleaning
    pub gcroots: GcRootsConfig,
    /// External programs
    pub tools: ToolsConfig,
    /// Package search
    pub search: SearchConfig,
    /// System profiles and host
    pub system: SystemConfig,
}

/// Where the store and its registry live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store prefix every gcroot must resolve under
    pub prefix: PathBuf,
    /// Directory holding one registration record per root
    pub registry_dir: PathBuf,
    /// Suffix appended to encoded record names
    pub registry_suffix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            prefix: PathBuf::from("/nix/store"),
            registry_dir: PathBuf::from("/nix/var/nix/gcroots/auto"),
            registry_suffix: ".root".to_string(),
        }
    }
}

/// gcroot cleaning behaviour
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcRootsConfig {
    /// Policy for roots without a registration record
    pub unknown_age: UnknownAgePolicy,
    /// Directory globs never descended into
    pub exclude: Vec<String>,
}

/// External programs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Closure diff command, given old and new profile
    pub diff: String,
    /// Pin updater for fetcher calls
    pub fetch_updater: String,
    /// Interactive picker
    pub picker: String,
    /// Elevation wrapper for system changes; empty to disable
    pub elevate: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            diff: "nvd diff".to_string(),
            fetch_updater: "update-nix-fetchgit".to_string(),
            picker: "fzf".to_string(),
            elevate: "sudo".to_string(),
        }
    }
}

/// Package search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Flake searched by default
    pub flake: String,
    /// Results shown
    pub max_results: usize,
    /// Lifetime of the cached package list, in seconds
    pub cache_ttl_secs: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            flake: "nixpkgs".to_string(),
            max_results: 10,
            cache_ttl_secs: 259_200,
        }
    }
}

/// System profiles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Currently activated system
    pub current_profile: PathBuf,
    /// System profile used at next boot
    pub system_profile: PathBuf,
    /// Host attribute to build; defaults to the machine hostname
    pub hostname: Option<String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            current_profile: PathBuf::from("/run/current-system"),
            system_profile: PathBuf::from("/nix/var/nix/profiles/system"),
            hostname: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: project_dirs()
                .map(|d| d.cache_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from("~/.cache/nh")),
            log_level: "info".to_string(),
            store: StoreConfig::default(),
            gcroots: GcRootsConfig::default(),
            tools: ToolsConfig::default(),
            search: SearchConfig::default(),
            system: SystemConfig::default(),
        }
    }
}

/// Default config file location
#[must_use]
pub fn default_path() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().join("config.toml"))
}

/// Load configuration.
///
/// An explicit `path` must exist; the default location is optional.
///
/// # Errors
///
/// Unreadable or invalid config file, or invalid environment overrides.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let defaults = ::config::Config::try_from(&Config::default())
        .context("Failed to build default configuration")?;

    let mut builder = ::config::Config::builder().add_source(defaults);

    match path {
        Some(p) => {
            debug!("Loading config from {}", p.display());
            builder = builder.add_source(::config::File::from(p).required(true));
        }
        None => {
            if let Some(p) = default_path() {
                debug!("Loading config from {} if present", p.display());
                builder = builder.add_source(::config::File::from(p).required(false));
            }
        }
    }

    builder = builder.add_source(
        ::config::Environment::with_prefix("NH")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("gcroots.exclude"),
    );

    builder
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Invalid configuration")
}
