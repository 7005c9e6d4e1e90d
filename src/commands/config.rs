// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

use crate::config::{default_path, Config};
use anyhow::{Context, Result};

/// Print the effective configuration as TOML
pub fn run(config: &Config) -> Result<()> {
    if let Some(path) = default_path() {
        println!("# default config file: {}", path.display());
    }
    let text = toml::to_string_pretty(config).context("Failed to serialize configuration")?;
    print!("{text}");
    Ok(())
}
