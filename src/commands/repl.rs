// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

use crate::exec::CommandLine;
use crate::nixfile::ConfigurationUnit;
use anyhow::Result;
use std::path::Path;
use tracing::warn;

/// Load a flake into `nix repl`
pub fn run(path: &Path) -> Result<()> {
    let unit = ConfigurationUnit::classify(path);
    if !unit.is_composite() {
        warn!("{} is not a flake, nothing to load", unit);
        return Ok(());
    }

    let dir = unit.directory();
    CommandLine::new("nix")
        .args(["flake", "show"])
        .arg(dir)
        .run()?;
    CommandLine::new("nix").arg("repl").arg(dir).run()
}
