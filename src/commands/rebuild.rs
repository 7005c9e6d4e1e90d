// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Rebuild commands - build a system, show the closure diff, then activate
//!
//! The toplevel derivation is built into a temporary out-link first, so the
//! diff against the running system is shown before anything changes.

use crate::commands::update;
use crate::config::Config;
use crate::exec::CommandLine;
use crate::nixfile::ConfigurationUnit;
use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CONFIGURATIONS: &str = "nixosConfigurations";

/// Which rebuild action to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildAction {
    /// Build, activate, make boot default
    Switch,
    /// Build, make boot default
    Boot,
    /// Build, activate
    Test,
    /// Build only
    Build,
}

impl RebuildAction {
    /// Action name as typed on the command line
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Switch => "switch",
            Self::Boot => "boot",
            Self::Test => "test",
            Self::Build => "build",
        }
    }

    /// Whether the new configuration is activated immediately
    #[must_use]
    pub fn activates(&self) -> bool {
        matches!(self, Self::Switch | Self::Test)
    }

    /// Whether the system profile and boot entries are updated
    #[must_use]
    pub fn sets_boot_default(&self) -> bool {
        matches!(self, Self::Switch | Self::Boot)
    }
}

/// Arguments shared by switch, boot, test and build
#[derive(Debug, Default)]
pub struct RebuildArgs {
    /// Flake directory or file
    pub flake: PathBuf,
    /// Print commands only
    pub dry_run: bool,
    /// Host attribute override
    pub hostname: Option<String>,
    /// Update flake inputs before building
    pub update: bool,
    /// Confirm before activating
    pub ask: bool,
    /// Forwarded to `nix build`
    pub extra_args: Vec<String>,
}

/// `DIR#nixosConfigurations.HOST.config.system.build.toplevel`
#[must_use]
pub fn toplevel_installable(dir: &Path, hostname: &str) -> String {
    format!(
        "{}#{CONFIGURATIONS}.{hostname}.config.system.build.toplevel",
        dir.display()
    )
}

/// Commands that make `out_link` the running and/or boot configuration
#[must_use]
pub fn activation_commands(
    config: &Config,
    action: RebuildAction,
    out_link: &Path,
) -> Vec<CommandLine> {
    let switch = out_link.join("bin").join("switch-to-configuration");
    let elevate = config.tools.elevate.as_str();
    let mut commands = Vec::new();

    if action.activates() {
        commands.push(
            CommandLine::new(switch.to_string_lossy())
                .arg("test")
                .message("Activating configuration")
                .elevated(elevate),
        );
    }

    if action.sets_boot_default() {
        commands.push(
            CommandLine::new("nix-env")
                .arg("--profile")
                .arg(&config.system.system_profile)
                .arg("--set")
                .arg(out_link)
                .message("Setting system profile")
                .elevated(elevate),
        );
        commands.push(
            CommandLine::new(switch.to_string_lossy())
                .arg("boot")
                .message("Adding configuration to bootloader")
                .elevated(elevate),
        );
    }

    commands
}

/// Run a rebuild
pub fn run(config: &Config, action: RebuildAction, args: RebuildArgs) -> Result<()> {
    let unit = ConfigurationUnit::classify(&args.flake);
    if !unit.is_composite() {
        bail!("{} is not a flake", unit);
    }
    let dir = unit.directory();

    let hostname = resolve_hostname(args.hostname.as_deref(), config)?;
    debug!("Building host {}", hostname);

    if args.update {
        update::update_flake(dir, None, args.dry_run)?;
    }

    let out_dir = tempfile::Builder::new()
        .prefix("nh-os-")
        .tempdir()
        .context("Failed to create out-link directory")?;
    let out_link = out_dir.path().join("result");

    CommandLine::new("nix")
        .arg("build")
        .arg(toplevel_installable(dir, &hostname))
        .arg("--out-link")
        .arg(&out_link)
        .args(&args.extra_args)
        .message(format!("Building NixOS configuration for {hostname}"))
        .dry(args.dry_run)
        .run()?;

    if !args.dry_run {
        show_diff(config, &out_link)?;
    }

    if action == RebuildAction::Build {
        return Ok(());
    }

    if args.ask && !args.dry_run && !confirm()? {
        info!("Not applying the configuration");
        return Ok(());
    }

    for cmd in activation_commands(config, action, &out_link) {
        cmd.dry(args.dry_run).run()?;
    }

    Ok(())
}

fn show_diff(config: &Config, out_link: &Path) -> Result<()> {
    let current = &config.system.current_profile;
    if !current.exists() {
        debug!("{} does not exist, skipping diff", current.display());
        return Ok(());
    }

    match CommandLine::from_words(&config.tools.diff) {
        Some(diff) => diff
            .arg(current)
            .arg(out_link)
            .message("Comparing changes")
            .run(),
        None => {
            debug!("No diff tool configured");
            Ok(())
        }
    }
}

fn confirm() -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt("Apply the config?")
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

/// Host attribute: explicit, then configured, then the machine hostname
///
/// # Errors
///
/// The machine hostname could not be read or is not UTF-8.
pub fn resolve_hostname(explicit: Option<&str>, config: &Config) -> Result<String> {
    if let Some(h) = explicit.or(config.system.hostname.as_deref()) {
        return Ok(h.to_string());
    }

    hostname::get()
        .context("Failed to get hostname; pass --hostname")?
        .into_string()
        .map_err(|h| anyhow!("Hostname {h:?} is not valid UTF-8"))
}
