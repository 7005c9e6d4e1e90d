// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Update command - bumps pinned inputs of flakes and fetcher calls

use crate::config::Config;
use crate::exec::CommandLine;
use crate::nixfile::{find_units, ConfigurationUnit};
use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Arguments for update
#[derive(Debug, Default)]
pub struct UpdateArgs {
    /// Nix file or directory
    pub path: PathBuf,
    /// Walk the directory for every unit
    pub recursive: bool,
    /// Print commands only
    pub dry_run: bool,
    /// Update only this flake input
    pub input: Option<String>,
}

/// A single update to perform
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum UpdateStep {
    /// `nix flake update` in this directory
    Flake(PathBuf),
    /// Run the fetcher updater on this file
    Fetchers(PathBuf),
}

impl UpdateStep {
    /// The command carrying out this step.
    ///
    /// With `input`, flakes update that input alone and fetcher files are
    /// left untouched.
    #[must_use]
    pub fn command(&self, fetch_updater: &str, input: Option<&str>) -> Option<CommandLine> {
        match self {
            Self::Flake(dir) => Some(flake_update(dir, input)),
            Self::Fetchers(_) if input.is_some() => None,
            Self::Fetchers(file) => CommandLine::from_words(fetch_updater).map(|cmd| {
                cmd.arg(file)
                    .message(format!("Updating fetcher pins in {}", file.display()))
            }),
        }
    }
}

/// `nix flake update [INPUT] --flake DIR`
#[must_use]
pub fn flake_update(dir: &Path, input: Option<&str>) -> CommandLine {
    let cmd = CommandLine::new("nix").args(["flake", "update"]);
    let cmd = match input {
        Some(i) => cmd.arg(i).message(format!("Updating flake input {i}")),
        None => cmd.message(format!("Updating all flake inputs of {}", dir.display())),
    };
    cmd.arg("--flake").arg(dir)
}

/// Steps for a set of units.
///
/// Flakes are updated once per directory; a flake's own file is not also
/// passed to the fetcher updater.
#[must_use]
pub fn plan(units: &[ConfigurationUnit]) -> Vec<UpdateStep> {
    let mut steps = BTreeSet::new();
    for unit in units {
        if unit.is_composite() {
            steps.insert(UpdateStep::Flake(unit.directory().to_path_buf()));
        } else if unit.has_remote_fetch() {
            steps.insert(UpdateStep::Fetchers(unit.path().to_path_buf()));
        } else {
            debug!("Nothing to update in {}", unit);
        }
    }
    steps.into_iter().collect()
}

/// Unmerged paths reported by git for a flake checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflicts {
    /// Clean tree
    None,
    /// Only the lock file conflicts; it is safe to reset
    LockFile,
    /// Anything else needs a human
    Other(Vec<String>),
}

impl Conflicts {
    /// Classify `git diff --name-only --diff-filter=U` output
    #[must_use]
    pub fn from_git_output(output: &str) -> Self {
        let paths: Vec<String> = output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();

        match paths.as_slice() {
            [] => Self::None,
            [only] if only == "flake.lock" => Self::LockFile,
            _ => Self::Other(paths),
        }
    }
}

/// Reset a conflicting `flake.lock` so it can be regenerated.
///
/// Directories that are not git checkouts are left alone.
///
/// # Errors
///
/// Conflicts other than `flake.lock`, or git failed while resetting.
pub fn resolve_lock_conflicts(dir: &Path, dry_run: bool) -> Result<()> {
    let git = || CommandLine::new("git").arg("-C").arg(dir).dry(dry_run);
    let check = git()
        .args(["diff", "--name-only", "--diff-filter=U"])
        .message("Checking for conflicts");

    if dry_run {
        return check.run();
    }

    let output = match check.run_capture() {
        Ok(out) => out,
        Err(e) => {
            debug!("Not checking for conflicts in {}: {:#}", dir.display(), e);
            return Ok(());
        }
    };

    match Conflicts::from_git_output(&output) {
        Conflicts::None => Ok(()),
        Conflicts::LockFile => {
            git()
                .args(["reset", "flake.lock"])
                .message("Resetting flake.lock")
                .run()?;
            git()
                .args(["checkout", "flake.lock"])
                .message("Checking out flake.lock")
                .run()
        }
        Conflicts::Other(paths) => bail!(
            "Conflicts detected that were more than just flake.lock: {}",
            paths.join(", ")
        ),
    }
}

/// Update the flake in `dir`, clearing a conflicting lock file first
///
/// # Errors
///
/// Unresolvable conflicts or a failing `nix flake update`.
pub fn update_flake(dir: &Path, input: Option<&str>, dry_run: bool) -> Result<()> {
    resolve_lock_conflicts(dir, dry_run)?;
    flake_update(dir, input).dry(dry_run).run()
}

/// Run the update command
pub fn run(config: &Config, args: UpdateArgs) -> Result<()> {
    let path = args
        .path
        .canonicalize()
        .with_context(|| format!("Cannot access {}", args.path.display()))?;

    let units = if args.recursive && path.is_dir() {
        find_units(&path)
    } else {
        vec![ConfigurationUnit::classify(&path)]
    };

    let input = args.input.as_deref();
    let commands: Vec<CommandLine> = plan(&units)
        .into_iter()
        .filter_map(|step| {
            let cmd = step.command(&config.tools.fetch_updater, input);
            if cmd.is_none() {
                match input {
                    Some(i) => debug!("Input {} does not apply to {:?}", i, step),
                    None => warn!("No fetch updater configured, skipping {:?}", step),
                }
            }
            cmd
        })
        .collect();

    if commands.is_empty() {
        println!("Nothing to update in {}", path.display());
        return Ok(());
    }

    for cmd in commands {
        cmd.dry(args.dry_run).run()?;
    }

    Ok(())
}
