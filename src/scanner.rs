// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Gcroot scanning
//!
//! Walks a directory tree without following symlinks and collects every
//! two-hop link that ends up inside the store. Entries that cannot be read
//! are skipped; only an unusable scan root is an error.

use crate::error::MalformedChain;
use crate::gcroot::GcRoot;
use crate::registry::Registry;
use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Configuration for scanning
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Descend into subdirectories (false = direct children only)
    pub recursive: bool,
    /// Store prefix that destinations must live under
    pub store_prefix: PathBuf,
    /// Glob patterns for directories that are not descended into
    pub exclude: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            recursive: true,
            store_prefix: PathBuf::from("/nix/store"),
            exclude: Vec::new(),
        }
    }
}

/// A resolved two-hop chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    /// Absolute path of the first hop
    pub intermediate: PathBuf,
    /// Final resolution inside the store
    pub destination: PathBuf,
}

/// Scan `root` for gcroots.
///
/// The returned list is fully materialized; nothing on disk is changed.
///
/// # Errors
///
/// Fails if `root` does not exist, is not a directory, or an exclude pattern
/// is not a valid glob.
pub fn scan_path(root: &Path, config: &ScanConfig, registry: &Registry) -> Result<Vec<GcRoot>> {
    let root = root
        .canonicalize()
        .with_context(|| format!("Cannot access scan root {}", root.display()))?;
    if !root.is_dir() {
        bail!("Scan root {} is not a directory", root.display());
    }

    let store = config
        .store_prefix
        .canonicalize()
        .unwrap_or_else(|_| config.store_prefix.clone());
    let exclude = build_exclude_set(&config.exclude)?;

    debug!(
        "Scanning {} for gcroots into {} (recursive: {})",
        root.display(),
        store.display(),
        config.recursive
    );

    let mut walker = WalkDir::new(&root).min_depth(1).follow_links(false);
    if !config.recursive {
        walker = walker.max_depth(1);
    }

    let mut roots = Vec::new();
    let entries = walker.into_iter().filter_entry(|e| {
        !(e.file_type().is_dir() && exclude.is_match(e.path()))
    });

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_symlink() {
            continue;
        }

        let link = entry.path();
        match inspect_link(link, &store) {
            Ok(chain) => {
                let registration = registry.registration_time(&chain.intermediate);
                trace!(
                    "gcroot {} -> {} -> {} ({})",
                    link.display(),
                    chain.intermediate.display(),
                    chain.destination.display(),
                    registration
                );
                roots.push(GcRoot::new(
                    link.to_path_buf(),
                    chain.intermediate,
                    chain.destination,
                    registration,
                ));
            }
            Err(reason) => {
                trace!("Skipping {}: {}", link.display(), reason);
            }
        }
    }

    debug!("Found {} gcroots under {}", roots.len(), root.display());
    Ok(roots)
}

/// Check whether `link` is a two-hop chain into `store`.
///
/// Exactly two hops: `link` points at an intermediate symlink whose own
/// target lies inside `store`.
///
/// `store` should already be canonical, since the destination is compared
/// after full resolution.
///
/// # Errors
///
/// Returns the reason the link does not qualify.
pub fn inspect_link(link: &Path, store: &Path) -> Result<Chain, MalformedChain> {
    let meta = fs::symlink_metadata(link).map_err(MalformedChain::Broken)?;
    if !meta.file_type().is_symlink() {
        return Err(MalformedChain::NotASymlink);
    }

    let target = fs::read_link(link).map_err(MalformedChain::Broken)?;
    let intermediate = absolute_target(link, &target).map_err(MalformedChain::Broken)?;

    let hop = fs::symlink_metadata(&intermediate).map_err(MalformedChain::Broken)?;
    if !hop.file_type().is_symlink() {
        return Err(MalformedChain::OneHop(intermediate));
    }

    let destination = fs::canonicalize(&intermediate).map_err(MalformedChain::Broken)?;
    if !destination.starts_with(store) {
        return Err(MalformedChain::OutsideStore(destination));
    }

    // The first hop must point straight into the store; otherwise it is
    // itself the outer link of a shorter chain.
    let second = fs::read_link(&intermediate).map_err(MalformedChain::Broken)?;
    let second = absolute_target(&intermediate, &second).map_err(MalformedChain::Broken)?;
    if !second.starts_with(store) {
        return Err(MalformedChain::ExtraHops(intermediate));
    }

    Ok(Chain {
        intermediate,
        destination,
    })
}

/// Absolute, normalized path of a link target.
///
/// Relative targets are taken against the link's directory. Only the parent
/// is canonicalized so the target itself stays unresolved.
fn absolute_target(link: &Path, target: &Path) -> std::io::Result<PathBuf> {
    let joined = match link.parent() {
        Some(parent) if target.is_relative() => parent.join(target),
        _ => target.to_path_buf(),
    };

    match (joined.parent(), joined.file_name()) {
        (Some(parent), Some(name)) => Ok(parent.canonicalize()?.join(name)),
        _ => Ok(joined),
    }
}

fn build_exclude_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .with_context(|| format!("Invalid exclude pattern: {pattern}"))?;
        builder.add(glob);
    }
    builder.build().context("Failed to build exclude patterns")
}
