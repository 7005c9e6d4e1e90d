// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! gcr-clean command - finds gcroots under a directory and removes stale ones

use crate::age::{AgeFilter, Cutoff, Selection, UnknownAgePolicy};
use crate::config::Config;
use crate::gcroot::{GcRoot, RemovedRoot};
use crate::registry::Registry;
use crate::scanner::{scan_path, ScanConfig};
use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

/// Arguments for gcr-clean
#[derive(Debug, Default)]
pub struct GcrCleanArgs {
    /// Age expression; roots registered before it are removed
    pub age: Option<String>,
    /// Report without removing
    pub dry_run: bool,
    /// Directory to scan (home directory when absent)
    pub root: Option<PathBuf>,
    /// Only look at direct children of the root
    pub shallow: bool,
    /// Override for the unknown-registration policy
    pub unknown: Option<UnknownAgePolicy>,
    /// Emit the report as JSON
    pub json: bool,
}

/// A root that could not be removed
#[derive(Debug, Clone, Serialize)]
pub struct FailedRoot {
    /// The link
    pub link_path: PathBuf,
    /// Why removal failed
    pub error: String,
}

/// Outcome of a clean run
#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    /// Whether this was a dry run
    pub dry_run: bool,
    /// Cutoff applied
    pub cutoff: Cutoff,
    /// Removed, or would-be removed in a dry run
    pub removed: Vec<RemovedRoot>,
    /// Roots younger than the cutoff
    pub retained: usize,
    /// Roots left alone because their registration time is unknown
    pub unknown: Vec<PathBuf>,
    /// Removal failures
    pub failed: Vec<FailedRoot>,
}

/// Run the gcr-clean command
pub fn run(config: &Config, args: GcrCleanArgs) -> Result<()> {
    let cutoff = Cutoff::from_expression(args.age.as_deref())
        .context("Could not understand --age")?;

    let root = match args.root {
        Some(r) => r,
        None => directories::BaseDirs::new()
            .map(|d| d.home_dir().to_path_buf())
            .context("Cannot determine home directory; pass --root")?,
    };

    let scan_config = ScanConfig {
        recursive: !args.shallow,
        store_prefix: config.store.prefix.clone(),
        exclude: config.gcroots.exclude.clone(),
    };
    let registry = Registry::from_config(&config.store);

    info!("Looking for gcroots in {}", root.display());
    let roots = scan_path(&root, &scan_config, &registry)
        .with_context(|| format!("Failed to scan {}", root.display()))?;

    let policy = args.unknown.unwrap_or(config.gcroots.unknown_age);
    let selection = AgeFilter::new(cutoff, policy).select(roots);
    let report = clean(cutoff, selection, args.dry_run);

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    } else {
        print!("{}", render_report(&report));
        println!(
            "{}",
            summary(&report).if_supports_color(Stream::Stdout, |t| t.bold())
        );
    }

    Ok(())
}

/// Remove every eligible root, or only record them when `dry_run`.
///
/// Failures are collected and never stop the batch.
#[must_use]
pub fn clean(cutoff: Cutoff, selection: Selection, dry_run: bool) -> CleanReport {
    let Selection {
        eligible,
        retained,
        unknown,
    } = selection;

    let mut report = CleanReport {
        dry_run,
        cutoff,
        removed: Vec::with_capacity(eligible.len()),
        retained: retained.len(),
        unknown: unknown.iter().map(|r| r.link_path().to_path_buf()).collect(),
        failed: Vec::new(),
    };

    for root in eligible {
        if dry_run {
            report.removed.push(RemovedRoot::from(&root));
            continue;
        }
        remove_one(root, &mut report);
    }

    report
}

fn remove_one(root: GcRoot, report: &mut CleanReport) {
    let link = root.link_path().to_path_buf();
    match root.remove() {
        Ok(removed) => report.removed.push(removed),
        Err(e) => {
            if e.is_not_found() {
                warn!("{} was already removed", link.display());
            } else {
                warn!("{}", e);
            }
            report.failed.push(FailedRoot {
                link_path: link,
                error: e.to_string(),
            });
        }
    }
}

/// One line per root, identical between dry and real runs except the verb
#[must_use]
pub fn render_report(report: &CleanReport) -> String {
    let verb = if report.dry_run { "Would remove" } else { "Removed" };

    let removed = report.removed.iter().map(|r| {
        format!(
            "{verb} {} -> {} (registered {})",
            r.link_path.display(),
            r.destination.display(),
            r.registration
        )
    });
    let unknown = report
        .unknown
        .iter()
        .map(|link| format!("Skipped {} (registration time unknown)", link.display()));
    let failed = report
        .failed
        .iter()
        .map(|f| format!("Failed to remove {}: {}", f.link_path.display(), f.error));

    removed
        .chain(unknown)
        .chain(failed)
        .map(|line| line + "\n")
        .collect()
}

/// Totals line
#[must_use]
pub fn summary(report: &CleanReport) -> String {
    let n = report.removed.len();
    let noun = if n == 1 { "gcroot" } else { "gcroots" };
    let action = if report.dry_run { "would be removed" } else { "removed" };
    format!(
        "{n} {noun} {action}, {} kept, {} unknown, {} failed",
        report.retained,
        report.unknown.len(),
        report.failed.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcroot::Registration;
    use chrono::{TimeZone, Utc};

    fn report(dry_run: bool) -> CleanReport {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        CleanReport {
            dry_run,
            cutoff: Cutoff::at(Utc.with_ymd_and_hms(2024, 3, 8, 9, 0, 0).unwrap()),
            removed: vec![RemovedRoot {
                link_path: PathBuf::from("/home/me/proj/result"),
                destination: PathBuf::from("/nix/store/abc-hello-2.12"),
                registration: Registration::Known(t),
            }],
            retained: 2,
            unknown: vec![PathBuf::from("/home/me/old/result")],
            failed: vec![],
        }
    }

    #[test]
    fn test_render_dry_run() {
        insta::assert_snapshot!(render_report(&report(true)), @r###"
        Would remove /home/me/proj/result -> /nix/store/abc-hello-2.12 (registered 2024-03-01 09:00:00 UTC)
        Skipped /home/me/old/result (registration time unknown)
        "###);
    }

    #[test]
    fn test_dry_and_real_reports_differ_only_in_verb() {
        let dry = render_report(&report(true));
        let real = render_report(&report(false));
        assert_eq!(dry.replace("Would remove", "Removed"), real);
    }

    #[test]
    fn test_summary() {
        assert_eq!(
            summary(&report(true)),
            "1 gcroot would be removed, 2 kept, 1 unknown, 0 failed"
        );
        assert_eq!(
            summary(&report(false)),
            "1 gcroot removed, 2 kept, 1 unknown, 0 failed"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_continues_past_a_vanished_root() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("store/abc-x");
        std::fs::create_dir_all(&dest).unwrap();
        let hop = dir.path().join("hop");
        symlink(&dest, &hop).unwrap();

        let links: Vec<PathBuf> = ["first", "second", "third"]
            .iter()
            .map(|name| dir.path().join(name))
            .collect();
        for link in &links {
            symlink(&hop, link).unwrap();
        }
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let roots = links
            .iter()
            .map(|l| GcRoot::new(l.clone(), hop.clone(), dest.clone(), Registration::Known(t)))
            .collect();

        // Removed by someone else between scan and clean
        std::fs::remove_file(&links[1]).unwrap();

        let selection = Selection {
            eligible: roots,
            ..Default::default()
        };
        let report = clean(Cutoff::at(Utc::now()), selection, false);

        let removed: Vec<_> = report.removed.iter().map(|r| r.link_path.clone()).collect();
        assert_eq!(removed, vec![links[0].clone(), links[2].clone()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].link_path, links[1]);
        assert!(std::fs::symlink_metadata(&links[0]).is_err());
        assert!(std::fs::symlink_metadata(&links[2]).is_err());
        assert!(std::fs::symlink_metadata(&hop).is_ok());
    }

    #[test]
    fn test_clean_collects_failures() {
        let cutoff = Cutoff::at(Utc::now());
        let selection = Selection {
            eligible: vec![GcRoot::new(
                PathBuf::from("/nonexistent/nh-test/result"),
                PathBuf::from("/nonexistent/nh-test/.auto"),
                PathBuf::from("/nix/store/abc-x"),
                Registration::Unknown,
            )],
            ..Default::default()
        };

        let report = clean(cutoff, selection, false);
        assert!(report.removed.is_empty());
        assert_eq!(report.failed.len(), 1);
    }
}
