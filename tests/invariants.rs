// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Invariant tests for gcroot discovery and cleanup
//!
//! These tests verify:
//! 1. Every discovered root is a genuine two-hop chain into the store
//! 2. A root is selected only when registered strictly before the cutoff
//! 3. Cleaning is idempotent: a second pass finds nothing to do

#![cfg(unix)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use nh::age::{AgeFilter, Cutoff, UnknownAgePolicy};
use nh::commands::gcr_clean::clean;
use nh::gcroot::Registration;
use nh::registry::Registry;
use nh::scanner::{scan_path, ScanConfig};
use proptest::prelude::*;
use std::fs::{self, File};
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

struct Tree {
    _dir: TempDir,
    base: PathBuf,
}

impl Tree {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let base = dir.path().canonicalize().unwrap();
        for sub in ["store", "registry", "hops", "work"] {
            fs::create_dir_all(base.join(sub)).unwrap();
        }
        Self { _dir: dir, base }
    }

    fn config(&self) -> ScanConfig {
        ScanConfig {
            store_prefix: self.base.join("store"),
            ..ScanConfig::default()
        }
    }

    fn registry(&self) -> Registry {
        Registry::new(self.base.join("registry"), ".root")
    }

    fn work(&self) -> PathBuf {
        self.base.join("work")
    }

    fn root(&self, name: &str, registered: Option<DateTime<Utc>>) -> PathBuf {
        let dest = self.base.join("store").join(name);
        fs::create_dir_all(&dest).unwrap();
        let hop = self.base.join("hops").join(name);
        symlink(&dest, &hop).unwrap();
        let link = self.work().join(format!("{name}-result"));
        symlink(&hop, &link).unwrap();

        if let Some(at) = registered {
            let file = File::create(self.registry().record_path(&hop)).unwrap();
            file.set_modified(SystemTime::from(at)).unwrap();
        }
        link
    }

    fn scan(&self) -> Vec<nh::gcroot::GcRoot> {
        scan_path(&self.work(), &self.config(), &self.registry()).unwrap()
    }
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

// =============================================================================
// Invariant 1: Chain integrity
// =============================================================================

#[test]
fn test_every_root_is_a_two_hop_chain_into_the_store() {
    let tree = Tree::new();
    tree.root("aaa-one", None);
    tree.root("bbb-two", Some(Utc::now()));

    // Noise that must never be reported
    fs::write(tree.work().join("plain.txt"), "x").unwrap();
    symlink(tree.base.join("store/aaa-one"), tree.work().join("one-hop")).unwrap();
    symlink(tree.base.join("missing"), tree.work().join("dangling")).unwrap();
    let outside = tree.base.join("elsewhere");
    fs::create_dir_all(&outside).unwrap();
    symlink(&outside, tree.base.join("hops/outside")).unwrap();
    symlink(tree.base.join("hops/outside"), tree.work().join("outside")).unwrap();

    let store = tree.base.join("store");
    let roots = tree.scan();
    assert_eq!(roots.len(), 2);

    for root in &roots {
        assert!(is_symlink(root.link_path()));
        assert!(is_symlink(root.intermediate()));
        assert_eq!(fs::read_link(root.link_path()).unwrap(), root.intermediate());
        assert!(root.destination().starts_with(&store));
        assert_eq!(
            fs::canonicalize(root.intermediate()).unwrap(),
            root.destination()
        );
        assert!(fs::read_link(root.intermediate()).unwrap().starts_with(&store));
    }
}

#[test]
fn test_cleaning_a_longer_chain_keeps_the_younger_link_working() {
    let tree = Tree::new();
    // work/a -> work/b -> hops/c -> store/x
    let dest = tree.base.join("store/x");
    fs::create_dir_all(&dest).unwrap();
    let c = tree.base.join("hops/c");
    symlink(&dest, &c).unwrap();
    let b = tree.work().join("b");
    symlink(&c, &b).unwrap();
    let a = tree.work().join("a");
    symlink(&b, &a).unwrap();

    let register = |hop: &Path, age: Duration| {
        let file = File::create(tree.registry().record_path(hop)).unwrap();
        file.set_modified(SystemTime::from(Utc::now() - age)).unwrap();
    };
    register(&b, Duration::hours(1));
    register(&c, Duration::days(10));

    let roots = tree.scan();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].link_path(), b);

    let cutoff = Cutoff::parse_relative_to("7 days ago", Utc::now()).unwrap();
    let selection = AgeFilter::new(cutoff, UnknownAgePolicy::Exclude).select(roots);
    let report = clean(cutoff, selection, false);

    assert_eq!(report.removed.len(), 1);
    assert!(!is_symlink(&b));
    // a was never a gcroot of its own; it dangles only because b was one
    assert!(is_symlink(&a));
    assert!(dest.is_dir());
}

#[test]
fn test_scan_is_read_only() {
    let tree = Tree::new();
    let link = tree.root("ccc-three", None);

    let before = fs::read_link(&link).unwrap();
    let first = tree.scan();
    let second = tree.scan();

    assert_eq!(first, second);
    assert_eq!(fs::read_link(&link).unwrap(), before);
}

// =============================================================================
// Invariant 2: Age boundary
// =============================================================================

#[test]
fn test_default_cutoff_selects_everything_registered() {
    let tree = Tree::new();
    tree.root("ddd-old", Some(Utc::now() - Duration::days(30)));
    tree.root("eee-new", Some(Utc::now() - Duration::seconds(2)));

    let cutoff = Cutoff::from_expression(None).unwrap();
    let selection = AgeFilter::new(cutoff, UnknownAgePolicy::Exclude).select(tree.scan());
    assert_eq!(selection.eligible.len(), 2);
    assert!(selection.retained.is_empty());
}

#[test]
fn test_unknown_registration_never_selected_by_default() {
    let tree = Tree::new();
    tree.root("fff-unknown", None);

    let cutoff = Cutoff::at(Utc::now() + Duration::days(365));
    let selection = AgeFilter::new(cutoff, UnknownAgePolicy::default()).select(tree.scan());
    assert!(selection.eligible.is_empty());
    assert_eq!(selection.unknown.len(), 1);
}

proptest! {
    #[test]
    fn prop_selected_iff_strictly_before_cutoff(reg in -10_000i64..10_000, cut in -10_000i64..10_000) {
        let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let registered = epoch + Duration::seconds(reg);
        let cutoff = Cutoff::at(epoch + Duration::seconds(cut));

        for policy in [UnknownAgePolicy::Exclude, UnknownAgePolicy::Include] {
            let filter = AgeFilter::new(cutoff, policy);
            prop_assert_eq!(
                filter.is_eligible(Registration::Known(registered)),
                reg < cut
            );
        }
    }

    #[test]
    fn prop_relative_ages_land_in_the_past(n in 0u32..5_000, unit in "(minutes|hours|days|weeks)") {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 30, 0).unwrap();
        let cutoff = Cutoff::parse_relative_to(&format!("{n} {unit} ago"), now).unwrap();
        prop_assert!(cutoff.instant() <= now);
    }
}

// =============================================================================
// Invariant 3: Idempotent cleanup
// =============================================================================

#[test]
fn test_second_clean_finds_nothing() {
    let tree = Tree::new();
    let stale = tree.root("ggg-stale", Some(Utc::now() - Duration::days(10)));
    let fresh = tree.root("hhh-fresh", Some(Utc::now()));

    let cutoff = Cutoff::parse_relative_to("7 days ago", Utc::now()).unwrap();
    let filter = AgeFilter::new(cutoff, UnknownAgePolicy::Exclude);

    let first = clean(cutoff, filter.select(tree.scan()), false);
    assert_eq!(first.removed.len(), 1);
    assert_eq!(first.removed[0].link_path, stale);
    assert!(first.failed.is_empty());

    let second = clean(cutoff, filter.select(tree.scan()), false);
    assert!(second.removed.is_empty());
    assert!(second.failed.is_empty());
    assert_eq!(second.retained, 1);

    assert!(!is_symlink(&stale));
    assert!(is_symlink(&fresh));
    assert!(tree.base.join("store/ggg-stale").is_dir());
}

#[test]
fn test_dry_run_reports_the_same_roots_as_a_real_run() {
    let tree = Tree::new();
    tree.root("iii-a", Some(Utc::now() - Duration::days(3)));
    tree.root("jjj-b", Some(Utc::now() - Duration::days(4)));

    let cutoff = Cutoff::parse_relative_to("1 day ago", Utc::now()).unwrap();
    let filter = AgeFilter::new(cutoff, UnknownAgePolicy::Exclude);

    let dry = clean(cutoff, filter.select(tree.scan()), true);
    assert_eq!(tree.scan().len(), 2);

    let real = clean(cutoff, filter.select(tree.scan()), false);
    let mut dry_links: Vec<_> = dry.removed.iter().map(|r| r.link_path.clone()).collect();
    let mut real_links: Vec<_> = real.removed.iter().map(|r| r.link_path.clone()).collect();
    dry_links.sort();
    real_links.sort();
    assert_eq!(dry_links, real_links);
    assert!(tree.scan().is_empty());
}
