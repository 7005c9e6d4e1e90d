// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Classification of nix configuration files
//!
//! A unit is either *composite* (a flake, pinning its own inputs) or
//! *standalone*, and independently may or may not call one of the remote
//! fetchers that `update-nix-fetchgit` knows how to bump. Classification is
//! text matching only and never fails; anything unreadable is standalone
//! without fetchers.

use globset::{Glob, GlobMatcher};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Marker file of a composite unit
pub const FLAKE_FILE: &str = "flake.nix";
/// Entry point of a standalone directory
pub const DEFAULT_FILE: &str = "default.nix";

/// Kind of configuration unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// Relies on ambient inputs (channels, `NIX_PATH`)
    Standalone,
    /// Declares and pins its own inputs
    Composite,
}

/// Result of classifying a unit's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Standalone or composite
    pub kind: UnitKind,
    /// Whether a remote fetcher is called
    pub remote_fetch: bool,
}

impl Classification {
    const NOTHING: Self = Self {
        kind: UnitKind::Standalone,
        remote_fetch: false,
    };
}

fn outputs_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*outputs\s*=").expect("static regex"))
}

fn inputs_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\binputs\b").expect("static regex"))
}

fn fetcher_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(?:fetchFromGitHub|fetchFromGitLab|fetchFromGitea|fetchFromSourcehut|fetchgitPrivate|fetchgit|builtins\.fetchGit)\b",
        )
        .expect("static regex")
    })
}

/// Classify nix source text.
///
/// `file_name` is the base name of the file the text came from, if any.
/// Whole-line `#` comments are ignored.
#[must_use]
pub fn classify_text(file_name: Option<&str>, text: &str) -> Classification {
    let code: String = text
        .lines()
        .filter(|l| !l.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n");

    let composite = file_name == Some(FLAKE_FILE)
        || (outputs_re().is_match(&code) && inputs_re().is_match(&code));

    Classification {
        kind: if composite {
            UnitKind::Composite
        } else {
            UnitKind::Standalone
        },
        remote_fetch: fetcher_re().is_match(&code),
    }
}

/// A nix file or directory and how it classifies
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigurationUnit {
    path: PathBuf,
    classification: Classification,
}

impl ConfigurationUnit {
    /// Inspect `path`.
    ///
    /// A directory is composite when it holds `flake.nix`; otherwise its
    /// `default.nix` (if any) decides whether fetchers are used.
    #[must_use]
    pub fn classify(path: &Path) -> Self {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        let classification = if path.is_dir() {
            let flake = path.join(FLAKE_FILE);
            if flake.is_file() {
                let mut c = classify_file(&flake);
                c.kind = UnitKind::Composite;
                c
            } else {
                let default = path.join(DEFAULT_FILE);
                if default.is_file() {
                    classify_file(&default)
                } else {
                    Classification::NOTHING
                }
            }
        } else {
            classify_file(&path)
        };

        Self {
            path,
            classification,
        }
    }

    /// Absolute path of the unit
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The classification
    #[must_use]
    pub fn classification(&self) -> Classification {
        self.classification
    }

    /// Whether the unit is a flake
    #[must_use]
    pub fn is_composite(&self) -> bool {
        self.classification.kind == UnitKind::Composite
    }

    /// Whether the unit calls a remote fetcher
    #[must_use]
    pub fn has_remote_fetch(&self) -> bool {
        self.classification.remote_fetch
    }

    /// Directory holding the unit (the unit itself when it is a directory)
    #[must_use]
    pub fn directory(&self) -> &Path {
        if self.path.is_dir() {
            &self.path
        } else {
            self.path.parent().unwrap_or(&self.path)
        }
    }
}

impl std::fmt::Display for ConfigurationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

fn classify_file(path: &Path) -> Classification {
    match fs::read_to_string(path) {
        Ok(text) => {
            let name = path.file_name().and_then(|n| n.to_str());
            classify_text(name, &text)
        }
        Err(e) => {
            debug!("Cannot read {}: {}", path.display(), e);
            Classification::NOTHING
        }
    }
}

fn nix_glob() -> &'static GlobMatcher {
    static GLOB: OnceLock<GlobMatcher> = OnceLock::new();
    GLOB.get_or_init(|| {
        Glob::new("*.nix")
            .expect("static glob")
            .compile_matcher()
    })
}

/// Every `*.nix` file under `dir`, classified.
///
/// Honors `.gitignore` and skips hidden entries. Result order follows the
/// walk and is sorted by path for stable output.
#[must_use]
pub fn find_units(dir: &Path) -> Vec<ConfigurationUnit> {
    let mut units: Vec<_> = ignore::WalkBuilder::new(dir)
        .build()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                debug!("Skipping entry: {}", e);
                None
            }
        })
        .filter(|e| e.file_type().is_some_and(|t| t.is_file()))
        .filter(|e| nix_glob().is_match(e.file_name()))
        .map(|e| ConfigurationUnit::classify(e.path()))
        .collect();

    units.sort_by(|a, b| a.path.cmp(&b.path));
    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FLAKE: &str = r#"{
  description = "my system";
  inputs.nixpkgs.url = "github:NixOS/nixpkgs/nixos-unstable";
  outputs = { self, nixpkgs }: { };
}"#;

    const PINNED: &str = r#"{ fetchFromGitHub, stdenv }:
stdenv.mkDerivation {
  src = fetchFromGitHub {
    owner = "foo";
    repo = "bar";
    rev = "0000";
    sha256 = "";
  };
}"#;

    #[test]
    fn test_classify_text_flake_by_name() {
        let c = classify_text(Some("flake.nix"), "{ }");
        assert_eq!(c.kind, UnitKind::Composite);
        assert!(!c.remote_fetch);
    }

    #[test]
    fn test_classify_text_flake_by_content() {
        let c = classify_text(Some("system.nix"), FLAKE);
        assert_eq!(c.kind, UnitKind::Composite);
    }

    #[test]
    fn test_classify_text_fetchers() {
        let c = classify_text(Some("bar.nix"), PINNED);
        assert_eq!(
            c,
            Classification {
                kind: UnitKind::Standalone,
                remote_fetch: true
            }
        );
        assert!(classify_text(None, "src = builtins.fetchGit { url = x; };").remote_fetch);
        assert!(classify_text(None, "src = fetchgit { };").remote_fetch);
        assert!(!classify_text(None, "src = fetchurl { };").remote_fetch);
        assert!(!classify_text(None, "myfetchgitWrapper").remote_fetch);
    }

    #[test]
    fn test_classify_ignores_comments() {
        let c = classify_text(None, "# src = fetchFromGitHub { };\n{ }");
        assert!(!c.remote_fetch);
    }

    #[test]
    fn test_classify_garbage_is_nothing() {
        assert_eq!(classify_text(None, "\u{0}\u{1}}}{{"), Classification::NOTHING);
    }

    #[test]
    fn test_classify_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("flake.nix"), FLAKE).unwrap();
        let unit = ConfigurationUnit::classify(dir.path());
        assert!(unit.is_composite());
        assert_eq!(unit.directory(), dir.path().canonicalize().unwrap());

        let plain = TempDir::new().unwrap();
        fs::write(plain.path().join("default.nix"), PINNED).unwrap();
        let unit = ConfigurationUnit::classify(plain.path());
        assert!(!unit.is_composite());
        assert!(unit.has_remote_fetch());
    }

    #[test]
    fn test_classify_missing_path() {
        let unit = ConfigurationUnit::classify(Path::new("/does/not/exist.nix"));
        assert_eq!(unit.classification(), Classification::NOTHING);
    }

    #[test]
    fn test_find_units() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("flake.nix"), FLAKE).unwrap();
        fs::create_dir(dir.path().join("pkgs")).unwrap();
        fs::write(dir.path().join("pkgs/bar.nix"), PINNED).unwrap();
        fs::write(dir.path().join("pkgs/README.md"), "fetchFromGitHub").unwrap();
        fs::create_dir(dir.path().join(".hidden")).unwrap();
        fs::write(dir.path().join(".hidden/x.nix"), PINNED).unwrap();

        let units = find_units(dir.path());
        assert_eq!(units.len(), 2);
        assert!(units[0].is_composite());
        assert!(units[1].has_remote_fetch());
    }
}
