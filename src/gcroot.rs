// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Garbage collector roots discovered on the filesystem
//!
//! A gcroot here is an outer symlink whose target is itself a symlink that
//! finally resolves into the store:
//!
//! ```text
//! link_path -> intermediate -> /nix/store/<hash>-<name>
//! ```
//!
//! Removing the outer link is enough for the store's own collector to
//! reclaim the destination once nothing else references it.

use crate::error::GcRootError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// When a root was registered with the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "at", rename_all = "lowercase")]
pub enum Registration {
    /// Timestamp taken from the registry record
    Known(DateTime<Utc>),
    /// No registry record exists for this root
    Unknown,
}

impl Registration {
    /// The timestamp, if one was recorded
    #[must_use]
    pub fn time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Known(t) => Some(*t),
            Self::Unknown => None,
        }
    }
}

impl std::fmt::Display for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S UTC")),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// A root found by a scan.
///
/// Not `Clone`; [`GcRoot::remove`] consumes it.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct GcRoot {
    link_path: PathBuf,
    intermediate: PathBuf,
    destination: PathBuf,
    registration: Registration,
}

impl GcRoot {
    pub(crate) fn new(
        link_path: PathBuf,
        intermediate: PathBuf,
        destination: PathBuf,
        registration: Registration,
    ) -> Self {
        Self {
            link_path,
            intermediate,
            destination,
            registration,
        }
    }

    /// The outer symlink that was discovered
    #[must_use]
    pub fn link_path(&self) -> &Path {
        &self.link_path
    }

    /// First hop of the chain
    #[must_use]
    pub fn intermediate(&self) -> &Path {
        &self.intermediate
    }

    /// Fully resolved store path
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Registration time of the root
    #[must_use]
    pub fn registration(&self) -> Registration {
        self.registration
    }

    /// Remove the outer link from the filesystem.
    ///
    /// Neither the intermediate link nor the store path are touched. The
    /// link must still be a symlink; if something else has taken its place
    /// since the scan, nothing is removed.
    ///
    /// # Errors
    ///
    /// [`GcRootError::NotFound`] if the link is already gone,
    /// [`GcRootError::Io`] for any other failure.
    pub fn remove(self) -> Result<RemovedRoot, GcRootError> {
        let meta = fs::symlink_metadata(&self.link_path)
            .map_err(|e| GcRootError::from_io(self.link_path.clone(), e))?;

        if !meta.file_type().is_symlink() {
            return Err(GcRootError::Io {
                path: self.link_path,
                source: io::Error::new(io::ErrorKind::Other, "no longer a symlink"),
            });
        }

        fs::remove_file(&self.link_path)
            .map_err(|e| GcRootError::from_io(self.link_path.clone(), e))?;

        debug!("Removed {}", self.link_path.display());

        Ok(RemovedRoot {
            link_path: self.link_path,
            destination: self.destination,
            registration: self.registration,
        })
    }
}

/// What is left of a root after removal, for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedRoot {
    /// The link that was removed
    pub link_path: PathBuf,
    /// Store path it protected
    pub destination: PathBuf,
    /// Registration time at scan
    pub registration: Registration,
}

impl From<&GcRoot> for RemovedRoot {
    fn from(root: &GcRoot) -> Self {
        Self {
            link_path: root.link_path.clone(),
            destination: root.destination.clone(),
            registration: root.registration,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn make_chain(dir: &TempDir) -> GcRoot {
        let store_path = dir.path().join("store-item");
        fs::create_dir(&store_path).unwrap();
        let intermediate = dir.path().join("auto-link");
        symlink(&store_path, &intermediate).unwrap();
        let link = dir.path().join("result");
        symlink(&intermediate, &link).unwrap();

        GcRoot::new(link, intermediate, store_path, Registration::Unknown)
    }

    #[test]
    fn test_remove_only_outer_link() {
        let dir = TempDir::new().unwrap();
        let root = make_chain(&dir);
        let intermediate = root.intermediate().to_path_buf();
        let destination = root.destination().to_path_buf();

        let removed = root.remove().unwrap();

        assert!(fs::symlink_metadata(&removed.link_path).is_err());
        assert!(fs::symlink_metadata(&intermediate).is_ok());
        assert!(destination.is_dir());
    }

    #[test]
    fn test_remove_missing_link_is_not_found() {
        let dir = TempDir::new().unwrap();
        let root = make_chain(&dir);
        fs::remove_file(root.link_path()).unwrap();

        let err = root.remove().unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_remove_refuses_replaced_link() {
        let dir = TempDir::new().unwrap();
        let root = make_chain(&dir);
        fs::remove_file(root.link_path()).unwrap();
        fs::write(root.link_path(), "not a link").unwrap();
        let link = root.link_path().to_path_buf();

        let err = root.remove().unwrap_err();
        assert!(!err.is_not_found());
        assert!(link.is_file());
    }

    #[test]
    fn test_registration_display() {
        let t = DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(Registration::Known(t).to_string(), "2024-03-01 12:00:00 UTC");
        assert_eq!(Registration::Unknown.to_string(), "unknown");
        assert_eq!(Registration::Known(t).time(), Some(t));
    }
}
