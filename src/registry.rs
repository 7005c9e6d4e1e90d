// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Reader for the store's gcroot registration records
//!
//! The store keeps one record per registered root inside a registry
//! directory. The record for a link lives at
//! `<dir>/<encoded link path><suffix>` and its modification time is the
//! moment the root was registered. Records are never written here.

use crate::config::StoreConfig;
use crate::gcroot::Registration;
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Read-only view of the registry directory
#[derive(Debug, Clone)]
pub struct Registry {
    dir: PathBuf,
    suffix: String,
}

impl Registry {
    /// Registry rooted at `dir`, record names ending in `suffix`
    pub fn new(dir: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            suffix: suffix.into(),
        }
    }

    /// Registry described by the `[store]` config section
    #[must_use]
    pub fn from_config(store: &StoreConfig) -> Self {
        Self::new(&store.registry_dir, &store.registry_suffix)
    }

    /// Registry directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record that would register `link`
    #[must_use]
    pub fn record_path(&self, link: &Path) -> PathBuf {
        let mut name = encode_path(link);
        name.push_str(&self.suffix);
        self.dir.join(name)
    }

    /// Registration time for `link`.
    ///
    /// A missing record means the root is unregistered. Other read errors
    /// are logged and treated the same way.
    #[must_use]
    pub fn registration_time(&self, link: &Path) -> Registration {
        let record = self.record_path(link);

        match record_mtime(&record) {
            Ok(time) => Registration::Known(time),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No registry record at {}", record.display());
                Registration::Unknown
            }
            Err(e) => {
                warn!("Cannot read registry record {}: {}", record.display(), e);
                Registration::Unknown
            }
        }
    }
}

/// `lstat` mtime; records may themselves be symlinks
fn record_mtime(record: &Path) -> io::Result<DateTime<Utc>> {
    let modified = fs::symlink_metadata(record)?.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}

/// Encode an absolute path into a single file name.
///
/// `%` becomes `%25` and `/` becomes `%2F`, so the mapping is reversible and
/// distinct paths never collide.
#[must_use]
pub fn encode_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut out = String::with_capacity(raw.len() + 16);
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            c => out.push(c),
        }
    }
    out
}
