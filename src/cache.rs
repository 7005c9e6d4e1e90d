// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Key/value cache with per-entry expiry
//!
//! Used by `search` to avoid evaluating the whole package set on every call.
//! Entries are JSON documents stored one per file under the cache directory,
//! named by the SHA-256 of the key.

use crate::error::CacheError;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A cache whose entries expire
pub trait KeyValueCache {
    /// Fetch a live entry; expired or absent entries are `None`
    ///
    /// # Errors
    ///
    /// Storage or decoding failures.
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError>;

    /// Store `value` for `ttl`
    ///
    /// # Errors
    ///
    /// Storage or encoding failures.
    fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>;

    /// Drop an entry if present
    ///
    /// # Errors
    ///
    /// Storage failures.
    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Serialize, Deserialize)]
struct Entry<T> {
    key: String,
    expires_at: DateTime<Utc>,
    value: T,
}

/// Cache stored as JSON files in a directory
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Cache rooted at `dir` (created lazily on first write)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }
}

impl KeyValueCache for FileCache {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let path = self.entry_path(key);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        let entry: Entry<T> = serde_json::from_str(&content)
            .map_err(|source| CacheError::Encoding { path: path.clone(), source })?;

        if entry.key != key || entry.expires_at <= Utc::now() {
            debug!("Cache entry for {} expired", key);
            self.remove(key)?;
            return Ok(None);
        }

        Ok(Some(entry.value))
    }

    fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(|source| CacheError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.entry_path(key);
        let entry = Entry {
            key: key.to_string(),
            expires_at: Utc::now() + ttl,
            value,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|source| CacheError::Encoding { path: path.clone(), source })?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| CacheError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| CacheError::Io { path, source })
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }
}

/// In-process cache, mostly for tests
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RefCell<HashMap<String, (DateTime<Utc>, serde_json::Value)>>,
}

impl MemoryCache {
    /// Empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueCache for MemoryCache {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let mut entries = self.entries.borrow_mut();
        let Some((expires_at, value)) = entries.get(key) else {
            return Ok(None);
        };
        if *expires_at <= Utc::now() {
            entries.remove(key);
            return Ok(None);
        }
        serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|source| CacheError::Encoding {
                path: PathBuf::from(key),
                source,
            })
    }

    fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError> {
        let value = serde_json::to_value(value).map_err(|source| CacheError::Encoding {
            path: PathBuf::from(key),
            source,
        })?;
        self.entries
            .borrow_mut()
            .insert(key.to_string(), (Utc::now() + ttl, value));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}
