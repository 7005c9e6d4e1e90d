// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Error types for the gcroot engine and its collaborators

use std::path::PathBuf;
use thiserror::Error;

/// An age expression could not be turned into a cutoff timestamp
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgeParseError {
    /// The expression is empty or only whitespace
    #[error("empty age expression")]
    Empty,
    /// No known relative or absolute format matched
    #[error("unrecognized age expression: {0:?} (try \"7 days ago\", \"2w\" or \"2024-01-31\")")]
    Unrecognized(String),
    /// The unit in a relative expression is not known
    #[error("unknown time unit {unit:?} in {expr:?}")]
    UnknownUnit {
        /// The offending unit
        unit: String,
        /// The full expression
        expr: String,
    },
    /// The expression parsed but the resulting time is not representable
    #[error("age expression {0:?} is out of range")]
    OutOfRange(String),
    /// A local date/time that does not exist (DST gap)
    #[error("age expression {0:?} names a local time that does not exist")]
    NonexistentLocalTime(String),
}

/// Failure while removing a gcroot link
#[derive(Debug, Error)]
pub enum GcRootError {
    /// The link has already been removed
    #[error("gcroot link not found: {}", path.display())]
    NotFound {
        /// The link that was expected
        path: PathBuf,
    },
    /// Any other filesystem failure
    #[error("failed to remove gcroot link {}: {source}", path.display())]
    Io {
        /// The link being removed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl GcRootError {
    /// Build from an I/O error, mapping `NotFound` to its own variant
    pub(crate) fn from_io(path: PathBuf, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    /// Whether the link was already gone
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Why a symlink is not a gcroot. Never fatal; the scanner skips the entry.
#[derive(Debug, Error)]
pub enum MalformedChain {
    /// The entry is not a symlink at all
    #[error("not a symlink")]
    NotASymlink,
    /// The first hop is not itself a symlink
    #[error("{} is not a symlink (one-hop chain)", .0.display())]
    OneHop(PathBuf),
    /// Some link in the chain could not be read or resolved
    #[error("broken chain: {0}")]
    Broken(#[source] std::io::Error),
    /// The first hop is a link to another link, not into the store
    #[error("{} does not point directly into the store", .0.display())]
    ExtraHops(PathBuf),
    /// The chain resolves somewhere outside the store
    #[error("{} is outside the store", .0.display())]
    OutsideStore(PathBuf),
}

/// Failure in the key/value cache
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing an entry failed
    #[error("cache I/O error at {}: {source}", path.display())]
    Io {
        /// Entry path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// An entry could not be encoded or decoded
    #[error("cache entry {} is not valid JSON: {source}", path.display())]
    Encoding {
        /// Entry path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_variant() {
        let err = GcRootError::from_io(
            PathBuf::from("/tmp/result"),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(err.is_not_found());

        let err = GcRootError::from_io(
            PathBuf::from("/tmp/result"),
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("/tmp/result"));
    }
}
