//! Tracked-file snapshots and the persisted repository state.
//!
//! A [`FileSnapshot`] maps a repo-relative, forward-slash path to an opaque
//! [`ContentDigest`]. [`RepoState`] wraps a snapshot with the time of the
//! last successful update and a schema version tag; it is the only
//! checkpoint docdelta persists between runs.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version written into every persisted [`RepoState`].
pub const STATE_SCHEMA_VERSION: &str = "1.0";

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Fixed-length content hash of a tracked file, as a hex string.
///
/// The value is an equality token only. Nothing parses or interprets it, so
/// no format validation is applied on construction.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Wrap a hex digest string.
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Return the digest as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentDigest {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ContentDigest {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// FileSnapshot
// ---------------------------------------------------------------------------

/// Path → digest mapping for every tracked file at one point in time.
///
/// A `BTreeMap` keeps serialization and iteration in lexicographic path
/// order.
pub type FileSnapshot = BTreeMap<String, ContentDigest>;

/// Render a relative path as a forward-slash snapshot key.
///
/// `.` components are dropped; every other component is kept verbatim.
#[must_use]
pub fn normalize_path(relative: &Path) -> String {
    let mut out = String::new();
    for component in relative.components() {
        match component {
            Component::CurDir => {}
            other => {
                if !out.is_empty() {
                    out.push('/');
                }
                out.push_str(&other.as_os_str().to_string_lossy());
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// RepoState
// ---------------------------------------------------------------------------

/// The persisted checkpoint: the snapshot taken after the last successful
/// apply (or reset).
///
/// Always overwritten wholesale on save; never merged with an older state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoState {
    /// Digest of every tracked file.
    pub file_hashes: FileSnapshot,

    /// When this state was produced. Absent for the empty baseline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,

    /// Schema version tag ([`STATE_SCHEMA_VERSION`]).
    pub version: String,
}

impl RepoState {
    /// The empty baseline: no tracked files, no timestamp.
    ///
    /// Diffing a scan against this state reports every file as added.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            file_hashes: FileSnapshot::new(),
            last_update: None,
            version: STATE_SCHEMA_VERSION.to_owned(),
        }
    }

    /// A state capturing `snapshot` at time `now`.
    #[must_use]
    pub fn captured(snapshot: FileSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            file_hashes: snapshot,
            last_update: Some(now),
            version: STATE_SCHEMA_VERSION.to_owned(),
        }
    }

    /// Whether the version tag is one this build can read.
    #[must_use]
    pub fn is_supported_version(&self) -> bool {
        self.version == STATE_SCHEMA_VERSION
    }
}

impl Default for RepoState {
    fn default() -> Self {
        Self::empty()
    }
}
