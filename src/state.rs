//! Persisted repository state (`<cache_dir>/doc_state.json`).
//!
//! The state file holds the [`RepoState`] captured after the last successful
//! apply or reset. Loading never fails: a missing, unreadable or
//! unparseable file means "empty baseline", so every tracked file looks
//! added on the next diff. Saving is atomic.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use docdelta_core::RepoState;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::atomic::write_atomic;
use crate::config::Settings;
use crate::scan::{RepoScanner, ScanError};

/// Errors writing or resetting the state file.
#[derive(Debug, Error)]
pub enum StateError {
    /// Writing, renaming or deleting the state file failed.
    #[error("state file {}: {source}", path.display())]
    Io {
        /// The state file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The state could not be serialized.
    #[error("could not serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The baseline scan during reset failed.
    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// What [`StateStore::load_checked`] found on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateLoad {
    /// No state file yet (first run, or after reset).
    Missing,
    /// A valid state.
    Loaded(RepoState),
    /// The file exists but cannot be used.
    Corrupt {
        /// Why it was rejected.
        reason: String,
    },
}

impl StateLoad {
    /// The usable state: the loaded one, or the empty baseline.
    #[must_use]
    pub fn into_state(self) -> RepoState {
        match self {
            Self::Loaded(state) => state,
            Self::Missing | Self::Corrupt { .. } => RepoState::empty(),
        }
    }
}

/// Loads and saves the persisted [`RepoState`].
#[derive(Clone, Debug)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// State store at the configured location.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self::at(settings.state_path())
    }

    /// State store at an explicit path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The state file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the state file and classify the result.
    #[must_use]
    pub fn load_checked(&self) -> StateLoad {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return StateLoad::Missing,
            Err(e) => {
                return StateLoad::Corrupt {
                    reason: format!("could not read: {e}"),
                };
            }
        };

        match serde_json::from_str::<RepoState>(&contents) {
            Ok(state) if state.is_supported_version() => StateLoad::Loaded(state),
            Ok(state) => StateLoad::Corrupt {
                reason: format!("unsupported schema version {:?}", state.version),
            },
            Err(e) => StateLoad::Corrupt {
                reason: format!("could not parse: {e}"),
            },
        }
    }

    /// Load the persisted state, falling back to the empty baseline.
    ///
    /// A corrupt file is logged as a warning and otherwise ignored.
    #[must_use]
    pub fn load(&self) -> RepoState {
        match self.load_checked() {
            StateLoad::Corrupt { reason } => {
                warn!(
                    path = %self.path.display(),
                    %reason,
                    "state file is corrupt; treating as empty baseline"
                );
                RepoState::empty()
            }
            StateLoad::Missing => {
                debug!(path = %self.path.display(), "no state file; empty baseline");
                RepoState::empty()
            }
            StateLoad::Loaded(state) => state,
        }
    }

    /// Persist `state`, replacing whatever was there.
    ///
    /// # Errors
    /// Returns [`StateError`] if serialization or the atomic write fails. The
    /// previous file is intact in that case.
    pub fn save(&self, state: &RepoState) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(state)?;
        write_atomic(&self.path, json.as_bytes()).map_err(|source| StateError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), files = state.file_hashes.len(), "state saved");
        Ok(())
    }

    /// Discard history and record the current scan as the new baseline.
    ///
    /// A diff run right after this reports no changes.
    ///
    /// # Errors
    /// Returns [`StateError`] if the old file cannot be removed, the scan
    /// cannot start, or the new baseline cannot be written.
    pub fn reset(&self, scanner: &RepoScanner) -> Result<RepoState, StateError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(StateError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        }

        let report = scanner.scan()?;
        let state = RepoState::captured(report.snapshot, Utc::now());
        self.save(&state)?;
        info!(files = state.file_hashes.len(), "tracking state reset");
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocdeltaConfig;
    use docdelta_core::{ContentDigest, FileSnapshot, diff};

    fn sample() -> RepoState {
        let mut hashes = FileSnapshot::new();
        hashes.insert("a.sql".to_owned(), ContentDigest::from("H1"));
        hashes.insert("docs/b.md".to_owned(), ContentDigest::from("H2"));
        RepoState::captured(hashes, Utc::now())
    }

    #[test]
    fn save_then_load_roundtrips_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::at(dir.path().join("cache/doc_state.json"));
        let state = sample();
        store.save(&state).unwrap();
        let loaded = store.load();
        assert_eq!(loaded.file_hashes, state.file_hashes);
        assert_eq!(loaded.version, "1.0");
    }

    #[test]
    fn missing_file_is_empty_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::at(dir.path().join("nope.json"));
        assert_eq!(store.load_checked(), StateLoad::Missing);
        assert!(store.load().file_hashes.is_empty());
    }

    #[test]
    fn garbage_file_is_corrupt_and_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc_state.json");
        fs::write(&path, "{ not json").unwrap();
        let store = StateStore::at(&path);
        assert!(matches!(store.load_checked(), StateLoad::Corrupt { .. }));
        assert_eq!(store.load(), RepoState::empty());
    }

    #[test]
    fn unknown_version_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc_state.json");
        fs::write(&path, r#"{"file_hashes": {"a": "1"}, "version": "9.9"}"#).unwrap();
        match StateStore::at(&path).load_checked() {
            StateLoad::Corrupt { reason } => assert!(reason.contains("9.9")),
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }

    #[test]
    fn save_overwrites_rather_than_merges() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::at(dir.path().join("s.json"));
        store.save(&sample()).unwrap();

        let mut only = FileSnapshot::new();
        only.insert("c.py".to_owned(), ContentDigest::from("H3"));
        store.save(&RepoState::captured(only.clone(), Utc::now())).unwrap();
        assert_eq!(store.load().file_hashes, only);
    }

    #[test]
    fn reset_makes_next_diff_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.sql"), "select 1").unwrap();
        fs::write(dir.path().join("README.md"), "# r").unwrap();
        let settings = Settings::new(dir.path(), DocdeltaConfig::default());
        let store = StateStore::new(&settings);
        let scanner = RepoScanner::new(&settings);

        fs::create_dir_all(settings.cache_dir()).unwrap();
        fs::write(store.path(), "corrupt").unwrap();
        store.reset(&scanner).unwrap();

        let current = scanner.scan().unwrap().snapshot;
        let changes = diff(&store.load().file_hashes, &current);
        assert!(changes.is_empty(), "{changes:?}");
    }
}
