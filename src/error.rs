//! Top-level error type for docdelta operations.
//!
//! Defines [`DocdeltaError`], returned by every [`Updater`](crate::apply::Updater)
//! entry point. Each variant is an abort: nothing after the failing step ran.
//! Messages say what went wrong and end with a `To fix:` line.
//!
//! Recoverable conditions (unreadable sources, corrupt state, missing
//! sections, corrupt changelog) are not errors. They are reported inside the
//! operation's report instead.

use std::fmt;
use std::path::PathBuf;

use docdelta_core::BatchError;

use crate::backup::BackupError;
use crate::changelog::ChangelogError;
use crate::config::ConfigError;
use crate::lock::LockError;
use crate::scan::ScanError;
use crate::state::StateError;

// ---------------------------------------------------------------------------
// DocdeltaError
// ---------------------------------------------------------------------------

/// Unified error type for docdelta operations.
#[derive(Debug)]
pub enum DocdeltaError {
    /// The target document does not exist.
    MissingTargetDocument {
        /// Absolute path that was looked up.
        path: PathBuf,
    },

    /// The update batch (or the file holding it) is unusable.
    MalformedUpdateBatch {
        /// Where the batch came from, if it was read from a file.
        source_path: Option<PathBuf>,
        /// What was wrong with it.
        detail: String,
    },

    /// The pre-write backup could not be stored. The document is untouched.
    BackupWriteFailure(BackupError),

    /// A stored backup could not be found or read.
    BackupUnavailable(BackupError),

    /// The patched document could not be written. The backup exists.
    DocumentWriteFailure {
        /// The target document.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The changelog could not be written. The document was already updated.
    ChangelogWriteFailure(ChangelogError),

    /// The new state could not be saved. The next diff repeats this change set.
    StateWriteFailure(StateError),

    /// Another writer's lock could not be taken.
    LockUnavailable(LockError),

    /// The configuration file is invalid.
    Config(ConfigError),

    /// Any other I/O failure (reading the document, scanning, writing the
    /// request files).
    Io {
        /// What was being done.
        context: String,
        /// Underlying error.
        source: std::io::Error,
    },
}

impl DocdeltaError {
    /// Wrap an I/O error with a short description of the failed step.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for DocdeltaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTargetDocument { path } => {
                write!(
                    f,
                    "target document '{}' does not exist; nothing was changed.\n  To fix: create the document first, or pass the right one with --target.",
                    path.display()
                )
            }
            Self::MalformedUpdateBatch {
                source_path,
                detail,
            } => {
                write!(f, "update batch rejected: {detail}")?;
                if let Some(p) = source_path {
                    write!(f, "\n  file: {}", p.display())?;
                }
                write!(
                    f,
                    "\n  Nothing was changed.\n  To fix: regenerate the batch so it has `sections_to_update`, `changelog_entry` and `timestamp`, then re-run:\n    docdelta apply"
                )
            }
            Self::BackupWriteFailure(err) => {
                write!(
                    f,
                    "could not back up the document: {err}\n  The document was not modified.\n  To fix: check that the backup directory is writable, then re-run:\n    docdelta apply"
                )
            }
            Self::BackupUnavailable(err) => {
                write!(
                    f,
                    "{err}\n  To fix: list the available backups and pick one:\n    docdelta backups"
                )
            }
            Self::DocumentWriteFailure { path, source } => {
                write!(
                    f,
                    "could not write '{}': {source}\n  A backup was taken; the changelog and state were not updated.\n  To fix: check permissions and disk space, then re-run:\n    docdelta apply",
                    path.display()
                )
            }
            Self::ChangelogWriteFailure(err) => {
                write!(
                    f,
                    "document updated but the changelog could not be written: {err}\n  State was not saved, so the next diff reports the same changes.\n  To fix: check the cache directory, then record the baseline:\n    docdelta reset"
                )
            }
            Self::StateWriteFailure(err) => {
                write!(
                    f,
                    "document and changelog updated but state could not be saved: {err}\n  The next diff reports the same changes again.\n  To fix: check the cache directory, then record the baseline:\n    docdelta reset"
                )
            }
            Self::LockUnavailable(err) => {
                write!(
                    f,
                    "{err}\n  To fix: check that the cache directory exists and is writable."
                )
            }
            Self::Config(err) => {
                write!(
                    f,
                    "{err}\n  To fix: edit the config file and correct the issue."
                )
            }
            Self::Io { context, source } => {
                write!(
                    f,
                    "I/O error while {context}: {source}\n  To fix: check file permissions and disk space."
                )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// std::error::Error
// ---------------------------------------------------------------------------

impl std::error::Error for DocdeltaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::BackupWriteFailure(err) | Self::BackupUnavailable(err) => Some(err),
            Self::DocumentWriteFailure { source, .. } | Self::Io { source, .. } => Some(source),
            Self::ChangelogWriteFailure(err) => Some(err),
            Self::StateWriteFailure(err) => Some(err),
            Self::LockUnavailable(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::MissingTargetDocument { .. } | Self::MalformedUpdateBatch { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// From impls
// ---------------------------------------------------------------------------

impl From<ConfigError> for DocdeltaError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<LockError> for DocdeltaError {
    fn from(err: LockError) -> Self {
        Self::LockUnavailable(err)
    }
}

impl From<BatchError> for DocdeltaError {
    fn from(err: BatchError) -> Self {
        Self::MalformedUpdateBatch {
            source_path: None,
            detail: err.to_string(),
        }
    }
}

impl From<ScanError> for DocdeltaError {
    fn from(err: ScanError) -> Self {
        Self::io(
            "scanning the repository",
            std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
