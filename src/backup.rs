//! Timestamped copies of the target document.
//!
//! Before the live document is rewritten, its current bytes are copied to
//! `<backup_dir>/<sanitized target>.backup.<YYYYMMDD_HHMMSS>`. The sanitized
//! target replaces path separators with `_`, so `docs/GUIDE.md` becomes
//! `docs_GUIDE.md`. Backups are never pruned.
//!
//! Two backups of one target in the same second share a key; the later one
//! replaces the earlier. Sanitizing is lossy too: `docs/a.md` and `docs_a.md`
//! map to the same prefix, so listing or restoring either target also sees
//! the other's backups.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::atomic::write_atomic;
use crate::config::Settings;

const KEY_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";
const KEY_MARKER: &str = ".backup.";

/// Errors creating, listing or reading backups.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Backup storage could not be written or read.
    #[error("backup {}: {source}", path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// No backup with the requested key exists.
    #[error("no backup named `{key}` in {}", dir.display())]
    NotFound {
        /// Requested key.
        key: String,
        /// Backup directory searched.
        dir: PathBuf,
    },

    /// The target has no backups at all.
    #[error("no backups of `{target}` in {}", dir.display())]
    NoBackups {
        /// Target document.
        target: String,
        /// Backup directory searched.
        dir: PathBuf,
    },

    /// The requested key is not a plain backup file name.
    #[error("invalid backup key `{0}`")]
    InvalidKey(String),

    /// The requested key is a backup of a different document.
    #[error("backup `{key}` is not a backup of `{target}`")]
    WrongTarget {
        /// Requested key.
        key: String,
        /// Document the caller asked about.
        target: String,
    },
}

/// One stored backup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    /// File name inside the backup directory.
    pub key: String,
    /// Full path.
    pub path: PathBuf,
    /// Local time the backup was taken (second precision).
    pub taken_at: NaiveDateTime,
}

/// `docs/GUIDE.md` -> `docs_GUIDE.md`.
#[must_use]
pub fn sanitize_target(target: &str) -> String {
    target.replace(['/', '\\'], "_")
}

/// Backup file name for `target` taken at `at`.
#[must_use]
pub fn backup_key(target: &str, at: NaiveDateTime) -> String {
    format!(
        "{}{KEY_MARKER}{}",
        sanitize_target(target),
        at.format(KEY_TIME_FORMAT)
    )
}

/// Creates and reads document backups.
#[derive(Clone, Debug)]
pub struct BackupManager {
    dir: PathBuf,
}

impl BackupManager {
    /// Backup manager for the configured backup directory.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self::at(settings.backup_dir())
    }

    /// Backup manager rooted at `dir`.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The backup directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store `contents` as a backup of `target` taken at `at`.
    ///
    /// A backup with the same key (same target, same second) is replaced.
    ///
    /// # Errors
    /// Returns [`BackupError::Io`] if the directory or file cannot be written.
    pub fn create(
        &self,
        target: &str,
        contents: &[u8],
        at: NaiveDateTime,
    ) -> Result<BackupRecord, BackupError> {
        let key = backup_key(target, at);
        let path = self.dir.join(&key);
        write_atomic(&path, contents).map_err(|source| BackupError::Io {
            path: path.clone(),
            source,
        })?;
        info!(backup = %path.display(), bytes = contents.len(), "document backed up");
        Ok(BackupRecord {
            key,
            path,
            taken_at: at,
        })
    }

    /// All backups of `target`, newest first.
    ///
    /// A missing backup directory yields an empty list. Files whose name does
    /// not carry a parseable timestamp are ignored.
    ///
    /// # Errors
    /// Returns [`BackupError::Io`] if the directory exists but cannot be read.
    pub fn list(&self, target: &str) -> Result<Vec<BackupRecord>, BackupError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(BackupError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let prefix = format!("{}{KEY_MARKER}", sanitize_target(target));
        let mut records: Vec<BackupRecord> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let key = entry.file_name().into_string().ok()?;
                let stamp = key.strip_prefix(&prefix)?;
                let taken_at = NaiveDateTime::parse_from_str(stamp, KEY_TIME_FORMAT).ok()?;
                Some(BackupRecord {
                    path: entry.path(),
                    key,
                    taken_at,
                })
            })
            .collect();

        records.sort_by(|a, b| b.taken_at.cmp(&a.taken_at).then_with(|| b.key.cmp(&a.key)));
        debug!(target, count = records.len(), "listed backups");
        Ok(records)
    }

    /// The newest backup of `target`, if any.
    ///
    /// # Errors
    /// See [`BackupManager::list`].
    pub fn latest(&self, target: &str) -> Result<Option<BackupRecord>, BackupError> {
        Ok(self.list(target)?.into_iter().next())
    }

    /// The newest backup of `target`, or [`BackupError::NoBackups`].
    ///
    /// # Errors
    /// See [`BackupManager::list`].
    pub fn require_latest(&self, target: &str) -> Result<BackupRecord, BackupError> {
        self.latest(target)?.ok_or_else(|| BackupError::NoBackups {
            target: target.to_owned(),
            dir: self.dir.clone(),
        })
    }

    /// Look up the backup named `key`.
    ///
    /// # Errors
    /// Returns [`BackupError::InvalidKey`] for keys that are not bare file
    /// names or carry no timestamp, and [`BackupError::NotFound`] if the file
    /// does not exist.
    pub fn record(&self, key: &str) -> Result<BackupRecord, BackupError> {
        check_key(key)?;
        let taken_at = key
            .rsplit_once(KEY_MARKER)
            .and_then(|(_, stamp)| NaiveDateTime::parse_from_str(stamp, KEY_TIME_FORMAT).ok())
            .ok_or_else(|| BackupError::InvalidKey(key.to_owned()))?;
        let path = self.dir.join(key);
        if !path.is_file() {
            return Err(BackupError::NotFound {
                key: key.to_owned(),
                dir: self.dir.clone(),
            });
        }
        Ok(BackupRecord {
            key: key.to_owned(),
            path,
            taken_at,
        })
    }

    /// Look up the backup named `key`, which must be a backup of `target`.
    ///
    /// # Errors
    /// Returns [`BackupError::WrongTarget`] if `key` belongs to another
    /// document, otherwise as [`BackupManager::record`].
    pub fn record_for(&self, target: &str, key: &str) -> Result<BackupRecord, BackupError> {
        check_key(key)?;
        let prefix = format!("{}{KEY_MARKER}", sanitize_target(target));
        let owned = key
            .strip_prefix(&prefix)
            .is_some_and(|stamp| NaiveDateTime::parse_from_str(stamp, KEY_TIME_FORMAT).is_ok());
        if !owned {
            return Err(BackupError::WrongTarget {
                key: key.to_owned(),
                target: target.to_owned(),
            });
        }
        self.record(key)
    }

    /// Read the bytes of the backup named `key`.
    ///
    /// # Errors
    /// Returns [`BackupError::InvalidKey`] if `key` is not a bare file name,
    /// [`BackupError::NotFound`] if no such backup exists, or
    /// [`BackupError::Io`] for other read failures.
    pub fn read(&self, key: &str) -> Result<Vec<u8>, BackupError> {
        check_key(key)?;
        let path = self.dir.join(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BackupError::NotFound {
                key: key.to_owned(),
                dir: self.dir.clone(),
            }),
            Err(source) => Err(BackupError::Io { path, source }),
        }
    }
}

fn check_key(key: &str) -> Result<(), BackupError> {
    if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
        return Err(BackupError::InvalidKey(key.to_owned()));
    }
    Ok(())
}
