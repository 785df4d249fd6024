//! Single-writer lock over the state file, backups and changelog.
//!
//! Every mutating command holds an exclusive advisory lock on
//! `<cache_dir>/.lock` from before the first read of persisted state until
//! after the last write. A second writer blocks until the first finishes.
//! The lock is released when the [`WriterLock`] is dropped.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use thiserror::Error;
use tracing::debug;

/// The writer lock could not be taken.
#[derive(Debug, Error)]
#[error("could not lock {}: {source}", path.display())]
pub struct LockError {
    /// The lock file.
    pub path: PathBuf,
    /// Underlying error.
    #[source]
    pub source: io::Error,
}

/// Held exclusive lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct WriterLock {
    file: File,
    path: PathBuf,
}

impl WriterLock {
    /// Open (creating if needed) and exclusively lock `path`, waiting for any
    /// other holder.
    ///
    /// # Errors
    /// Returns [`LockError`] if the lock file cannot be created or locked.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let err = |source| LockError {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(err)?;
        FileExt::lock_exclusive(&file).map_err(err)?;

        debug!(path = %path.display(), "writer lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// The lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "writer lock released");
    }
}
