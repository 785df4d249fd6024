//! Crash-safe file replacement.
//!
//! Every file docdelta writes (state, backups, changelog, the live document)
//! goes through [`write_atomic`]: write to a temporary file in the same
//! directory, fsync it, then rename over the target. Readers see either the
//! old content or the new content, never a half-written file.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Atomically replace `path` with `contents`.
///
/// 1. Create the parent directory if needed.
/// 2. Write to a temporary file in that directory (same filesystem).
/// 3. Copy the permissions of the file being replaced, if any.
/// 4. fsync the temporary file.
/// 5. Rename (atomic on POSIX) over the target path.
///
/// # Errors
/// Returns the underlying I/O error from any step. On error the target is
/// untouched and the temporary file is removed.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    if let Ok(meta) = fs::metadata(path) {
        tmp.as_file().set_permissions(meta.permissions())?;
    }
    tmp.as_file().sync_all()?;

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
