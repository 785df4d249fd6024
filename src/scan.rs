//! Repository scanning: tracked files and their content digests.
//!
//! [`RepoScanner`] enumerates every file under the root whose name matches
//! one of the include globs, drops paths containing an exclude token (and
//! anything under docdelta's own cache directory), and hashes the raw bytes
//! of the rest with SHA-256.
//!
//! Unreadable files or directories never fail a scan. They are returned in
//! [`ScanReport::skipped`] and logged as warnings.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use docdelta_core::snapshot::normalize_path;
use docdelta_core::{ContentDigest, FileSnapshot};
use glob::Pattern;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Settings;

/// A scan could not start.
#[derive(Debug, Error)]
pub enum ScanError {
    /// An include glob is not a valid pattern.
    #[error("invalid include pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Parser message.
        reason: String,
    },
}

/// A matched file that was left out of the snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    /// Path as seen by the scanner.
    pub path: PathBuf,
    /// Why it was skipped.
    pub reason: String,
}

/// Result of one scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Digest of every readable tracked file.
    pub snapshot: FileSnapshot,
    /// Matched files that could not be read.
    pub skipped: Vec<SkippedFile>,
}

/// Enumerates and fingerprints tracked files.
#[derive(Clone, Debug)]
pub struct RepoScanner {
    root: PathBuf,
    include: Vec<String>,
    exclude: Vec<String>,
    cache_dir: PathBuf,
}

impl RepoScanner {
    /// Build a scanner from resolved settings.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        let scan = &settings.config().scan;
        Self {
            root: settings.root().to_path_buf(),
            include: scan.include.clone(),
            exclude: scan.exclude.clone(),
            cache_dir: settings.cache_dir(),
        }
    }

    /// Scan the repository.
    ///
    /// # Errors
    /// Returns [`ScanError::InvalidPattern`] if an include glob does not
    /// parse. Per-file failures are reported in the [`ScanReport`] instead.
    pub fn scan(&self) -> Result<ScanReport, ScanError> {
        let mut report = ScanReport::default();
        let candidates = self.candidates(&mut report.skipped)?;

        for path in candidates {
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let key = normalize_path(relative);
            match hash_file(&path) {
                Ok(digest) => {
                    debug!(path = %key, digest = %digest, "hashed");
                    report.snapshot.insert(key, digest);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not hash file; skipping");
                    report.skipped.push(SkippedFile {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        debug!(
            tracked = report.snapshot.len(),
            skipped = report.skipped.len(),
            "scan complete"
        );
        Ok(report)
    }

    /// Collect matching, non-excluded file paths (deduplicated, sorted).
    fn candidates(&self, skipped: &mut Vec<SkippedFile>) -> Result<BTreeSet<PathBuf>, ScanError> {
        let base = Pattern::escape(&self.root.to_string_lossy());
        let mut found = BTreeSet::new();

        for include in &self.include {
            let full = format!("{base}/**/{include}");
            let paths = glob::glob(&full).map_err(|e| ScanError::InvalidPattern {
                pattern: include.clone(),
                reason: e.msg.to_owned(),
            })?;

            for entry in paths {
                match entry {
                    Ok(path) => {
                        if path.is_file() && !self.is_excluded(&path) {
                            found.insert(path);
                        }
                    }
                    Err(e) => {
                        if self.is_excluded(e.path()) {
                            continue;
                        }
                        warn!(path = %e.path().display(), error = %e.error(), "unreadable path; skipping");
                        skipped.push(SkippedFile {
                            path: e.path().to_path_buf(),
                            reason: e.error().to_string(),
                        });
                    }
                }
            }
        }

        Ok(found)
    }

    /// Whether `path` lies in the cache directory or contains an exclude token.
    fn is_excluded(&self, path: &Path) -> bool {
        if path.starts_with(&self.cache_dir) {
            return true;
        }
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let key = normalize_path(relative);
        self.exclude.iter().any(|token| key.contains(token.as_str()))
    }
}

/// SHA-256 of a file's raw bytes, as lowercase hex.
///
/// # Errors
/// Returns the I/O error if the file cannot be read.
pub fn hash_file(path: &Path) -> io::Result<ContentDigest> {
    let bytes = fs::read(path)?;
    Ok(hash_bytes(&bytes))
}

/// SHA-256 of `bytes`, as lowercase hex (64 chars).
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> ContentDigest {
    let result = Sha256::digest(bytes);
    let mut hex = String::with_capacity(64);
    for b in result.iter() {
        let _ = write!(hex, "{b:02x}");
    }
    ContentDigest::new(hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocdeltaConfig;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn scanner(root: &Path) -> RepoScanner {
        RepoScanner::new(&Settings::new(root, DocdeltaConfig::default()))
    }

    #[test]
    fn tracks_matching_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "README.md", "# r");
        write(dir.path(), "sql/queries/q1.sql", "select 1");
        write(dir.path(), "notes.txt", "ignored");

        let report = scanner(dir.path()).scan().unwrap();
        let keys: Vec<_> = report.snapshot.keys().cloned().collect();
        assert_eq!(keys, vec!["README.md", "sql/queries/q1.sql"]);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn skips_exclude_tokens_and_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", "{}");
        write(dir.path(), ".git/config.json", "{}");
        write(dir.path(), "pkg/__pycache__/m.py", "x");
        write(dir.path(), ".docdelta/CHANGELOG.md", "log");

        let report = scanner(dir.path()).scan().unwrap();
        let keys: Vec<_> = report.snapshot.keys().cloned().collect();
        assert_eq!(keys, vec!["a.json"]);
    }

    #[test]
    fn custom_cache_dir_is_skipped_without_token() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "meta/state.json", "{}");
        write(dir.path(), "b.yaml", "k: v");
        let cfg = DocdeltaConfig::parse("[storage]\ncache_dir = \"meta\"\n").unwrap();
        let report = RepoScanner::new(&Settings::new(dir.path(), cfg)).scan().unwrap();
        assert!(report.snapshot.contains_key("b.yaml"));
        assert!(!report.snapshot.contains_key("meta/state.json"));
    }

    #[test]
    fn digest_changes_with_content_only() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.sql", "select 1");
        let s = scanner(dir.path());
        let first = s.scan().unwrap().snapshot;
        let again = s.scan().unwrap().snapshot;
        assert_eq!(first, again);

        write(dir.path(), "a.sql", "select 2");
        let changed = s.scan().unwrap().snapshot;
        assert_ne!(first["a.sql"], changed["a.sql"]);
    }

    #[test]
    fn hash_is_sha256_hex() {
        let digest = hash_bytes(b"abc");
        assert_eq!(
            digest.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn invalid_include_pattern_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = DocdeltaConfig::parse("[scan]\ninclude = [\"[\"]\n").unwrap();
        let err = RepoScanner::new(&Settings::new(dir.path(), cfg)).scan().unwrap_err();
        assert!(err.to_string().contains("invalid include pattern"));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_is_skipped_not_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ok.md", "fine");
        write(dir.path(), "secret.md", "nope");
        let secret = dir.path().join("secret.md");
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();

        // Root can read anything; only assert the skip when the read really fails.
        let readable = fs::read(&secret).is_ok();
        let report = scanner(dir.path()).scan().unwrap();
        assert!(report.snapshot.contains_key("ok.md"));
        if !readable {
            assert!(!report.snapshot.contains_key("secret.md"));
            assert_eq!(report.skipped.len(), 1);
        }
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o644)).unwrap();
    }
}
