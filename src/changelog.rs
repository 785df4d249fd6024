//! Human-readable history of applied batches, newest entry first.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::atomic::write_atomic;
use crate::config::Settings;

const DEFAULT_SUMMARY: &str = "Documentation updated";

/// The changelog could not be written.
#[derive(Debug, Error)]
#[error("changelog {}: {source}", path.display())]
pub struct ChangelogError {
    /// The changelog file.
    pub path: PathBuf,
    /// Underlying error.
    #[source]
    pub source: io::Error,
}

/// One applied batch, as recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangelogEntry {
    /// Local time of the apply.
    pub recorded_at: NaiveDateTime,
    /// Free-text summary from the batch.
    pub summary: String,
    /// `(section_name, reason)` for every replaced section, in batch order.
    pub updated: Vec<(String, String)>,
    /// `(section_name, reason)` for every section that was not found.
    pub skipped: Vec<(String, String)>,
}

/// How the existing changelog was treated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordOutcome {
    /// No changelog existed; a new one was started.
    Fresh,
    /// The entry was prepended to the existing history.
    Prepended,
    /// The existing file could not be read and was replaced.
    DiscardedCorrupt {
        /// Why the old content was unusable.
        reason: String,
    },
}

/// Render one entry block.
#[must_use]
pub fn format_entry(entry: &ChangelogEntry) -> String {
    let summary = if entry.summary.trim().is_empty() {
        DEFAULT_SUMMARY
    } else {
        entry.summary.as_str()
    };

    let mut out = String::new();
    let _ = write!(
        out,
        "\n## {}\n\n**Changes**: {summary}\n\n**Sections Updated**:\n",
        entry.recorded_at.format("%Y-%m-%d %H:%M:%S")
    );
    for (name, reason) in &entry.updated {
        let _ = writeln!(out, "- {name}: {reason}");
    }
    if !entry.skipped.is_empty() {
        out.push_str("\n**Sections Skipped**:\n");
        for (name, reason) in &entry.skipped {
            let _ = writeln!(out, "- {name}: {reason}");
        }
    }
    out.push_str("\n---\n");
    out
}

/// Prepends entries to the changelog file.
#[derive(Clone, Debug)]
pub struct ChangelogRecorder {
    path: PathBuf,
}

impl ChangelogRecorder {
    /// Recorder for the configured changelog file.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self::at(settings.changelog_path())
    }

    /// Recorder writing to an explicit path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The changelog path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Prepend `entry` to the changelog.
    ///
    /// If the existing file cannot be read as UTF-8 text, prior history is
    /// dropped and a fresh changelog is started.
    ///
    /// # Errors
    /// Returns [`ChangelogError`] if the new content cannot be written.
    pub fn record(&self, entry: &ChangelogEntry) -> Result<RecordOutcome, ChangelogError> {
        let (existing, outcome) = match fs::read_to_string(&self.path) {
            Ok(text) => (text, RecordOutcome::Prepended),
            Err(e) if e.kind() == io::ErrorKind::NotFound => (String::new(), RecordOutcome::Fresh),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "changelog unreadable; starting a fresh one"
                );
                (
                    String::new(),
                    RecordOutcome::DiscardedCorrupt {
                        reason: e.to_string(),
                    },
                )
            }
        };

        let mut contents = format_entry(entry);
        contents.push_str(&existing);
        write_atomic(&self.path, contents.as_bytes()).map_err(|source| ChangelogError {
            path: self.path.clone(),
            source,
        })?;

        info!(
            path = %self.path.display(),
            sections = entry.updated.len(),
            "changelog recorded"
        );
        Ok(outcome)
    }
}
