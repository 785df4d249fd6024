//! The apply engine: scan, diff, back up, patch, record, save.
//!
//! [`Updater`] owns one resolved [`Settings`] and the components built from
//! it. [`Updater::apply`] walks the [`ApplyPhase`] state machine:
//!
//! ```text
//! Idle → Scanning → Diffed → BatchReceived → BackedUp → Patching → Recorded → StateSaved → Idle
//! ```
//!
//! Every abort returns to `Idle` with an error naming the step that failed.
//! The order of the writes is fixed:
//!
//! | Fails at        | Document | Backup | Changelog | State |
//! |-----------------|----------|--------|-----------|-------|
//! | `BatchReceived` | old      | none   | old       | old   |
//! | `BackedUp`      | old      | none   | old       | old   |
//! | `Patching`      | old      | new    | old       | old   |
//! | `Recorded`      | new      | new    | old       | old   |
//! | `StateSaved`    | new      | new    | new       | old   |
//!
//! A malformed batch or a missing target is refused before the writer lock
//! is taken, so such an apply leaves no trace, not even the cache directory.
//!
//! A state that was not saved makes the next diff report the same change set
//! again, so a failed run is retried rather than lost.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime, SubsecRound, TimeDelta, Utc};
use docdelta_core::{
    BatchOutcome, ChangeSet, RepoState, UpdateBatch, UpdateRequest, apply_batch, diff,
    render_prompt,
};
use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::atomic::write_atomic;
use crate::backup::{BackupError, BackupManager, BackupRecord};
use crate::changelog::{ChangelogEntry, ChangelogError, ChangelogRecorder, RecordOutcome};
use crate::config::Settings;
use crate::error::DocdeltaError;
use crate::fp;
use crate::lock::WriterLock;
use crate::scan::{RepoScanner, SkippedFile};
use crate::state::{StateError, StateLoad, StateStore};

// ---------------------------------------------------------------------------
// ApplyPhase
// ---------------------------------------------------------------------------

/// The phases of one apply run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyPhase {
    /// No run in progress.
    Idle,
    /// Fingerprinting tracked files.
    Scanning,
    /// Previous state loaded and compared.
    Diffed,
    /// Batch validated and patched in memory.
    BatchReceived,
    /// Pre-write backup stored.
    BackedUp,
    /// Patched document written.
    Patching,
    /// Changelog entry prepended.
    Recorded,
    /// New state persisted.
    StateSaved,
}

impl ApplyPhase {
    /// The phase that follows this one on a successful run.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Idle => Self::Scanning,
            Self::Scanning => Self::Diffed,
            Self::Diffed => Self::BatchReceived,
            Self::BatchReceived => Self::BackedUp,
            Self::BackedUp => Self::Patching,
            Self::Patching => Self::Recorded,
            Self::Recorded => Self::StateSaved,
            Self::StateSaved => Self::Idle,
        }
    }

    /// Check whether moving to `next` is valid: the forward edge, or a
    /// return to `Idle` from anywhere.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        next == Self::Idle || self.next() == next
    }
}

impl fmt::Display for ApplyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Scanning => write!(f, "scanning"),
            Self::Diffed => write!(f, "diffed"),
            Self::BatchReceived => write!(f, "batch-received"),
            Self::BackedUp => write!(f, "backed-up"),
            Self::Patching => write!(f, "patching"),
            Self::Recorded => write!(f, "recorded"),
            Self::StateSaved => write!(f, "state-saved"),
        }
    }
}

/// Tracks the current phase and checks every transition.
#[derive(Debug)]
struct PhaseTracker {
    phase: ApplyPhase,
    furthest: ApplyPhase,
}

impl PhaseTracker {
    const fn new() -> Self {
        Self {
            phase: ApplyPhase::Idle,
            furthest: ApplyPhase::Idle,
        }
    }

    fn advance(&mut self, next: ApplyPhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "invalid apply transition {} -> {next}",
            self.phase
        );
        info!(from = %self.phase, to = %next, "apply phase");
        self.phase = next;
        if next != ApplyPhase::Idle {
            self.furthest = next;
        }
    }
}

impl Drop for PhaseTracker {
    fn drop(&mut self) {
        if self.phase != ApplyPhase::Idle {
            warn!(phase = %self.phase, "apply aborted");
        }
    }
}

// ---------------------------------------------------------------------------
// Options and reports
// ---------------------------------------------------------------------------

/// Knobs for [`Updater::apply`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Validate and patch in memory only; write nothing.
    pub dry_run: bool,
}

/// One section of a batch, as reported back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SectionSummary {
    /// Requested section name.
    pub section_name: String,
    /// Reason from the batch.
    pub reason: String,
}

/// Result of [`Updater::detect_changes`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChangeReport {
    /// Added, modified and removed files since the last saved state.
    pub changes: ChangeSet,
    /// Number of files in the current scan.
    pub tracked: usize,
    /// Matched files that could not be read.
    pub skipped: Vec<SkippedFile>,
    /// Set when the saved state was unusable and the empty baseline was used.
    pub corrupt_state: Option<String>,
}

/// Result of [`Updater::apply`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Target document, relative to the root.
    pub target: String,
    /// Furthest phase reached (`batch_received` for a dry run).
    pub phase: ApplyPhase,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// The change set that motivated the batch.
    pub changes: ChangeSet,
    /// The pre-write backup, if one was taken.
    pub backup: Option<PathBuf>,
    /// Sections that were (or would be) replaced, in batch order.
    pub applied: Vec<SectionSummary>,
    /// Sections whose heading was not found, in batch order.
    pub missing: Vec<SectionSummary>,
    /// Whether the document text changed.
    pub document_changed: bool,
    /// How the changelog was written; `None` for a dry run.
    pub changelog: Option<RecordOutcome>,
    /// Matched files that could not be read during the scans.
    pub skipped_files: Vec<SkippedFile>,
    /// Set when the saved state was unusable and the empty baseline was used.
    pub corrupt_state: Option<String>,
}

/// Result of [`Updater::write_request`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RequestFiles {
    /// The request that was written.
    pub request: UpdateRequest,
    /// Machine-readable request file.
    pub request_path: PathBuf,
    /// Rendered prompt file.
    pub prompt_path: PathBuf,
}

/// Result of [`Updater::reset`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    /// Files in the new baseline.
    pub tracked: usize,
    /// The state file written.
    pub state_path: PathBuf,
}

/// Result of [`Updater::restore`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    /// Target document, relative to the root.
    pub target: String,
    /// The backup whose text is now live.
    pub restored_from: BackupRecord,
    /// Backup of the text that was replaced; `None` if nothing changed.
    pub safety_backup: Option<BackupRecord>,
}

fn summaries<'a>(
    reports: impl Iterator<Item = &'a docdelta_core::SectionReport>,
) -> Vec<SectionSummary> {
    reports
        .map(|r| SectionSummary {
            section_name: r.section_name.clone(),
            reason: r.reason.clone(),
        })
        .collect()
}

fn pairs(summaries: &[SectionSummary]) -> Vec<(String, String)> {
    summaries
        .iter()
        .map(|s| (s.section_name.clone(), s.reason.clone()))
        .collect()
}

/// Local wall-clock time at second precision, matching backup keys.
fn local_now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

// ---------------------------------------------------------------------------
// Updater
// ---------------------------------------------------------------------------

/// Incremental documentation updater for one repository.
#[derive(Clone, Debug)]
pub struct Updater {
    settings: Settings,
    scanner: RepoScanner,
    state: StateStore,
    backups: BackupManager,
    changelog: ChangelogRecorder,
}

impl Updater {
    /// Build every component from `settings`.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            scanner: RepoScanner::new(&settings),
            state: StateStore::new(&settings),
            backups: BackupManager::new(&settings),
            changelog: ChangelogRecorder::new(&settings),
            settings,
        }
    }

    /// The resolved settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Compare the current scan against the saved state. Writes nothing.
    ///
    /// # Errors
    /// Returns [`DocdeltaError::Io`] if an include pattern is invalid.
    pub fn detect_changes(&self) -> Result<ChangeReport, DocdeltaError> {
        let scan = self.scanner.scan()?;
        let (previous, corrupt_state) = self.load_state();
        let changes = diff(&previous.file_hashes, &scan.snapshot);
        info!(
            added = changes.added.len(),
            modified = changes.modified.len(),
            removed = changes.removed.len(),
            "changes detected"
        );
        Ok(ChangeReport {
            changes,
            tracked: scan.snapshot.len(),
            skipped: scan.skipped,
            corrupt_state,
        })
    }

    /// Build the payload for the text service for `target`.
    ///
    /// A missing target yields a request without document text.
    ///
    /// # Errors
    /// Returns [`DocdeltaError::Io`] if scanning fails or the document exists
    /// but cannot be read.
    pub fn prepare_request(&self, target: &str) -> Result<UpdateRequest, DocdeltaError> {
        let report = self.detect_changes()?;
        self.request_for(target, &report.changes)
    }

    fn request_for(&self, target: &str, changes: &ChangeSet) -> Result<UpdateRequest, DocdeltaError> {
        let path = self.settings.target_path(target);
        let document = match fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(DocdeltaError::io("reading the target document", e)),
        };
        Ok(UpdateRequest::new(target, changes, document))
    }

    /// Write the request for `target` and `changes`, with the rendered
    /// prompt, into the cache directory.
    ///
    /// # Errors
    /// Returns [`DocdeltaError::Io`] if the document exists but cannot be
    /// read, or if either file cannot be written.
    pub fn write_request(
        &self,
        target: &str,
        changes: &ChangeSet,
    ) -> Result<RequestFiles, DocdeltaError> {
        let request = self.request_for(target, changes)?;
        let timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        let prompt = render_prompt(&request, &timestamp);
        let json = serde_json::to_string_pretty(&request)
            .map_err(|e| DocdeltaError::io("serializing the request", e.into()))?;

        let request_path = self.settings.request_path();
        let prompt_path = self.settings.prompt_path();
        write_atomic(&request_path, json.as_bytes())
            .map_err(|e| DocdeltaError::io("writing the update request", e))?;
        write_atomic(&prompt_path, prompt.as_bytes())
            .map_err(|e| DocdeltaError::io("writing the update prompt", e))?;
        info!(request = %request_path.display(), prompt = %prompt_path.display(), "request written");

        Ok(RequestFiles {
            request,
            request_path,
            prompt_path,
        })
    }

    /// Read and validate an update batch from `path`, or from
    /// `<cache_dir>/updates.json` when `path` is `None`.
    ///
    /// # Errors
    /// Returns [`DocdeltaError::MalformedUpdateBatch`] if the file is missing
    /// or invalid, and [`DocdeltaError::Io`] for other read failures.
    pub fn load_batch(&self, path: Option<&Path>) -> Result<UpdateBatch, DocdeltaError> {
        let path = path.map_or_else(|| self.settings.updates_path(), Path::to_path_buf);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DocdeltaError::MalformedUpdateBatch {
                    source_path: Some(path),
                    detail: "updates file not found".to_owned(),
                });
            }
            Err(e) => return Err(DocdeltaError::io("reading the update batch", e)),
        };
        UpdateBatch::from_json(&text).map_err(|e| DocdeltaError::MalformedUpdateBatch {
            source_path: Some(path),
            detail: e.to_string(),
        })
    }

    /// Apply `batch` to `target`.
    ///
    /// Each update is applied to the output of the previous one. Updates
    /// whose section is not found are skipped and reported in
    /// [`ApplyReport::missing`]. With [`ApplyOptions::dry_run`] nothing is
    /// written and no lock is taken.
    ///
    /// # Errors
    /// Returns the [`DocdeltaError`] of the step that failed. See the module
    /// docs for what has been written at each failure point.
    pub fn apply(
        &self,
        batch: &UpdateBatch,
        target: &str,
        options: ApplyOptions,
    ) -> Result<ApplyReport, DocdeltaError> {
        let span = info_span!("apply", target = %target, dry_run = options.dry_run);
        let _enter = span.enter();

        // Refuse a bad batch or a missing target before the lock creates
        // anything under the cache directory.
        batch.validate()?;
        let doc_path = self.settings.target_path(target);
        match fs::metadata(&doc_path) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DocdeltaError::MissingTargetDocument { path: doc_path });
            }
            Err(e) => return Err(DocdeltaError::io("reading the target document", e)),
        }

        let _lock = if options.dry_run {
            None
        } else {
            Some(WriterLock::acquire(&self.settings.lock_path())?)
        };
        let mut tracker = PhaseTracker::new();

        // Scanning
        tracker.advance(ApplyPhase::Scanning);
        let scan = self.scanner.scan()?;
        let mut skipped_files = scan.skipped;

        // Diffed
        tracker.advance(ApplyPhase::Diffed);
        let (previous, corrupt_state) = self.load_state();
        let changes = diff(&previous.file_hashes, &scan.snapshot);

        // BatchReceived
        tracker.advance(ApplyPhase::BatchReceived);
        let original = match fs::read_to_string(&doc_path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DocdeltaError::MissingTargetDocument { path: doc_path });
            }
            Err(e) => return Err(DocdeltaError::io("reading the target document", e)),
        };
        let outcome: BatchOutcome = apply_batch(&original, &batch.sections_to_update);
        let applied = summaries(outcome.applied());
        let missing = summaries(outcome.missing());
        let document_changed = outcome.text != original;

        let mut report = ApplyReport {
            target: target.to_owned(),
            phase: ApplyPhase::BatchReceived,
            dry_run: options.dry_run,
            changes,
            backup: None,
            applied,
            missing,
            document_changed,
            changelog: None,
            skipped_files: Vec::new(),
            corrupt_state,
        };

        if options.dry_run {
            tracker.advance(ApplyPhase::Idle);
            report.skipped_files = skipped_files;
            return Ok(report);
        }

        let now = local_now();

        // BackedUp
        fp!("apply.backup").map_err(|msg| {
            DocdeltaError::BackupWriteFailure(BackupError::Io {
                path: self.backups.dir().to_path_buf(),
                source: io::Error::other(msg),
            })
        })?;
        let backup = self
            .backups
            .create(target, original.as_bytes(), now)
            .map_err(DocdeltaError::BackupWriteFailure)?;
        tracker.advance(ApplyPhase::BackedUp);
        report.backup = Some(backup.path);

        // Patching
        fp!("apply.document").map_err(|msg| DocdeltaError::DocumentWriteFailure {
            path: doc_path.clone(),
            source: io::Error::other(msg),
        })?;
        if document_changed {
            write_atomic(&doc_path, outcome.text.as_bytes()).map_err(|source| {
                DocdeltaError::DocumentWriteFailure {
                    path: doc_path.clone(),
                    source,
                }
            })?;
        } else {
            info!("document text unchanged; not rewritten");
        }
        tracker.advance(ApplyPhase::Patching);

        // Recorded
        fp!("apply.changelog").map_err(|msg| {
            DocdeltaError::ChangelogWriteFailure(ChangelogError {
                path: self.changelog.path().to_path_buf(),
                source: io::Error::other(msg),
            })
        })?;
        let entry = ChangelogEntry {
            recorded_at: now,
            summary: batch.changelog_entry.clone(),
            updated: pairs(&report.applied),
            skipped: pairs(&report.missing),
        };
        let recorded = self
            .changelog
            .record(&entry)
            .map_err(DocdeltaError::ChangelogWriteFailure)?;
        tracker.advance(ApplyPhase::Recorded);
        report.changelog = Some(recorded);

        // StateSaved
        fp!("apply.state").map_err(|msg| {
            DocdeltaError::StateWriteFailure(StateError::Io {
                path: self.state.path().to_path_buf(),
                source: io::Error::other(msg),
            })
        })?;
        let rescan = self
            .scanner
            .scan()
            .map_err(|e| DocdeltaError::StateWriteFailure(StateError::Scan(e)))?;
        skipped_files.extend(rescan.skipped);
        self.state
            .save(&RepoState::captured(rescan.snapshot, Utc::now()))
            .map_err(DocdeltaError::StateWriteFailure)?;
        tracker.advance(ApplyPhase::StateSaved);
        report.phase = ApplyPhase::StateSaved;

        tracker.advance(ApplyPhase::Idle);
        skipped_files.sort_by(|a, b| a.path.cmp(&b.path));
        skipped_files.dedup();
        report.skipped_files = skipped_files;

        info!(
            applied = report.applied.len(),
            missing = report.missing.len(),
            furthest = %tracker.furthest,
            "apply complete"
        );
        Ok(report)
    }

    /// Record the current scan as the new baseline.
    ///
    /// # Errors
    /// Returns [`DocdeltaError::LockUnavailable`] or
    /// [`DocdeltaError::StateWriteFailure`].
    pub fn reset(&self) -> Result<ResetReport, DocdeltaError> {
        let _lock = WriterLock::acquire(&self.settings.lock_path())?;
        let state = self
            .state
            .reset(&self.scanner)
            .map_err(DocdeltaError::StateWriteFailure)?;
        Ok(ResetReport {
            tracked: state.file_hashes.len(),
            state_path: self.state.path().to_path_buf(),
        })
    }

    /// Backups of `target`, newest first.
    ///
    /// # Errors
    /// Returns [`DocdeltaError::BackupUnavailable`] if the backup directory
    /// cannot be read.
    pub fn list_backups(&self, target: &str) -> Result<Vec<BackupRecord>, DocdeltaError> {
        self.backups
            .list(target)
            .map_err(DocdeltaError::BackupUnavailable)
    }

    /// Put a backup's text back into `target`: the one named `key`, or the
    /// newest one.
    ///
    /// The text being replaced is backed up first. State and changelog are
    /// not touched.
    ///
    /// # Errors
    /// Returns [`DocdeltaError::BackupUnavailable`] if the backup cannot be
    /// found or read, [`DocdeltaError::BackupWriteFailure`] if the safety
    /// backup fails, and [`DocdeltaError::DocumentWriteFailure`] if the
    /// document cannot be written.
    pub fn restore(&self, target: &str, key: Option<&str>) -> Result<RestoreReport, DocdeltaError> {
        let span = info_span!("restore", target = %target);
        let _enter = span.enter();
        let _lock = WriterLock::acquire(&self.settings.lock_path())?;

        let record = match key {
            Some(key) => self.backups.record_for(target, key),
            None => self.backups.require_latest(target),
        }
        .map_err(DocdeltaError::BackupUnavailable)?;
        let restored = self
            .backups
            .read(&record.key)
            .map_err(DocdeltaError::BackupUnavailable)?;

        let doc_path = self.settings.target_path(target);
        let current = match fs::read(&doc_path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(DocdeltaError::io("reading the target document", e)),
        };

        let safety_backup = match current {
            Some(bytes) if bytes != restored => {
                // Keep the safety copy strictly newer than the one restored.
                let after = record
                    .taken_at
                    .checked_add_signed(TimeDelta::seconds(1))
                    .unwrap_or(record.taken_at);
                let at = local_now().max(after);
                Some(
                    self.backups
                        .create(target, &bytes, at)
                        .map_err(DocdeltaError::BackupWriteFailure)?,
                )
            }
            _ => None,
        };

        write_atomic(&doc_path, &restored).map_err(|source| {
            DocdeltaError::DocumentWriteFailure {
                path: doc_path.clone(),
                source,
            }
        })?;
        info!(backup = %record.key, "document restored");

        Ok(RestoreReport {
            target: target.to_owned(),
            restored_from: record,
            safety_backup,
        })
    }

    fn load_state(&self) -> (RepoState, Option<String>) {
        match self.state.load_checked() {
            StateLoad::Corrupt { reason } => {
                warn!(
                    path = %self.state.path().display(),
                    %reason,
                    "state file is corrupt; treating as empty baseline"
                );
                (RepoState::empty(), Some(reason))
            }
            load => (load.into_state(), None),
        }
    }
}
