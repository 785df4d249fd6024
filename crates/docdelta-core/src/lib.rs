//! docdelta core: the I/O-free half of incremental documentation updates.
//!
//! This crate holds everything that can be computed without touching the
//! filesystem:
//!
//! - [`snapshot`]: tracked-file snapshots and the persisted [`RepoState`].
//! - [`diff`]: the pure change detector producing a [`ChangeSet`].
//! - [`batch`]: the [`UpdateBatch`] returned by the external text service,
//!   with wholesale validation.
//! - [`section`]: heading-delimited markdown section replacement.
//! - [`request`]: the payload (and prompt text) sent to the text service.
//!
//! The `docdelta` crate wires these into scanning, persistence, backups and
//! the changelog.

pub mod batch;
pub mod diff;
pub mod request;
pub mod section;
pub mod snapshot;

pub use batch::{BatchError, SectionUpdate, UpdateBatch};
pub use diff::{ChangeSet, diff};
pub use request::{UpdateRequest, render_prompt};
pub use section::{BatchOutcome, PatchResult, SectionOutcome, SectionReport, apply_batch, patch};
pub use snapshot::{ContentDigest, FileSnapshot, RepoState, STATE_SCHEMA_VERSION};
