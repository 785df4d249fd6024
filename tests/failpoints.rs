//! Crash-path tests: a failure at each apply stage leaves exactly the
//! writes made before it.
//!
//! Run with `cargo test --features failpoints`.

#![cfg(feature = "failpoints")]

mod common;

use std::path::Path;

use common::{README, cache_dir, file_organization_batch, read_file, setup_doc_repo, updater};
use docdelta::apply::ApplyOptions;
use docdelta::error::DocdeltaError;
use docdelta::failpoints::{self, FailpointAction};
use docdelta_core::UpdateBatch;

struct Written {
    document_changed: bool,
    backups: usize,
    changelog: bool,
    state: bool,
}

fn inspect(root: &Path) -> Written {
    let up = updater(root);
    Written {
        document_changed: read_file(root, "README.md").unwrap() != README,
        backups: up.list_backups("README.md").unwrap().len(),
        changelog: cache_dir(root).join("CHANGELOG.md").exists(),
        state: cache_dir(root).join("doc_state.json").exists(),
    }
}

fn fail_at(point: &'static str) -> (DocdeltaError, Written) {
    let repo = setup_doc_repo();
    let up = updater(repo.path());
    let batch = UpdateBatch::from_json(&file_organization_batch()).unwrap();

    failpoints::set(point, FailpointAction::Error("injected".into()));
    let result = up.apply(&batch, "README.md", ApplyOptions::default());
    failpoints::clear(point);

    let err = result.unwrap_err();
    assert!(err.to_string().contains(&format!("failpoint {point}: injected")), "{err}");
    (err, inspect(repo.path()))
}

// The failpoint registry is process-global, so every stage runs in one test.
#[test]
fn each_stage_failure_leaves_prior_writes_only() {
    failpoints::clear_all();

    let (err, w) = fail_at("apply.backup");
    assert!(matches!(err, DocdeltaError::BackupWriteFailure(_)));
    assert!(!w.document_changed && w.backups == 0 && !w.changelog && !w.state);

    let (err, w) = fail_at("apply.document");
    assert!(matches!(err, DocdeltaError::DocumentWriteFailure { .. }));
    assert!(!w.document_changed && w.backups == 1 && !w.changelog && !w.state);

    let (err, w) = fail_at("apply.changelog");
    assert!(matches!(err, DocdeltaError::ChangelogWriteFailure(_)));
    assert!(w.document_changed && w.backups == 1 && !w.changelog && !w.state);

    let (err, w) = fail_at("apply.state");
    assert!(matches!(err, DocdeltaError::StateWriteFailure(_)));
    assert!(w.document_changed && w.backups == 1 && w.changelog && !w.state);

    // With every failpoint cleared the same batch goes through.
    let repo = setup_doc_repo();
    let up = updater(repo.path());
    let batch = UpdateBatch::from_json(&file_organization_batch()).unwrap();
    up.apply(&batch, "README.md", ApplyOptions::default()).unwrap();
    let w = inspect(repo.path());
    assert!(w.document_changed && w.backups == 1 && w.changelog && w.state);
}
