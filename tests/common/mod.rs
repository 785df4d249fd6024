//! Shared test helpers for docdelta integration tests.
//!
//! All tests use temp directories, never the real repo.
//! Each test gets its own fixture repository via `setup_doc_repo()`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use docdelta::{DocdeltaConfig, Settings, Updater};
use tempfile::TempDir;

/// README used by the fixture repository.
pub const README: &str = "\
# Trading Analytics

Intro paragraph.

## File Organization
- sql/q1.sql

## Queries
### Query 1
Counts trades.

## Usage
Run the queries in order.
";

/// Create a small documented repository: a README, two SQL files and a
/// model description.
pub fn setup_doc_repo() -> TempDir {
    let dir = TempDir::new().expect("failed to create temp dir");
    write_file(dir.path(), "README.md", README);
    write_file(dir.path(), "sql/q1.sql", "select count(*) from trades;\n");
    write_file(dir.path(), "sql/q2.sql", "select * from traders;\n");
    write_file(dir.path(), "model.md", "# Model\n");
    dir
}

/// An [`Updater`] for `root` with default configuration.
pub fn updater(root: &Path) -> Updater {
    Updater::new(Settings::new(root, DocdeltaConfig::default()))
}

/// Write a file (creating parents) relative to `root`.
pub fn write_file(root: &Path, rel_path: &str, content: &str) {
    let path = root.join(rel_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
}

/// Read a file relative to `root`. Returns None if it doesn't exist.
pub fn read_file(root: &Path, rel_path: &str) -> Option<String> {
    std::fs::read_to_string(root.join(rel_path)).ok()
}

/// `<root>/.docdelta`.
pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(".docdelta")
}

/// Save an update batch where `docdelta apply` looks for it by default.
pub fn write_updates(root: &Path, json: &str) {
    write_file(root, ".docdelta/updates.json", json);
}

/// A batch replacing the "File Organization" section.
pub fn file_organization_batch() -> String {
    serde_json::json!({
        "sections_to_update": [{
            "section_name": "File Organization",
            "reason": "New query added: q2.sql",
            "updated_content": "## File Organization\n- sql/q1.sql\n- sql/q2.sql\n"
        }],
        "changelog_entry": "Documented q2.sql",
        "timestamp": "2025-11-03T10:00:00"
    })
    .to_string()
}

/// Run docdelta with the given args in the given directory.
pub fn docdelta_in(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_docdelta"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .env_remove("DOCDELTA_ROOT")
        .env_remove("DOCDELTA_LOG_FORMAT")
        .output()
        .expect("failed to execute docdelta")
}

/// Run docdelta and assert it succeeds. Returns stdout as string.
pub fn docdelta_ok(dir: &Path, args: &[&str]) -> String {
    let out = docdelta_in(dir, args);
    let stderr = String::from_utf8_lossy(&out.stderr);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(
        out.status.success(),
        "docdelta {} failed:\nstdout: {stdout}\nstderr: {stderr}",
        args.join(" "),
    );
    stdout.to_string()
}

/// Run docdelta and assert it fails. Returns stderr as string.
pub fn docdelta_fails(dir: &Path, args: &[&str]) -> String {
    let out = docdelta_in(dir, args);
    assert!(
        !out.status.success(),
        "Expected docdelta {} to fail, but it succeeded.\nstdout: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stdout),
    );
    String::from_utf8_lossy(&out.stderr).to_string()
}
