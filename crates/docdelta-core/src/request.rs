//! The payload sent to the external text service.
//!
//! docdelta does not talk to the service itself. It produces an
//! [`UpdateRequest`] (machine-readable) and a rendered prompt (for a human or
//! an agent to forward), and later consumes the
//! [`UpdateBatch`](crate::batch::UpdateBatch) the service returns.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::diff::ChangeSet;

/// Change set plus current document text for one target document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// Repo-relative path of the document to update.
    pub target: String,
    /// Files added since the last update.
    pub added: Vec<String>,
    /// Files modified since the last update.
    pub modified: Vec<String>,
    /// Files removed since the last update.
    pub removed: Vec<String>,
    /// Current document text; `None` if the target does not exist yet.
    pub document: Option<String>,
}

impl UpdateRequest {
    /// Build a request from a change set.
    pub fn new(target: impl Into<String>, changes: &ChangeSet, document: Option<String>) -> Self {
        Self {
            target: target.into(),
            added: changes.added.clone(),
            modified: changes.modified.clone(),
            removed: changes.removed.clone(),
            document,
        }
    }
}

fn push_file_list(out: &mut String, heading: &str, files: &[String]) {
    let _ = writeln!(out, "**{heading} ({}):**", files.len());
    if files.is_empty() {
        out.push_str("  (none)\n");
    } else {
        for f in files {
            let _ = writeln!(out, "  - {f}");
        }
    }
    out.push('\n');
}

/// Render the instruction text for the text service.
///
/// `timestamp` is echoed into the output schema example so the service
/// returns a batch stamped with the request time.
#[must_use]
pub fn render_prompt(request: &UpdateRequest, timestamp: &str) -> String {
    let target = &request.target;
    let mut out = String::new();

    out.push_str("You are a technical documentation specialist maintaining project documentation.\n\n");
    let _ = writeln!(
        out,
        "**Task**: Update the existing {target} to reflect recent repository changes.\n"
    );
    out.push_str(
        "**CRITICAL**: Only update the sections affected by changes. Do NOT regenerate the entire document.\n\n",
    );
    out.push_str("---\n\n## Repository Changes Detected\n\n");

    push_file_list(&mut out, "Files Added", &request.added);
    push_file_list(&mut out, "Files Modified", &request.modified);
    push_file_list(&mut out, "Files Removed", &request.removed);

    out.push_str("---\n\n## Current Documentation\n\n```markdown\n");
    out.push_str(request.document.as_deref().unwrap_or("(File not found)"));
    out.push_str("\n```\n\n---\n\n## Update Instructions\n\n");

    let _ = writeln!(
        out,
        "1. **Analyze Changes**: Determine which `## ` sections of {target} describe the changed files."
    );
    out.push_str("   - Added or removed files usually affect the section describing file organization.\n");
    out.push_str("   - Modified files affect the sections that document their contents.\n\n");
    out.push_str("2. **Generate Differential Update**: Provide ONLY the sections that need updating.\n");
    out.push_str("   - `section_name` must appear in the existing `## ` heading line.\n");
    out.push_str("   - `updated_content` replaces the whole section and must start with its own `## ` heading.\n");
    out.push_str("   - Sections are applied in the order given; later entries see earlier edits.\n");
    out.push_str("   - Preserve existing formatting style and the H2/H3 hierarchy.\n\n");
    out.push_str("3. **Provide Change Summary**: Explain what changed and why the update is needed.\n\n");

    out.push_str("---\n\n## Output Format\n\nRespond with JSON only:\n\n```json\n");
    out.push_str("{\n  \"sections_to_update\": [\n    {\n");
    out.push_str("      \"section_name\": \"File Organization\",\n");
    out.push_str("      \"reason\": \"New files added: example.sql\",\n");
    out.push_str("      \"updated_content\": \"## File Organization\\n...full section content...\"\n");
    out.push_str("    }\n  ],\n");
    out.push_str("  \"changelog_entry\": \"One-line summary of the documentation change\",\n");
    let _ = writeln!(out, "  \"timestamp\": \"{timestamp}\"");
    out.push_str("}\n```\n\n");

    out.push_str("**Remember**:\n");
    out.push_str("- Update ONLY affected sections\n");
    out.push_str("- Preserve existing tone and formatting\n");
    out.push_str("- Keep inline code formatting with backticks\n");

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changes() -> ChangeSet {
        ChangeSet {
            added: vec!["queries/q8.sql".to_owned()],
            modified: vec!["model.md".to_owned(), "sql_assignment.sql".to_owned()],
            removed: vec![],
        }
    }

    #[test]
    fn request_copies_change_lists() {
        let req = UpdateRequest::new("README.md", &changes(), Some("# Doc".to_owned()));
        assert_eq!(req.added, vec!["queries/q8.sql"]);
        assert_eq!(req.modified.len(), 2);
        assert!(req.removed.is_empty());
    }

    #[test]
    fn prompt_lists_counts_and_files() {
        let req = UpdateRequest::new("README.md", &changes(), Some("# Doc\n## Intro".to_owned()));
        let prompt = render_prompt(&req, "2025-11-03T10:00:00Z");
        assert!(prompt.contains("**Files Added (1):**\n  - queries/q8.sql"));
        assert!(prompt.contains("**Files Modified (2):**"));
        assert!(prompt.contains("**Files Removed (0):**\n  (none)"));
        assert!(prompt.contains("```markdown\n# Doc\n## Intro\n```"));
        assert!(prompt.contains("\"timestamp\": \"2025-11-03T10:00:00Z\""));
        assert!(prompt.contains("Update the existing README.md"));
    }

    #[test]
    fn prompt_marks_missing_document() {
        let req = UpdateRequest::new("docs/GUIDE.md", &ChangeSet::default(), None);
        let prompt = render_prompt(&req, "t");
        assert!(prompt.contains("(File not found)"));
    }

    #[test]
    fn request_serializes_with_flat_lists() {
        let req = UpdateRequest::new("README.md", &changes(), None);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["added"][0], "queries/q8.sql");
        assert!(value["document"].is_null());
    }
}
