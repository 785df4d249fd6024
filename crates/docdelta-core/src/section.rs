//! Markdown section replacement.
//!
//! A *section* starts at a second-level heading (`## ` at the start of a
//! line) and runs up to, not including, the next second-level heading, the
//! next first-level heading (`# `), or the end of the document.
//!
//! [`patch`] replaces the first section whose heading line contains the
//! requested name as a substring. The old heading is dropped along with the
//! body; the replacement is expected to carry its own heading. Every line
//! outside the span is preserved verbatim and in order.
//!
//! Matching is by substring: a request for `"SQL Development"`
//! also matches `## Advanced SQL Development Notes`. Only the first match is
//! replaced per call.
//!
//! Documents are handled as `\n`-separated lines. [`split_lines`] and
//! [`join_lines`] are exact inverses, so a document that patches nothing
//! comes back byte-identical.

use std::ops::Range;

use tracing::{debug, warn};

use crate::batch::SectionUpdate;

// ---------------------------------------------------------------------------
// Line helpers
// ---------------------------------------------------------------------------

/// Split document text into lines on `\n`.
///
/// Unlike [`str::lines`], a trailing newline yields a trailing empty line so
/// that [`join_lines`] restores the exact input.
#[must_use]
pub fn split_lines(text: &str) -> Vec<String> {
    text.split('\n').map(str::to_owned).collect()
}

/// Join lines with `\n`. Inverse of [`split_lines`].
#[must_use]
pub fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(line.as_ref());
    }
    out
}

/// A second-level heading: exactly two markers followed by a space.
#[must_use]
pub fn is_section_heading(line: &str) -> bool {
    line.starts_with("## ")
}

/// A first-level heading: one marker followed by a space.
#[must_use]
pub fn is_title_heading(line: &str) -> bool {
    line.starts_with("# ")
}

fn ends_section(line: &str) -> bool {
    is_section_heading(line) || is_title_heading(line)
}

// ---------------------------------------------------------------------------
// Single-section patch
// ---------------------------------------------------------------------------

/// Locate the first section whose heading contains `section_name`.
///
/// Returns the half-open line range `heading..boundary` in `document`.
#[must_use]
pub fn find_section<S: AsRef<str>>(document: &[S], section_name: &str) -> Option<Range<usize>> {
    let start = document.iter().position(|line| {
        let line = line.as_ref();
        is_section_heading(line) && line.contains(section_name)
    })?;

    let end = document[start + 1..]
        .iter()
        .position(|line| ends_section(line.as_ref()))
        .map_or(document.len(), |offset| start + 1 + offset);

    Some(start..end)
}

/// Outcome of a single [`patch`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchResult {
    /// The document after patching (identical to the input on no match).
    pub lines: Vec<String>,
    /// The replaced line range in the *input* document, if any.
    pub replaced: Option<Range<usize>>,
}

impl PatchResult {
    /// Whether a section matched and was replaced.
    #[must_use]
    pub const fn is_match(&self) -> bool {
        self.replaced.is_some()
    }
}

/// Replace the first section matching `section_name` with `replacement`.
///
/// On no match, `lines` is an element-for-element copy of `document` and
/// `replaced` is `None`. Callers should surface that as a warning.
#[must_use]
pub fn patch<S: AsRef<str>>(document: &[S], section_name: &str, replacement: &str) -> PatchResult {
    let Some(span) = find_section(document, section_name) else {
        return PatchResult {
            lines: document.iter().map(|l| l.as_ref().to_owned()).collect(),
            replaced: None,
        };
    };

    let replacement_lines = split_lines(replacement);
    let mut lines =
        Vec::with_capacity(document.len() - span.len() + replacement_lines.len());
    lines.extend(document[..span.start].iter().map(|l| l.as_ref().to_owned()));
    lines.extend(replacement_lines);
    lines.extend(document[span.end..].iter().map(|l| l.as_ref().to_owned()));

    PatchResult {
        lines,
        replaced: Some(span),
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// What happened to one [`SectionUpdate`] of a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SectionOutcome {
    /// The section was found and replaced.
    Replaced {
        /// Lines dropped from the document (heading included).
        removed: usize,
        /// Lines spliced in from the replacement.
        inserted: usize,
    },
    /// No heading contained the name; the document was left as is.
    NotFound,
}

/// Per-update report of a batch application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionReport {
    /// The requested section name.
    pub section_name: String,
    /// The reason given for the update.
    pub reason: String,
    /// Whether it was applied.
    pub outcome: SectionOutcome,
}

impl SectionReport {
    /// Whether the update was applied.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self.outcome, SectionOutcome::Replaced { .. })
    }
}

/// Result of applying every update of a batch to a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Document text after all updates.
    pub text: String,
    /// One report per update, in batch order.
    pub sections: Vec<SectionReport>,
}

impl BatchOutcome {
    /// Reports for updates that were applied.
    pub fn applied(&self) -> impl Iterator<Item = &SectionReport> {
        self.sections.iter().filter(|s| s.is_applied())
    }

    /// Reports for updates whose section was not found.
    pub fn missing(&self) -> impl Iterator<Item = &SectionReport> {
        self.sections.iter().filter(|s| !s.is_applied())
    }
}

/// Apply `updates` to `document` sequentially.
///
/// Each update operates on the output of the previous one, so an update can
/// target a heading introduced by an earlier replacement, and misses one
/// removed by it. Unmatched updates are skipped with a warning.
#[must_use]
pub fn apply_batch(document: &str, updates: &[SectionUpdate]) -> BatchOutcome {
    let mut lines = split_lines(document);
    let mut sections = Vec::with_capacity(updates.len());

    for update in updates {
        let result = patch(&lines, &update.section_name, &update.updated_content);
        let outcome = match &result.replaced {
            Some(span) => {
                let inserted = result.lines.len() + span.len() - lines.len();
                debug!(
                    section = %update.section_name,
                    removed = span.len(),
                    inserted,
                    "replaced section"
                );
                SectionOutcome::Replaced {
                    removed: span.len(),
                    inserted,
                }
            }
            None => {
                warn!(section = %update.section_name, "section not found; update skipped");
                SectionOutcome::NotFound
            }
        };
        lines = result.lines;
        sections.push(SectionReport {
            section_name: update.section_name.clone(),
            reason: update.reason.clone(),
            outcome,
        });
    }

    BatchOutcome {
        text: join_lines(&lines),
        sections,
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_line() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z ]{0,8}",
            "## [A-C]{1,2}",
            "# [A-C]",
            "### [a-c]",
        ]
    }

    fn arb_doc() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(arb_line(), 0..20)
    }

    proptest! {
        #[test]
        fn prop_absent_name_is_identity(d in arb_doc()) {
            let result = patch(&d, "ZZZ", "## ZZZ\nbody");
            prop_assert_eq!(result.lines, d);
            prop_assert!(result.replaced.is_none());
        }

        #[test]
        fn prop_lines_outside_span_are_preserved(d in arb_doc(), name in "[A-C]") {
            let result = patch(&d, &name, "## R\nr1\nr2");
            if let Some(span) = result.replaced {
                prop_assert_eq!(&result.lines[..span.start], &d[..span.start]);
                let tail = &d[span.end..];
                prop_assert_eq!(&result.lines[result.lines.len() - tail.len()..], tail);
                prop_assert_eq!(result.lines.len(), d.len() - span.len() + 3);
            }
        }

        #[test]
        fn prop_span_starts_at_matching_heading(d in arb_doc(), name in "[A-C]") {
            if let Some(span) = find_section(&d, &name) {
                prop_assert!(is_section_heading(&d[span.start]));
                prop_assert!(d[span.start].contains(name.as_str()));
                for line in &d[span.start + 1..span.end] {
                    prop_assert!(!is_section_heading(line) && !is_title_heading(line));
                }
            }
        }
    }
}
