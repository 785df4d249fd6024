//! Update batches returned by the external text service.
//!
//! An [`UpdateBatch`] is an ordered list of [`SectionUpdate`]s plus a
//! changelog summary and timestamp. A batch is accepted or rejected as a
//! whole: [`UpdateBatch::from_json`] never yields a partially usable batch.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One requested edit, addressed by heading name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionUpdate {
    /// Text matched (as a substring) against second-level heading lines.
    pub section_name: String,
    /// Why this section changes; recorded in the changelog.
    pub reason: String,
    /// Replacement block, normally starting with its own `## ` heading.
    pub updated_content: String,
}

/// The atomic unit applied to one target document.
///
/// `sections_to_update` is applied in order, each edit seeing the result of
/// the previous one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBatch {
    /// Edits, in application order.
    pub sections_to_update: Vec<SectionUpdate>,
    /// One-line summary for the changelog.
    pub changelog_entry: String,
    /// Timestamp supplied by the producer of the batch (ISO-8601 text).
    pub timestamp: String,
}

/// Why a batch was rejected.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Not valid JSON, or a required field is missing or mistyped.
    #[error("malformed update batch: {0}")]
    Json(#[from] serde_json::Error),

    /// A section name is empty or whitespace, which would match every heading.
    #[error("malformed update batch: sections_to_update[{index}] has an empty section_name")]
    EmptySectionName {
        /// Position of the offending update in the batch.
        index: usize,
    },
}

impl UpdateBatch {
    /// Parse and validate a batch from JSON text.
    ///
    /// # Errors
    /// Returns [`BatchError`] if the JSON is malformed, a required field is
    /// missing, or any update fails validation.
    pub fn from_json(json: &str) -> Result<Self, BatchError> {
        let batch: Self = serde_json::from_str(json)?;
        batch.validate()?;
        Ok(batch)
    }

    /// Check invariants that serde alone cannot express.
    ///
    /// # Errors
    /// Returns [`BatchError::EmptySectionName`] for the first blank name.
    pub fn validate(&self) -> Result<(), BatchError> {
        if let Some(index) = self
            .sections_to_update
            .iter()
            .position(|u| u.section_name.trim().is_empty())
        {
            return Err(BatchError::EmptySectionName { index });
        }
        Ok(())
    }

    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    /// Returns [`BatchError::Json`] on serialization failure.
    pub fn to_json(&self) -> Result<String, BatchError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r###"{
        "sections_to_update": [
            {"section_name": "File Organization", "reason": "New files added: example.sql", "updated_content": "## File Organization\n- example.sql"},
            {"section_name": "SQL Development", "reason": "Query 8 added", "updated_content": "## SQL Development\nQuery 8"}
        ],
        "changelog_entry": "Added Query 8",
        "timestamp": "2025-11-03T10:00:00"
    }"###;

    #[test]
    fn parses_valid_batch_in_order() {
        let batch = UpdateBatch::from_json(VALID).unwrap();
        assert_eq!(batch.sections_to_update.len(), 2);
        assert_eq!(batch.sections_to_update[0].section_name, "File Organization");
        assert_eq!(batch.sections_to_update[1].section_name, "SQL Development");
        assert_eq!(batch.changelog_entry, "Added Query 8");
    }

    #[test]
    fn missing_changelog_entry_is_rejected() {
        let json = r#"{"sections_to_update": [], "timestamp": "t"}"#;
        let err = UpdateBatch::from_json(json).unwrap_err();
        assert!(matches!(err, BatchError::Json(_)));
        assert!(err.to_string().contains("changelog_entry"));
    }

    #[test]
    fn missing_update_field_rejects_whole_batch() {
        let json = r###"{
            "sections_to_update": [
                {"section_name": "A", "reason": "r", "updated_content": "## A"},
                {"section_name": "B", "reason": "r"}
            ],
            "changelog_entry": "x",
            "timestamp": "t"
        }"###;
        let err = UpdateBatch::from_json(json).unwrap_err();
        assert!(err.to_string().contains("updated_content"));
    }

    #[test]
    fn blank_section_name_is_rejected() {
        let json = r###"{
            "sections_to_update": [
                {"section_name": "A", "reason": "r", "updated_content": "## A"},
                {"section_name": "  ", "reason": "r", "updated_content": "## B"}
            ],
            "changelog_entry": "x",
            "timestamp": "t"
        }"###;
        let err = UpdateBatch::from_json(json).unwrap_err();
        assert!(matches!(err, BatchError::EmptySectionName { index: 1 }));
    }

    #[test]
    fn not_json_is_rejected() {
        assert!(UpdateBatch::from_json("Here are your updates!").is_err());
    }

    #[test]
    fn extra_fields_are_tolerated() {
        let json = r#"{"sections_to_update": [], "changelog_entry": "x", "timestamp": "t", "model": "m"}"#;
        let batch = UpdateBatch::from_json(json).unwrap();
        assert!(batch.sections_to_update.is_empty());
    }

    #[test]
    fn to_json_reparses() {
        let batch = UpdateBatch::from_json(VALID).unwrap();
        let again = UpdateBatch::from_json(&batch.to_json().unwrap()).unwrap();
        assert_eq!(batch, again);
    }
}
