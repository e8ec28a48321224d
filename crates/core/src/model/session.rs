use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::ids::{PartLabel, Qtag, UnitId};

//
// ─── GRADE STATUS ─────────────────────────────────────────────────────────────
//

/// Grading state of one part.
///
/// Persisted as a plain string so values written by other tools survive a
/// load/save cycle unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GradeStatus {
    #[default]
    Unset,
    Pass,
    Fail,
    Error,
    Other(String),
}

impl GradeStatus {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            GradeStatus::Unset => "",
            GradeStatus::Pass => "pass",
            GradeStatus::Fail => "fail",
            GradeStatus::Error => "error",
            GradeStatus::Other(raw) => raw,
        }
    }

    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, GradeStatus::Pass)
    }

    /// Label shown to students in transcripts.
    #[must_use]
    pub fn human_label(&self) -> &str {
        match self {
            GradeStatus::Pass => "correct",
            GradeStatus::Fail => "incorrect",
            GradeStatus::Unset => "not graded",
            other => other.as_str(),
        }
    }
}

/// Known values match after trimming and ASCII case folding; anything else
/// is kept verbatim.
impl From<String> for GradeStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" => GradeStatus::Unset,
            "pass" => GradeStatus::Pass,
            "fail" => GradeStatus::Fail,
            "error" => GradeStatus::Error,
            _ => GradeStatus::Other(raw),
        }
    }
}

impl From<&str> for GradeStatus {
    fn from(raw: &str) -> Self {
        GradeStatus::from(raw.to_string())
    }
}

impl From<GradeStatus> for String {
    fn from(status: GradeStatus) -> Self {
        match status {
            GradeStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for GradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── ENTRIES ──────────────────────────────────────────────────────────────────
//

/// Grading result stored for one part (or for `all`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartResult {
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub grade_status: GradeStatus,
}

/// Persisted solution and grading state for one (unit, question) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionEntry {
    #[serde(default)]
    pub student_solution: String,
    #[serde(default)]
    pub parts: BTreeMap<PartLabel, PartResult>,
}

impl SessionEntry {
    #[must_use]
    pub fn part(&self, label: &PartLabel) -> Option<&PartResult> {
        self.parts.get(label)
    }

    /// Apply a patch in place.
    pub fn apply(&mut self, patch: EntryPatch) {
        match patch {
            EntryPatch::Solution(text) => self.student_solution = text,
            EntryPatch::Part { label, patch } => {
                patch.merge_into(self.parts.entry(label).or_default());
            }
        }
    }
}

/// Entries of a single unit keyed by question tag.
pub type UnitSessions = BTreeMap<Qtag, SessionEntry>;

/// Entire persisted session blob.
pub type SessionState = BTreeMap<UnitId, UnitSessions>;

//
// ─── PATCHES ──────────────────────────────────────────────────────────────────
//

/// Field-wise merge for a `PartResult`; only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartPatch {
    pub feedback: Option<String>,
    pub explanation: Option<String>,
    pub grade_status: Option<GradeStatus>,
}

impl PartPatch {
    /// Patch carrying a full grading verdict.
    #[must_use]
    pub fn verdict(
        grade_status: GradeStatus,
        feedback: impl Into<String>,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            feedback: Some(feedback.into()),
            explanation: Some(explanation.into()),
            grade_status: Some(grade_status),
        }
    }

    pub fn merge_into(self, target: &mut PartResult) {
        if let Some(feedback) = self.feedback {
            target.feedback = feedback;
        }
        if let Some(explanation) = self.explanation {
            target.explanation = explanation;
        }
        if let Some(status) = self.grade_status {
            target.grade_status = status;
        }
    }
}

/// A single mutation of a session entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPatch {
    /// Question-level edit of the student solution; never touches parts.
    Solution(String),
    /// Merge into `parts[label]`, creating it with defaults when absent.
    Part { label: PartLabel, patch: PartPatch },
}
