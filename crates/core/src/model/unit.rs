use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{PartLabel, Qtag, UnitId};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UnitError {
    #[error("duplicate question tag: {0}")]
    DuplicateQtag(Qtag),

    #[error("question {qtag} has duplicate part label: {label}")]
    DuplicatePart { qtag: Qtag, label: PartLabel },

    #[error("question {qtag} uses the reserved part label \"all\"")]
    ReservedPartLabel { qtag: Qtag },

    #[error("question tag must not be empty")]
    EmptyQtag,
}

//
// ─── PART ─────────────────────────────────────────────────────────────────────
//

/// A scored sub-component of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub label: PartLabel,
    pub points: u32,
}

impl Part {
    #[must_use]
    pub fn new(label: impl Into<String>, points: u32) -> Self {
        Self {
            label: PartLabel::new(label),
            points,
        }
    }
}

//
// ─── QUESTION ─────────────────────────────────────────────────────────────────
//

/// Unvalidated question shape as authored by instructors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestionDraft {
    pub qtag: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub grade: bool,
    #[serde(default)]
    pub points: Option<u32>,
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default)]
    pub reference_solution: String,
    #[serde(default)]
    pub grading_notes: String,
    #[serde(default)]
    pub preferred_model: Option<String>,
}

impl QuestionDraft {
    /// Validate the draft into a `Question`.
    ///
    /// # Errors
    ///
    /// Returns `UnitError` if the tag is empty, a part label repeats, or a
    /// part claims the reserved `all` label.
    pub fn validate(self) -> Result<Question, UnitError> {
        let qtag = self.qtag.trim();
        if qtag.is_empty() {
            return Err(UnitError::EmptyQtag);
        }
        let qtag = Qtag::new(qtag);

        let mut seen = HashSet::new();
        for part in &self.parts {
            if part.label.is_all() {
                return Err(UnitError::ReservedPartLabel { qtag });
            }
            if !seen.insert(part.label.as_str()) {
                return Err(UnitError::DuplicatePart {
                    qtag,
                    label: part.label.clone(),
                });
            }
        }

        Ok(Question {
            qtag,
            text: self.text,
            required: self.grade,
            points: self.points,
            parts: self.parts,
            reference_solution: self.reference_solution,
            grading_notes: self.grading_notes,
            preferred_model: self.preferred_model,
        })
    }
}

/// One gradable item within a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    qtag: Qtag,
    text: String,
    #[serde(rename = "grade")]
    required: bool,
    points: Option<u32>,
    parts: Vec<Part>,
    reference_solution: String,
    grading_notes: String,
    preferred_model: Option<String>,
}

impl Question {
    /// Build a question with the given parts and no reference material.
    ///
    /// # Errors
    ///
    /// See [`QuestionDraft::validate`].
    pub fn new(
        qtag: impl Into<String>,
        required: bool,
        parts: Vec<Part>,
    ) -> Result<Self, UnitError> {
        QuestionDraft {
            qtag: qtag.into(),
            grade: required,
            parts,
            ..QuestionDraft::default()
        }
        .validate()
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    #[must_use]
    pub fn with_points(mut self, points: u32) -> Self {
        self.points = Some(points);
        self
    }

    #[must_use]
    pub fn with_reference(
        mut self,
        reference_solution: impl Into<String>,
        grading_notes: impl Into<String>,
    ) -> Self {
        self.reference_solution = reference_solution.into();
        self.grading_notes = grading_notes.into();
        self
    }

    #[must_use]
    pub fn qtag(&self) -> &Qtag {
        &self.qtag
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the question counts toward the required-points total.
    #[must_use]
    pub fn required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    #[must_use]
    pub fn reference_solution(&self) -> &str {
        &self.reference_solution
    }

    #[must_use]
    pub fn grading_notes(&self) -> &str {
        &self.grading_notes
    }

    #[must_use]
    pub fn preferred_model(&self) -> Option<&str> {
        self.preferred_model.as_deref()
    }

    /// Sum of part points, or the declared total when no parts exist.
    #[must_use]
    pub fn total_points(&self) -> u32 {
        if self.parts.is_empty() {
            self.points.unwrap_or(0)
        } else {
            self.parts.iter().map(|p| p.points).sum()
        }
    }

    /// The declared parts, or one implicit `all` part worth the full total.
    #[must_use]
    pub fn effective_parts(&self) -> Vec<Part> {
        if self.parts.is_empty() {
            vec![Part {
                label: PartLabel::all(),
                points: self.total_points(),
            }]
        } else {
            self.parts.clone()
        }
    }

    /// Options for the part selector: `all` first, then each declared part.
    #[must_use]
    pub fn part_options(&self) -> Vec<PartLabel> {
        std::iter::once(PartLabel::all())
            .chain(self.parts.iter().map(|p| p.label.clone()))
            .collect()
    }

    #[must_use]
    pub fn has_part_option(&self, label: &PartLabel) -> bool {
        label.is_all() || self.parts.iter().any(|p| &p.label == label)
    }
}

impl TryFrom<QuestionDraft> for Question {
    type Error = UnitError;

    fn try_from(draft: QuestionDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl<'de> Deserialize<'de> for Question {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        QuestionDraft::deserialize(deserializer)?
            .validate()
            .map_err(serde::de::Error::custom)
    }
}

//
// ─── UNIT ─────────────────────────────────────────────────────────────────────
//

/// A named, ordered collection of questions distributed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    id: UnitId,
    questions: Vec<Question>,
}

impl Unit {
    /// # Errors
    ///
    /// Returns `UnitError::DuplicateQtag` if two questions share a tag.
    pub fn new(id: UnitId, questions: Vec<Question>) -> Result<Self, UnitError> {
        let mut seen = HashSet::new();
        for question in &questions {
            if !seen.insert(question.qtag().as_str()) {
                return Err(UnitError::DuplicateQtag(question.qtag().clone()));
            }
        }
        Ok(Self { id, questions })
    }

    #[must_use]
    pub fn id(&self) -> &UnitId {
        &self.id
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Question tags in authored order.
    #[must_use]
    pub fn qtags(&self) -> Vec<Qtag> {
        self.questions.iter().map(|q| q.qtag().clone()).collect()
    }

    #[must_use]
    pub fn question(&self, qtag: &Qtag) -> Option<&Question> {
        self.questions.iter().find(|q| q.qtag() == qtag)
    }

    #[must_use]
    pub fn first_qtag(&self) -> Option<&Qtag> {
        self.questions.first().map(Question::qtag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_points_sums_parts() {
        let q = Question::new("q1", true, vec![Part::new("a", 5), Part::new("b", 5)])
            .unwrap()
            .with_points(99);
        assert_eq!(q.total_points(), 10);
    }

    #[test]
    fn question_without_parts_gets_implicit_all_part() {
        let q = Question::new("q1", true, Vec::new()).unwrap().with_points(7);
        let parts = q.effective_parts();
        assert_eq!(parts.len(), 1);
        assert!(parts[0].label.is_all());
        assert_eq!(parts[0].points, 7);
    }

    #[test]
    fn part_options_prepend_all() {
        let q = Question::new("q1", false, vec![Part::new("a", 1), Part::new("b", 2)]).unwrap();
        let labels: Vec<_> = q.part_options().iter().map(|l| l.to_string()).collect();
        assert_eq!(labels, ["all", "a", "b"]);
    }

    #[test]
    fn rejects_duplicate_and_reserved_labels() {
        let dup = Question::new("q1", true, vec![Part::new("a", 1), Part::new("a", 2)]);
        assert!(matches!(dup, Err(UnitError::DuplicatePart { .. })));

        let reserved = Question::new("q1", true, vec![Part::new("all", 1)]);
        assert!(matches!(reserved, Err(UnitError::ReservedPartLabel { .. })));
    }

    #[test]
    fn unit_rejects_duplicate_qtags() {
        let q = Question::new("q1", true, Vec::new()).unwrap();
        let err = Unit::new(UnitId::new("u"), vec![q.clone(), q]).unwrap_err();
        assert_eq!(err, UnitError::DuplicateQtag(Qtag::new("q1")));
    }

    #[test]
    fn question_deserializes_from_authored_json() {
        let q: Question = serde_json::from_str(
            r#"{"qtag":"q1","text":"Find x","grade":true,
                "parts":[{"label":"a","points":3},{"label":"b","points":4}]}"#,
        )
        .unwrap();
        assert!(q.required());
        assert_eq!(q.total_points(), 7);
        assert_eq!(q.text(), "Find x");
    }
}
