//! Per-question and per-unit point aggregation.
//!
//! Everything here is a pure function of the question metadata and the
//! stored session entry; nothing is cached or mutated.

use crate::model::{PartLabel, Qtag, Question, SessionEntry, Unit, UnitSessions};

/// Display classification of a question's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Nothing earned and never graded.
    None,
    /// Graded at least once but nothing earned yet.
    AttemptedZero,
    /// Some, but not all, points earned.
    Partial,
    /// Every point earned.
    Full,
}

impl Classification {
    #[must_use]
    pub fn css_class(self) -> &'static str {
        match self {
            Classification::None => "none",
            Classification::AttemptedZero => "attempted-zero",
            Classification::Partial => "partial",
            Classification::Full => "full",
        }
    }
}

/// Completion summary for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionStatus {
    pub completed_parts: Vec<PartLabel>,
    pub earned_points: u32,
    pub total_points: u32,
    pub is_complete: bool,
    pub has_attempts: bool,
}

impl QuestionStatus {
    /// `None` for questions worth zero points.
    #[must_use]
    pub fn classification(&self) -> Option<Classification> {
        if self.total_points == 0 {
            return None;
        }
        let class = if self.earned_points == 0 {
            if self.has_attempts {
                Classification::AttemptedZero
            } else {
                Classification::None
            }
        } else if self.earned_points < self.total_points {
            Classification::Partial
        } else {
            Classification::Full
        };
        Some(class)
    }

    /// Completed parts joined for table display, e.g. `"a, b"`.
    #[must_use]
    pub fn completed_label(&self) -> String {
        self.completed_parts
            .iter()
            .map(PartLabel::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Compute the completion summary of `question` from its stored entry.
///
/// A pass on the whole-question `all` part awards full credit and wins over
/// any disagreeing per-part results.
#[must_use]
pub fn compute_status(entry: Option<&SessionEntry>, question: &Question) -> QuestionStatus {
    let parts = question.effective_parts();
    let total_points: u32 = parts.iter().map(|p| p.points).sum();
    let has_attempts = entry.is_some_and(|e| !e.parts.is_empty());

    let passed = |label: &PartLabel| {
        entry
            .and_then(|e| e.part(label))
            .is_some_and(|r| r.grade_status.is_pass())
    };

    let mut earned_from_individual = 0_u32;
    let mut correct = Vec::new();
    for part in &parts {
        if passed(&part.label) {
            earned_from_individual = earned_from_individual.saturating_add(part.points);
            correct.push(part.label.clone());
        }
    }

    let all_passed = passed(&PartLabel::all());
    let earned_from_all = if all_passed { total_points } else { 0 };
    let earned_points = earned_from_individual.max(earned_from_all);

    let completed_parts = if earned_from_all == total_points
        || (!parts.is_empty() && correct.len() == parts.len())
    {
        vec![PartLabel::all()]
    } else {
        correct
    };

    QuestionStatus {
        completed_parts,
        earned_points,
        total_points,
        is_complete: earned_points == total_points && total_points > 0,
        has_attempts,
    }
}

/// One row of the unit dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionRow {
    pub qtag: Qtag,
    pub required: bool,
    pub status: QuestionStatus,
}

/// Aggregated totals over a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStatus {
    pub rows: Vec<QuestionRow>,
    pub earned: u32,
    pub possible: u32,
    pub required_earned: u32,
    pub required_possible: u32,
}

impl UnitStatus {
    #[must_use]
    pub fn compute(unit: &Unit, sessions: Option<&UnitSessions>) -> Self {
        let mut totals = Self {
            rows: Vec::with_capacity(unit.questions().len()),
            earned: 0,
            possible: 0,
            required_earned: 0,
            required_possible: 0,
        };

        for question in unit.questions() {
            let entry = sessions.and_then(|s| s.get(question.qtag()));
            let status = compute_status(entry, question);

            totals.earned += status.earned_points;
            totals.possible += status.total_points;
            if question.required() {
                totals.required_earned += status.earned_points;
                totals.required_possible += status.total_points;
            }

            totals.rows.push(QuestionRow {
                qtag: question.qtag().clone(),
                required: question.required(),
                status,
            });
        }

        totals
    }
}
