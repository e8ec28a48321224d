use grader_core::model::{GradeStatus, PartLabel, PartResult, Qtag, UnitId};

/// Placeholder shown for a part that has never been graded.
pub const NOT_GRADED: &str = "Not graded";

pub const GRADE_LABEL: &str = "Grade";
pub const GRADING_LABEL: &str = "Grading...";

/// Everything needed to render the selected question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionView {
    pub unit: UnitId,
    pub qtag: Qtag,
    pub text: String,
    pub student_solution: String,
    /// `all` first, then the declared parts in order.
    pub part_options: Vec<PartLabel>,
    pub selected_part: PartLabel,
    pub part: PartView,
    pub grade_button: GradeButton,
    /// Inline error from the last failed action.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartView {
    pub feedback: String,
    pub explanation: String,
    pub status_label: String,
}

impl PartView {
    #[must_use]
    pub fn from_result(result: Option<&PartResult>) -> Self {
        match result {
            Some(result) => Self {
                feedback: result.feedback.clone(),
                explanation: result.explanation.clone(),
                status_label: match &result.grade_status {
                    GradeStatus::Unset => NOT_GRADED.to_string(),
                    status => status.human_label().to_string(),
                },
            },
            None => Self {
                feedback: String::new(),
                explanation: String::new(),
                status_label: NOT_GRADED.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradeButton {
    pub enabled: bool,
    pub label: &'static str,
}

impl GradeButton {
    #[must_use]
    pub fn new(in_flight: bool) -> Self {
        Self {
            enabled: !in_flight,
            label: if in_flight { GRADING_LABEL } else { GRADE_LABEL },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ungraded_part_shows_placeholder() {
        let view = PartView::from_result(None);
        assert_eq!(view.status_label, NOT_GRADED);
        assert!(view.feedback.is_empty());

        let blank = PartView::from_result(Some(&PartResult::default()));
        assert_eq!(blank.status_label, NOT_GRADED);
    }

    #[test]
    fn graded_part_shows_human_label() {
        let result = PartResult {
            feedback: "Check the sign.".into(),
            explanation: "Sign error in step 2.".into(),
            grade_status: GradeStatus::Fail,
        };
        let view = PartView::from_result(Some(&result));
        assert_eq!(view.status_label, "incorrect");
        assert_eq!(view.feedback, "Check the sign.");
    }

    #[test]
    fn button_disables_while_grading() {
        assert_eq!(GradeButton::new(false).label, "Grade");
        let busy = GradeButton::new(true);
        assert!(!busy.enabled);
        assert_eq!(busy.label, "Grading...");
    }
}
