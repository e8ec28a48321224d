//! Plain-text rendering of controller views for the terminal.

use grader_core::UnitStatus;
use grader_core::wrap::{WRAP_WIDTH, wrap_text};
use services::{GradeVerdict, QuestionView};
use storage::GradeEventRecord;

pub fn question(view: &QuestionView) -> String {
    let mut out = format!("{} / {}\n{}\n", view.unit, view.qtag, "-".repeat(WRAP_WIDTH));
    push_wrapped(&mut out, &view.text);

    let parts: Vec<&str> = view.part_options.iter().map(|p| p.as_str()).collect();
    out.push_str(&format!("\nParts: {}\n", parts.join(", ")));

    out.push_str("\nSolution:\n");
    if view.student_solution.is_empty() {
        out.push_str("(empty)\n");
    } else {
        out.push_str(&view.student_solution);
        out.push('\n');
    }

    out.push_str(&format!("\n[{}] {}\n", view.selected_part, view.part.status_label));
    if !view.part.feedback.is_empty() {
        out.push_str("Feedback:\n");
        push_wrapped(&mut out, &view.part.feedback);
    }
    if !view.part.explanation.is_empty() {
        out.push_str("Explanation:\n");
        push_wrapped(&mut out, &view.part.explanation);
    }
    if let Some(error) = &view.error {
        out.push_str(&format!("\nerror: {error}\n"));
    }
    out
}

pub fn unit_table(status: &UnitStatus) -> String {
    let mut out = format!(
        "{:<12} {:<9} {:<12} {:>7}  {}\n",
        "question", "required", "completed", "points", "state"
    );
    for row in &status.rows {
        let state = row
            .status
            .classification()
            .map_or("-", |class| class.css_class());
        out.push_str(&format!(
            "{:<12} {:<9} {:<12} {:>7}  {}\n",
            row.qtag.as_str(),
            if row.required { "yes" } else { "no" },
            row.status.completed_label(),
            format!("{}/{}", row.status.earned_points, row.status.total_points),
            state
        ));
    }
    out.push_str(&format!(
        "\nTotal: {}/{}  Required: {}/{}\n",
        status.earned, status.possible, status.required_earned, status.required_possible
    ));
    out
}

pub fn verdict(verdict: &GradeVerdict) -> String {
    let mut out = format!("Result: {}\n", verdict.result.human_label());
    if !verdict.feedback.is_empty() {
        out.push_str("Feedback:\n");
        push_wrapped(&mut out, &verdict.feedback);
    }
    out
}

pub fn events(events: &[GradeEventRecord]) -> String {
    events
        .iter()
        .map(|record| {
            let event = &record.event;
            format!(
                "{:>5}  {}  {}/{}/{}  {}  {}  {}ms\n",
                record.id,
                event.created_at.format("%Y-%m-%d %H:%M:%S"),
                event.unit_id,
                event.qtag,
                event.part_label,
                event.model,
                event.result,
                event.latency_ms
            )
        })
        .collect()
}

fn push_wrapped(out: &mut String, text: &str) {
    for line in wrap_text(text, WRAP_WIDTH) {
        out.push_str(&line);
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grader_core::model::{
        EntryPatch, GradeStatus, Part, PartLabel, PartPatch, Qtag, Question, SessionEntry, Unit,
        UnitId, UnitSessions,
    };

    #[test]
    fn unit_table_lists_rows_and_totals() {
        let unit = Unit::new(
            UnitId::new("unit1"),
            vec![
                Question::new("q1", true, vec![Part::new("a", 5), Part::new("b", 5)]).unwrap(),
                Question::new("q2", false, Vec::new()).unwrap(),
            ],
        )
        .unwrap();
        let mut entry = SessionEntry::default();
        entry.apply(EntryPatch::Part {
            label: PartLabel::new("a"),
            patch: PartPatch::verdict(GradeStatus::Pass, "", ""),
        });
        let mut sessions = UnitSessions::new();
        sessions.insert(Qtag::new("q1"), entry);

        let text = unit_table(&UnitStatus::compute(&unit, Some(&sessions)));
        let rows: Vec<&str> = text.lines().collect();
        assert!(rows[1].starts_with("q1"));
        assert!(rows[1].contains("5/10"));
        assert!(rows[1].ends_with("partial"));
        assert!(rows[2].ends_with('-'));
        assert!(text.contains("Total: 5/10  Required: 5/10"));
    }

    #[test]
    fn verdict_uses_human_label() {
        let text = verdict(&GradeVerdict {
            result: GradeStatus::Fail,
            feedback: "Check your units.".into(),
            full_explanation: String::new(),
        });
        assert_eq!(text, "Result: incorrect\nFeedback:\nCheck your units.\n");
    }
}
