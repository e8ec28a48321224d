//! Submission artifacts and results export.

use std::io::{Cursor, Write as _};

use grader_core::model::{SessionEntry, Unit, UnitId, UnitSessions};
use grader_core::wrap::{WRAP_WIDTH, wrap_text};
use grader_core::{Clock, compute_status};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::error::ExportError;

/// Graded work for the required questions of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    unit: UnitId,
    record: UnitSessions,
    transcript: String,
}

impl Submission {
    #[must_use]
    pub fn unit(&self) -> &UnitId {
        &self.unit
    }

    /// Filtered entries, re-importable as a results file.
    #[must_use]
    pub fn record(&self) -> &UnitSessions {
        &self.record
    }

    #[must_use]
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// # Errors
    ///
    /// Returns `ExportError::Serialize` if the record cannot be encoded.
    pub fn record_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(&self.record)?)
    }

    #[must_use]
    pub fn archive_name(&self) -> String {
        format!("submission_{}.zip", self.unit)
    }

    /// Zip the JSON record and the text transcript together.
    ///
    /// # Errors
    ///
    /// Returns `ExportError` if encoding or zipping fails.
    pub fn to_archive(&self) -> Result<Vec<u8>, ExportError> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));

        writer.start_file(format!("submission_{}.json", self.unit), options)?;
        writer.write_all(self.record_json()?.as_bytes())?;

        writer.start_file(format!("submission_{}.txt", self.unit), options)?;
        writer.write_all(self.transcript.as_bytes())?;

        Ok(writer.finish()?.into_inner())
    }
}

/// Collect the required questions that have stored entries.
///
/// Questions are kept in unit order; the session store is only read.
///
/// # Errors
///
/// Returns `ExportError::EmptySubmission` when no required question has an
/// entry.
pub fn build_submission(
    unit: &Unit,
    sessions: Option<&UnitSessions>,
    clock: &Clock,
) -> Result<Submission, ExportError> {
    let record: UnitSessions = unit
        .questions()
        .iter()
        .filter(|question| question.required())
        .filter_map(|question| {
            sessions
                .and_then(|s| s.get(question.qtag()))
                .map(|entry| (question.qtag().clone(), entry.clone()))
        })
        .collect();

    if record.is_empty() {
        return Err(ExportError::EmptySubmission);
    }

    let transcript = render_transcript(unit, &record, clock);
    Ok(Submission {
        unit: unit.id().clone(),
        record,
        transcript,
    })
}

fn render_transcript(unit: &Unit, record: &UnitSessions, clock: &Clock) -> String {
    let rule = "=".repeat(WRAP_WIDTH);
    let mut earned = 0_u32;
    let mut possible = 0_u32;
    let mut body = String::new();

    for question in unit.questions() {
        let Some(entry) = record.get(question.qtag()) else {
            continue;
        };
        let status = compute_status(Some(entry), question);
        earned += status.earned_points;
        possible += status.total_points;

        body.push_str(&format!(
            "{rule}\nQuestion {}  ({}/{} points)\n{rule}\n",
            question.qtag(),
            status.earned_points,
            status.total_points
        ));
        body.push_str("Student solution:\n");
        body.push_str(&entry.student_solution);
        body.push('\n');
        render_parts(&mut body, entry);
        body.push('\n');
    }

    let mut out = format!(
        "Submission for unit {}\nGenerated: {}\nPoints: {earned}/{possible}\n\n",
        unit.id(),
        clock.stamp()
    );
    out.push_str(&body);
    out
}

fn render_parts(out: &mut String, entry: &SessionEntry) {
    for (label, result) in &entry.parts {
        out.push_str(&format!(
            "\nPart ({label}): {}\n",
            result.grade_status.human_label()
        ));
        push_wrapped(out, "Feedback", &result.feedback);
        push_wrapped(out, "Explanation", &result.explanation);
    }
}

fn push_wrapped(out: &mut String, heading: &str, text: &str) {
    if text.trim().is_empty() {
        return;
    }
    out.push_str(heading);
    out.push_str(":\n");
    for line in wrap_text(text, WRAP_WIDTH) {
        out.push_str(&line);
        out.push('\n');
    }
}

/// Serialize a unit's entries verbatim as pretty JSON.
///
/// # Errors
///
/// Returns `ExportError::Serialize` if encoding fails.
pub fn render_results(sessions: &UnitSessions) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(sessions)?)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::imports::parse_results;
    use grader_core::model::{
        EntryPatch, GradeStatus, Part, PartLabel, PartPatch, Qtag, Question,
    };
    use grader_core::time::fixed_clock;

    fn unit() -> Unit {
        Unit::new(
            UnitId::new("unit1"),
            vec![
                Question::new("q1", true, vec![Part::new("a", 5), Part::new("b", 5)]).unwrap(),
                Question::new("q2", false, vec![Part::new("a", 4)]).unwrap(),
                Question::new("q3", true, Vec::new()).unwrap().with_points(2),
            ],
        )
        .unwrap()
    }

    fn entry(solution: &str, parts: &[(&str, GradeStatus, &str)]) -> SessionEntry {
        let mut entry = SessionEntry {
            student_solution: solution.into(),
            ..SessionEntry::default()
        };
        for (label, status, feedback) in parts {
            entry.apply(EntryPatch::Part {
                label: PartLabel::new(*label),
                patch: PartPatch::verdict(status.clone(), *feedback, "explained"),
            });
        }
        entry
    }

    fn sessions() -> UnitSessions {
        let mut sessions = UnitSessions::new();
        sessions.insert(
            Qtag::new("q1"),
            entry("V = 20 V", &[("a", GradeStatus::Pass, "Good."), ("b", GradeStatus::Fail, "Check units.")]),
        );
        sessions.insert(
            Qtag::new("q2"),
            entry("done", &[("all", GradeStatus::Pass, "Perfect.")]),
        );
        sessions
    }

    #[test]
    fn optional_questions_are_excluded() {
        let submission = build_submission(&unit(), Some(&sessions()), &fixed_clock()).unwrap();
        let kept: Vec<_> = submission.record().keys().cloned().collect();
        assert_eq!(kept, [Qtag::new("q1")]);
        assert!(!submission.transcript().contains("Question q2"));
    }

    #[test]
    fn nothing_to_submit_is_rejected() {
        let mut only_optional = UnitSessions::new();
        only_optional.insert(Qtag::new("q2"), entry("x", &[]));
        let err = build_submission(&unit(), Some(&only_optional), &fixed_clock()).unwrap_err();
        assert!(matches!(err, ExportError::EmptySubmission));
        assert!(matches!(
            build_submission(&unit(), None, &fixed_clock()),
            Err(ExportError::EmptySubmission)
        ));
    }

    #[test]
    fn transcript_lists_points_and_part_labels() {
        let submission = build_submission(&unit(), Some(&sessions()), &fixed_clock()).unwrap();
        let text = submission.transcript();
        assert!(text.starts_with("Submission for unit unit1\nGenerated: 2023-11-14T22:13:20Z\n"));
        assert!(text.contains("Points: 5/10"));
        assert!(text.contains("Question q1  (5/10 points)"));
        assert!(text.contains("V = 20 V"));
        assert!(text.contains("Part (a): correct"));
        assert!(text.contains("Part (b): incorrect"));
        assert!(text.contains("Feedback:\nCheck units."));
    }

    #[test]
    fn long_feedback_is_wrapped() {
        let long = "word ".repeat(40);
        let mut sessions = UnitSessions::new();
        sessions.insert(Qtag::new("q3"), entry("", &[("all", GradeStatus::Fail, &long)]));
        let submission = build_submission(&unit(), Some(&sessions), &fixed_clock()).unwrap();
        assert!(submission.transcript().lines().all(|line| line.len() <= WRAP_WIDTH));
    }

    #[test]
    fn record_reimports_with_identical_parts() {
        let submission = build_submission(&unit(), Some(&sessions()), &fixed_clock()).unwrap();
        let reimported = parse_results(submission.record_json().unwrap().as_bytes()).unwrap();
        assert_eq!(&reimported, submission.record());

        let results = render_results(&sessions()).unwrap();
        assert_eq!(parse_results(results.as_bytes()).unwrap(), sessions());
    }

    #[test]
    fn archive_contains_record_and_transcript() {
        let submission = build_submission(&unit(), Some(&sessions()), &fixed_clock()).unwrap();
        assert_eq!(submission.archive_name(), "submission_unit1.zip");

        let bytes = submission.to_archive().unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut json = String::new();
        archive
            .by_name("submission_unit1.json")
            .unwrap()
            .read_to_string(&mut json)
            .unwrap();
        assert_eq!(parse_results(json.as_bytes()).unwrap(), *submission.record());

        let mut text = String::new();
        archive
            .by_name("submission_unit1.txt")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, submission.transcript());
    }
}
