//! Gradescope scoring of a submitted record.
//!
//! Reads the `submission_<unit>.json` record (bare or inside the submission
//! zip), scores it against the unit, and produces the `results.json` payload
//! Gradescope expects.

use std::fmt;
use std::io::{Cursor, Read as _};

use grader_core::compute_status;
use grader_core::model::{PartLabel, Question, SessionEntry, Unit, UnitSessions};
use serde::Serialize;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::error::AutogradeError;
use crate::imports::parse_results;

pub const NO_SUBMISSION: &str = "No submission for this question.";

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Score of one graded question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GradescopeTest {
    pub name: String,
    pub score: u32,
    pub max_score: u32,
    pub output: String,
}

/// Contents of Gradescope's `results.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GradescopeResults {
    pub score: u32,
    #[serde(skip_serializing)]
    pub max_score: u32,
    pub output: String,
    pub tests: Vec<GradescopeTest>,
}

impl GradescopeResults {
    /// Zero-score payload reporting why scoring failed.
    #[must_use]
    pub fn error(err: impl fmt::Display) -> Self {
        Self {
            score: 0,
            max_score: 0,
            output: format!("Autograder error: {err}"),
            tests: Vec::new(),
        }
    }

    /// # Errors
    ///
    /// Returns `AutogradeError::Serialize` if encoding fails.
    pub fn to_json(&self) -> Result<String, AutogradeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Extract the submission record from a zip archive or a bare JSON file.
///
/// # Errors
///
/// Returns `MissingRecord` when an archive holds no `submission_*.json`,
/// `Archive` when the zip cannot be read, and `Malformed` when the record
/// is not an object of session entries.
pub fn read_submission(bytes: &[u8]) -> Result<UnitSessions, AutogradeError> {
    if bytes.starts_with(ZIP_MAGIC) {
        let record = record_from_archive(bytes)?;
        return parse_record(&record);
    }
    parse_record(bytes)
}

fn record_from_archive(bytes: &[u8]) -> Result<Vec<u8>, AutogradeError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let name = archive
        .file_names()
        .find(|name| is_record_name(name))
        .map(str::to_string)
        .ok_or(AutogradeError::MissingRecord)?;
    debug!(entry = %name, "reading submission record from archive");

    let mut file = archive.by_name(&name)?;
    let mut record = Vec::new();
    file.read_to_end(&mut record)?;
    Ok(record)
}

fn is_record_name(path: &str) -> bool {
    let base = path.rsplit('/').next().unwrap_or(path);
    base.starts_with("submission_") && base.ends_with(".json")
}

fn parse_record(bytes: &[u8]) -> Result<UnitSessions, AutogradeError> {
    let record = parse_results(bytes).map_err(|err| AutogradeError::Malformed(err.0))?;
    if record.is_empty() {
        return Err(AutogradeError::Malformed(
            "submission record is empty".into(),
        ));
    }
    Ok(record)
}

/// Score every required question of `unit` from `record`.
///
/// Optional questions are skipped. A missing question scores zero with
/// [`NO_SUBMISSION`]; points follow the same aggregation as the unit table,
/// so a whole-question pass awards full credit.
#[must_use]
pub fn compute_scores(unit: &Unit, record: &UnitSessions) -> GradescopeResults {
    let mut score = 0_u32;
    let mut max_score = 0_u32;
    let mut tests = Vec::new();
    let mut overall = Vec::new();

    for question in unit.questions().iter().filter(|q| q.required()) {
        let status = compute_status(record.get(question.qtag()), question);
        max_score += status.total_points;

        let Some(entry) = record.get(question.qtag()) else {
            tests.push(GradescopeTest {
                name: question.qtag().to_string(),
                score: 0,
                max_score: status.total_points,
                output: NO_SUBMISSION.to_string(),
            });
            continue;
        };

        score += status.earned_points;
        let (lines, feedback) = question_lines(question, entry);
        if !feedback.is_empty() {
            overall.push(format!("Question: {}\n{}", question.qtag(), feedback.join("\n")));
        }
        tests.push(GradescopeTest {
            name: question.qtag().to_string(),
            score: status.earned_points,
            max_score: status.total_points,
            output: lines.join("\n"),
        });
    }

    info!(unit = %unit.id(), score, max_score, questions = tests.len(), "scored submission");
    GradescopeResults {
        score,
        max_score,
        output: overall.join("\n\n"),
        tests,
    }
}

/// Per-part result lines followed by feedback lines, and the feedback lines
/// alone for the overall output.
fn question_lines(question: &Question, entry: &SessionEntry) -> (Vec<String>, Vec<String>) {
    let mut labels: Vec<PartLabel> = question
        .effective_parts()
        .into_iter()
        .map(|part| part.label)
        .collect();
    let all = PartLabel::all();
    if !labels.contains(&all) && entry.part(&all).is_some() {
        labels.push(all);
    }

    let mut lines = Vec::new();
    let mut feedback = Vec::new();
    for label in &labels {
        let Some(result) = entry.part(label) else {
            lines.push(format!("[{label}] Missing part '{label}'."));
            continue;
        };
        let verdict = if result.grade_status.is_pass() {
            "Pass."
        } else {
            "Fail."
        };
        lines.push(format!("[{label}] {verdict}"));
        if !result.feedback.is_empty() {
            feedback.push(format!("[{label}] Feedback: {}", result.feedback));
        }
        if !result.explanation.is_empty() {
            feedback.push(format!("[{label}] Explanation: {}", result.explanation));
        }
    }
    lines.extend(feedback.iter().cloned());
    (lines, feedback)
}
