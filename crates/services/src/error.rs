//! Shared error types for the services crate.

use std::time::Duration;

use thiserror::Error;

use grader_core::model::{PartLabel, Qtag, UnitError, UnitId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by a `UnitProvider`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UnitProviderError {
    #[error("unknown unit: {0}")]
    UnknownUnit(UnitId),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error(transparent)]
    Invalid(#[from] UnitError),
}

/// Errors emitted by a `GradingService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GradingError {
    #[error("cannot grade without an API key")]
    MissingApiKey,
    #[error("grading request timed out after {0:?}")]
    Timeout(Duration),
    #[error("grading request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("grading service returned an empty response")]
    EmptyResponse,
    #[error("grading service returned a malformed verdict: {0}")]
    MalformedResponse(String),
    #[error(transparent)]
    Units(#[from] UnitProviderError),
    #[error("unknown question {qtag} in unit {unit}")]
    UnknownQuestion { unit: UnitId, qtag: Qtag },
}

/// A student or results file did not have the expected structure.
#[derive(Debug, Error)]
#[error("malformed import: {0}")]
pub struct ImportError(pub String);

/// Errors emitted while building a submission.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExportError {
    #[error("no graded required questions to submit")]
    EmptySubmission,
    #[error("failed to serialize submission: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to build archive: {0}")]
    Archive(String),
}

impl From<zip::result::ZipError> for ExportError {
    fn from(err: zip::result::ZipError) -> Self {
        ExportError::Archive(err.to_string())
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::Archive(err.to_string())
    }
}

/// Errors emitted while scoring a submission for Gradescope.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AutogradeError {
    #[error("no submission_*.json found inside zip")]
    MissingRecord,
    #[error("submission JSON is empty or malformed: {0}")]
    Malformed(String),
    #[error("failed to read submission archive: {0}")]
    Archive(String),
    #[error("failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<zip::result::ZipError> for AutogradeError {
    fn from(err: zip::result::ZipError) -> Self {
        AutogradeError::Archive(err.to_string())
    }
}

impl From<std::io::Error> for AutogradeError {
    fn from(err: std::io::Error) -> Self {
        AutogradeError::Archive(err.to_string())
    }
}

/// Errors surfaced by the grading controller. None of these are fatal; the
/// message is also kept as the view's inline error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ControllerError {
    #[error("fetch failed: {0}")]
    FetchFailure(String),
    #[error("no graded required questions to submit")]
    EmptySubmission,
    #[error(transparent)]
    MalformedImport(#[from] ImportError),
    #[error("question {qtag} part {part} is already being graded")]
    GradeInFlight { qtag: Qtag, part: PartLabel },
    #[error("no unit selected")]
    NoUnitSelected,
    #[error("no question selected")]
    NoQuestionSelected,
    #[error("unknown question: {0}")]
    UnknownQuestion(Qtag),
    #[error("unknown part: {0}")]
    UnknownPart(PartLabel),
    #[error(transparent)]
    Export(ExportError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<ExportError> for ControllerError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::EmptySubmission => ControllerError::EmptySubmission,
            other => ControllerError::Export(other),
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Units(#[from] UnitProviderError),
}
