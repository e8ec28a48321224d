//! Parsers for files a student uploads: a pre-filled solutions file and a
//! previously exported results file.

use std::collections::BTreeMap;

use grader_core::model::{Qtag, UnitSessions};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ImportError;

#[derive(Debug, Deserialize)]
struct StudentAnswer {
    #[serde(default)]
    solution: String,
}

/// Parse a student file of the form `{ "<qtag>": { "solution": "<text>" } }`.
///
/// # Errors
///
/// Returns `ImportError` if the bytes are not JSON, the top level is not an
/// object, or any value lacks the `{ "solution": ... }` shape.
pub fn parse_student_file(bytes: &[u8]) -> Result<BTreeMap<Qtag, String>, ImportError> {
    let root: Value =
        serde_json::from_slice(bytes).map_err(|err| ImportError(err.to_string()))?;
    let Value::Object(map) = root else {
        return Err(ImportError("expected a JSON object keyed by qtag".into()));
    };

    map.into_iter()
        .map(|(key, value)| {
            let qtag: Qtag = key
                .parse()
                .map_err(|err| ImportError(format!("{err}")))?;
            let answer: StudentAnswer = serde_json::from_value(value)
                .map_err(|err| ImportError(format!("{qtag}: {err}")))?;
            Ok((qtag, answer.solution))
        })
        .collect()
}

/// Parse a results file previously produced by [`crate::export::render_results`]
/// or a submission record.
///
/// # Errors
///
/// Returns `ImportError` if the bytes do not decode as `{ qtag: SessionEntry }`.
/// Unknown fields are rejected so an unrelated JSON file is not mistaken for
/// results.
pub fn parse_results(bytes: &[u8]) -> Result<UnitSessions, ImportError> {
    let root: Value =
        serde_json::from_slice(bytes).map_err(|err| ImportError(err.to_string()))?;
    if !root.is_object() {
        return Err(ImportError("expected a JSON object keyed by qtag".into()));
    }
    serde_json::from_value(root).map_err(|err| ImportError(err.to_string()))
}
