mod openai;
mod prompt;

use std::time::Duration;

use async_trait::async_trait;
use grader_core::model::{GradeStatus, PartLabel, Qtag, UnitId};

use crate::error::GradingError;

pub use openai::{OpenAiGrader, OpenAiGraderConfig, parse_verdict};
pub use prompt::build_task_prompt;

/// Default model when neither the caller nor the question names one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Everything needed to grade one part of one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeRequest {
    pub unit: UnitId,
    pub qtag: Qtag,
    pub student_solution: String,
    pub part: PartLabel,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

/// Verdict returned by a grading service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeVerdict {
    pub result: GradeStatus,
    pub feedback: String,
    pub full_explanation: String,
}

/// Opaque grading backend.
#[async_trait]
pub trait GradingService: Send + Sync {
    /// Grade the request.
    ///
    /// # Errors
    ///
    /// Returns `GradingError` when the service is unreachable, times out, or
    /// answers with something that is not a verdict.
    async fn grade(&self, request: &GradeRequest) -> Result<GradeVerdict, GradingError>;
}
