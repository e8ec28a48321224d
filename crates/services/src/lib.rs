#![forbid(unsafe_code)]

pub mod app_services;
pub mod autograde;
pub mod controller;
pub mod error;
pub mod export;
pub mod grading;
pub mod imports;
pub mod units;

pub use grader_core::Clock;

pub use app_services::AppServices;
pub use autograde::{GradescopeResults, GradescopeTest, compute_scores, read_submission};
pub use controller::{
    GradeButton, GradeKey, GradeOptions, GradingController, PartView, PendingGrade,
    QuestionView, SessionContext,
};
pub use error::{
    AppServicesError, AutogradeError, ControllerError, ExportError, GradingError, ImportError,
    UnitProviderError,
};
pub use export::{Submission, build_submission, render_results};
pub use grading::{
    DEFAULT_MODEL, DEFAULT_TIMEOUT, GradeRequest, GradeVerdict, GradingService, OpenAiGrader,
    OpenAiGraderConfig,
};
pub use imports::{parse_results, parse_student_file};
pub use units::{DirUnitProvider, InMemoryUnitProvider, UnitProvider};
