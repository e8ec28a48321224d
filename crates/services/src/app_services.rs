use std::path::PathBuf;
use std::sync::Arc;

use storage::file::FileBlobStore;
use storage::repository::{GradeLogRepository, Storage};
use storage::session_store::SessionStore;

use crate::Clock;
use crate::controller::GradingController;
use crate::error::AppServicesError;
use crate::grading::{GradingService, OpenAiGrader, OpenAiGraderConfig};
use crate::units::{DirUnitProvider, UnitProvider};

/// Assembles the storage, unit source, and grader behind a controller.
#[derive(Clone)]
pub struct AppServices {
    clock: Clock,
    storage: Storage,
    units: Arc<dyn UnitProvider>,
    grader: Arc<dyn GradingService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage and a units directory.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails or the
    /// units directory cannot be listed.
    pub async fn new_sqlite(
        db_url: &str,
        units_root: impl Into<PathBuf>,
        grader: OpenAiGraderConfig,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let units: Arc<dyn UnitProvider> = Arc::new(DirUnitProvider::open(units_root).await?);
        let grader: Arc<dyn GradingService> =
            Arc::new(OpenAiGrader::new(grader, Arc::clone(&units)));

        Ok(Self::from_parts(clock, storage, units, grader))
    }

    /// Assemble services from already-built parts, e.g. in-memory fakes.
    #[must_use]
    pub fn from_parts(
        clock: Clock,
        storage: Storage,
        units: Arc<dyn UnitProvider>,
        grader: Arc<dyn GradingService>,
    ) -> Self {
        Self {
            clock,
            storage,
            units,
            grader,
        }
    }

    /// Keep session blobs as JSON files under `dir`; the grade log stays
    /// where it was.
    #[must_use]
    pub fn with_session_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage.session_blobs = Arc::new(FileBlobStore::new(dir));
        self
    }

    /// Open the persisted session and wire a fresh controller around it.
    pub async fn controller(&self) -> GradingController {
        let store = SessionStore::open(Arc::clone(&self.storage.session_blobs)).await;
        GradingController::new(store, Arc::clone(&self.units), Arc::clone(&self.grader))
            .with_grade_log(Arc::clone(&self.storage.grade_log))
            .with_clock(self.clock)
    }

    #[must_use]
    pub fn units(&self) -> Arc<dyn UnitProvider> {
        Arc::clone(&self.units)
    }

    #[must_use]
    pub fn grade_log(&self) -> Arc<dyn GradeLogRepository> {
        Arc::clone(&self.storage.grade_log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::InMemoryUnitProvider;
    use crate::grading::{GradeRequest, GradeVerdict};
    use crate::error::GradingError;
    use async_trait::async_trait;
    use grader_core::model::{GradeStatus, Part, Question, Unit, UnitId};
    use grader_core::time::fixed_clock;

    struct AlwaysPass;

    #[async_trait]
    impl GradingService for AlwaysPass {
        async fn grade(&self, _request: &GradeRequest) -> Result<GradeVerdict, GradingError> {
            Ok(GradeVerdict {
                result: GradeStatus::Pass,
                feedback: "ok".into(),
                full_explanation: "ok".into(),
            })
        }
    }

    #[tokio::test]
    async fn controllers_share_persisted_session_and_log() {
        let unit = Unit::new(
            UnitId::new("unit1"),
            vec![Question::new("q1", true, vec![Part::new("a", 5)]).unwrap()],
        )
        .unwrap();
        let services = AppServices::from_parts(
            fixed_clock(),
            Storage::in_memory(),
            Arc::new(InMemoryUnitProvider::new([unit])),
            Arc::new(AlwaysPass),
        );

        let mut first = services.controller().await;
        first.select_unit(&UnitId::new("unit1")).await.unwrap();
        first.edit_solution("I = 2 A").await.unwrap();
        first.submit_grade(Default::default()).await.unwrap();

        let mut second = services.controller().await;
        let view = second.select_unit(&UnitId::new("unit1")).await.unwrap().unwrap();
        assert_eq!(view.student_solution, "I = 2 A");
        assert_eq!(view.part.status_label, "correct");

        let events = services.grade_log().recent(10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.result, GradeStatus::Pass);
    }

    #[tokio::test]
    async fn session_dir_keeps_blobs_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let unit = Unit::new(
            UnitId::new("unit1"),
            vec![Question::new("q1", true, vec![Part::new("a", 5)]).unwrap()],
        )
        .unwrap();
        let units: Arc<dyn UnitProvider> = Arc::new(InMemoryUnitProvider::new([unit]));
        let build = || {
            AppServices::from_parts(
                fixed_clock(),
                Storage::in_memory(),
                Arc::clone(&units),
                Arc::new(AlwaysPass),
            )
            .with_session_dir(dir.path())
        };

        let mut first = build().controller().await;
        first.select_unit(&UnitId::new("unit1")).await.unwrap();
        first.edit_solution("P = VI").await.unwrap();

        let blobs: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(blobs.len(), 1);

        let mut second = build().controller().await;
        let view = second.select_unit(&UnitId::new("unit1")).await.unwrap().unwrap();
        assert_eq!(view.student_solution, "P = VI");
    }
}
