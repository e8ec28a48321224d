//! Session-scoped controller behind the grading UI and CLI.
//!
//! A `GradingController` owns the session store and the current selection.
//! Every action returns a `Result`, but none leaves the controller unusable:
//! failures are also kept as the inline error of the next `QuestionView`.

mod context;
mod view;

use std::sync::Arc;

use grader_core::model::{
    EntryPatch, PartLabel, PartPatch, Qtag, Unit, UnitId, UnitSessions,
};
use grader_core::{Clock, QuestionStatus, UnitStatus, compute_status};
use storage::repository::{GradeLogRepository, NewGradeEvent, StorageError};
use storage::session_store::SessionStore;
use tracing::{debug, info, warn};

use crate::error::{ControllerError, GradingError};
use crate::export::{Submission, build_submission, render_results};
use crate::grading::{DEFAULT_MODEL, DEFAULT_TIMEOUT, GradeRequest, GradeVerdict, GradingService};
use crate::imports::{parse_results, parse_student_file};
use crate::units::UnitProvider;

pub use context::{GradeKey, GradeOptions, PendingGrade, SessionContext};
pub use view::{GRADE_LABEL, GRADING_LABEL, GradeButton, NOT_GRADED, PartView, QuestionView};

pub struct GradingController {
    store: SessionStore,
    units: Arc<dyn UnitProvider>,
    grader: Arc<dyn GradingService>,
    grade_log: Option<Arc<dyn GradeLogRepository>>,
    clock: Clock,
    ctx: SessionContext,
}

impl GradingController {
    #[must_use]
    pub fn new(
        store: SessionStore,
        units: Arc<dyn UnitProvider>,
        grader: Arc<dyn GradingService>,
    ) -> Self {
        Self {
            store,
            units,
            grader,
            grade_log: None,
            clock: Clock::default(),
            ctx: SessionContext::default(),
        }
    }

    #[must_use]
    pub fn with_grade_log(mut self, grade_log: Arc<dyn GradeLogRepository>) -> Self {
        self.grade_log = Some(grade_log);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    #[must_use]
    pub fn grading_service(&self) -> Arc<dyn GradingService> {
        Arc::clone(&self.grader)
    }

    //
    // ─── NAVIGATION ───────────────────────────────────────────────────────────
    //

    /// Refresh the list of available units.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::FetchFailure` if the provider cannot list units.
    pub async fn load_units(&mut self) -> Result<&[UnitId], ControllerError> {
        let listed = self.units.list_units().await;
        match listed {
            Ok(ids) => {
                debug!(units = ids.len(), "listed units");
                self.ctx.unit_ids = ids;
                Ok(&self.ctx.unit_ids)
            }
            Err(err) => Err(self.fail(ControllerError::FetchFailure(err.to_string()))),
        }
    }

    /// Load a unit, drop stored entries for questions it no longer has, and
    /// select the question last shown for it (or its first question).
    ///
    /// Returns `None` for a unit without questions.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::FetchFailure` if the unit cannot be fetched.
    pub async fn select_unit(
        &mut self,
        unit_id: &UnitId,
    ) -> Result<Option<QuestionView>, ControllerError> {
        let fetched = self.units.get_unit(unit_id).await;
        let unit = match fetched {
            Ok(unit) => unit,
            Err(err) => return Err(self.fail(ControllerError::FetchFailure(err.to_string()))),
        };
        self.remember_selection();
        self.ctx.last_error = None;

        let qtags = unit.qtags();
        let pruned = self.store.prune(unit.id(), &qtags).await;
        self.note_storage(pruned.map(|_| ()));

        let target = self
            .ctx
            .remembered
            .get(unit.id())
            .filter(|qtag| unit.question(qtag).is_some())
            .or_else(|| unit.first_qtag())
            .cloned();

        info!(unit = %unit.id(), questions = qtags.len(), "loaded unit");
        self.ctx.unit = Some(unit);
        self.ctx.clear_selection();

        match target {
            Some(qtag) => self.select_question(&qtag).map(Some),
            None => Ok(None),
        }
    }

    /// Select a question of the current unit; the part resets to `all`.
    ///
    /// # Errors
    ///
    /// Returns `NoUnitSelected` or `UnknownQuestion`.
    pub fn select_question(&mut self, qtag: &Qtag) -> Result<QuestionView, ControllerError> {
        let unit = self.current_unit()?;
        if unit.question(qtag).is_none() {
            return Err(self.fail(ControllerError::UnknownQuestion(qtag.clone())));
        }
        let unit_id = unit.id().clone();

        self.store.get(&unit_id, qtag);
        self.ctx.selected_qtag = Some(qtag.clone());
        self.ctx.selected_part = PartLabel::all();
        self.ctx.remembered.insert(unit_id, qtag.clone());
        self.require_view()
    }

    /// # Errors
    ///
    /// Returns `NoQuestionSelected` or `UnknownPart` if `label` is not one of
    /// the question's part options.
    pub fn select_part(&mut self, label: &PartLabel) -> Result<QuestionView, ControllerError> {
        let (unit, qtag) = self.current_selection()?;
        let known = unit
            .question(&qtag)
            .is_some_and(|question| question.has_part_option(label));
        if !known {
            return Err(self.fail(ControllerError::UnknownPart(label.clone())));
        }
        self.ctx.selected_part = label.clone();
        self.require_view()
    }

    /// Reload units from the provider and re-run the load for the current
    /// unit, or the first unit if the current one disappeared.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::FetchFailure` if the provider fails.
    pub async fn reload(&mut self) -> Result<Option<QuestionView>, ControllerError> {
        let reloaded = self.units.reload().await;
        if let Err(err) = reloaded {
            return Err(self.fail(ControllerError::FetchFailure(err.to_string())));
        }
        self.load_units().await?;

        let current = self.ctx.unit.as_ref().map(|unit| unit.id().clone());
        let target = current
            .filter(|id| self.ctx.unit_ids.contains(id))
            .or_else(|| self.ctx.unit_ids.first().cloned());

        match target {
            Some(id) => self.select_unit(&id).await,
            None => {
                warn!("reload found no units");
                self.ctx.unit = None;
                self.ctx.clear_selection();
                Ok(None)
            }
        }
    }

    //
    // ─── EDITING & GRADING ────────────────────────────────────────────────────
    //

    /// Write-through edit of the selected question's solution text.
    ///
    /// A failed save is reported through the view's inline error; the edit
    /// stays applied in memory.
    ///
    /// # Errors
    ///
    /// Returns `NoQuestionSelected` when nothing is selected.
    pub async fn edit_solution(&mut self, text: impl Into<String>) -> Result<(), ControllerError> {
        let (unit, qtag) = self.current_selection()?;
        let saved = self
            .store
            .update(unit.id(), &qtag, EntryPatch::Solution(text.into()))
            .await;
        self.note_storage(saved);
        Ok(())
    }

    /// Snapshot the current selection into a grading request and mark it in
    /// flight.
    ///
    /// # Errors
    ///
    /// Returns `GradeInFlight` if the same unit, question, and part is still
    /// being graded, or `NoQuestionSelected` when nothing is selected.
    pub fn begin_grade(&mut self, options: GradeOptions) -> Result<PendingGrade, ControllerError> {
        let (unit, qtag) = self.current_selection()?;
        let key = GradeKey {
            unit: unit.id().clone(),
            qtag: qtag.clone(),
            part: self.ctx.selected_part.clone(),
        };
        if self.ctx.in_flight.contains(&key) {
            return Err(self.fail(ControllerError::GradeInFlight {
                qtag: key.qtag,
                part: key.part,
            }));
        }

        let model = options
            .model
            .or_else(|| {
                unit.question(&qtag)
                    .and_then(|question| question.preferred_model())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let request = GradeRequest {
            unit: key.unit.clone(),
            qtag: key.qtag.clone(),
            student_solution: self.current_solution(&key.unit, &key.qtag),
            part: key.part.clone(),
            model,
            api_key: options.api_key,
            timeout: options.timeout.unwrap_or(DEFAULT_TIMEOUT),
        };

        self.ctx.in_flight.insert(key.clone());
        debug!(unit = %key.unit, qtag = %key.qtag, part = %key.part, "grade started");
        Ok(PendingGrade {
            key,
            request,
            started: std::time::Instant::now(),
        })
    }

    /// Apply the grading service's answer to a pending request.
    ///
    /// On success the verdict is written to the part and the question's
    /// current solution (or its student-file fallback) is persisted; edits
    /// made while grading was in flight are kept. The write is skipped if a
    /// reload removed the question in the meantime.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::FetchFailure` when grading failed; nothing
    /// is written in that case.
    pub async fn complete_grade(
        &mut self,
        pending: PendingGrade,
        outcome: Result<GradeVerdict, GradingError>,
    ) -> Result<GradeVerdict, ControllerError> {
        let PendingGrade {
            key,
            request,
            started,
        } = pending;
        self.ctx.in_flight.remove(&key);

        let verdict = match outcome {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!(unit = %key.unit, qtag = %key.qtag, part = %key.part, error = %err, "grading failed");
                return Err(self.fail(ControllerError::FetchFailure(err.to_string())));
            }
        };
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let pruned = self
            .ctx
            .unit
            .as_ref()
            .is_some_and(|unit| unit.id() == &key.unit && unit.question(&key.qtag).is_none());
        if pruned {
            warn!(unit = %key.unit, qtag = %key.qtag, "question removed while grading; verdict dropped");
        } else {
            let current = self.current_solution(&key.unit, &key.qtag);
            let solution = self
                .store
                .update(&key.unit, &key.qtag, EntryPatch::Solution(current))
                .await;
            self.note_storage(solution);

            let part = self
                .store
                .update(
                    &key.unit,
                    &key.qtag,
                    EntryPatch::Part {
                        label: key.part.clone(),
                        patch: PartPatch::verdict(
                            verdict.result.clone(),
                            verdict.feedback.clone(),
                            verdict.full_explanation.clone(),
                        ),
                    },
                )
                .await;
            if part.is_ok() && self.ctx.selected_key().as_ref() == Some(&key) {
                self.ctx.last_error = None;
            }
            self.note_storage(part);
        }

        info!(
            unit = %key.unit,
            qtag = %key.qtag,
            part = %key.part,
            model = %request.model,
            result = %verdict.result,
            latency_ms,
            "grade completed"
        );
        self.record_event(&key, &request.model, &verdict, latency_ms).await;
        Ok(verdict)
    }

    /// Grade the current selection end to end.
    ///
    /// # Errors
    ///
    /// See [`Self::begin_grade`] and [`Self::complete_grade`].
    pub async fn submit_grade(
        &mut self,
        options: GradeOptions,
    ) -> Result<GradeVerdict, ControllerError> {
        let pending = self.begin_grade(options)?;
        let grader = Arc::clone(&self.grader);
        let outcome = grader.grade(pending.request()).await;
        self.complete_grade(pending, outcome).await
    }

    //
    // ─── IMPORT / EXPORT ──────────────────────────────────────────────────────
    //

    /// Keep a student file's solutions as fallbacks for blank entries.
    ///
    /// # Errors
    ///
    /// Returns `MalformedImport`; previous fallbacks are kept.
    pub fn import_student_file(&mut self, bytes: &[u8]) -> Result<usize, ControllerError> {
        let solutions = match parse_student_file(bytes) {
            Ok(solutions) => solutions,
            Err(err) => return Err(self.fail(err.into())),
        };
        info!(questions = solutions.len(), "imported student file");
        let count = solutions.len();
        self.ctx.student_file = solutions;
        Ok(count)
    }

    /// Replace the current unit's entries with an exported results file.
    ///
    /// # Errors
    ///
    /// Returns `MalformedImport` with the stored entries untouched, or
    /// `NoUnitSelected`.
    pub async fn import_results(&mut self, bytes: &[u8]) -> Result<usize, ControllerError> {
        let unit_id = self.current_unit()?.id().clone();
        let entries = match parse_results(bytes) {
            Ok(entries) => entries,
            Err(err) => return Err(self.fail(err.into())),
        };
        let count = entries.len();
        let saved = self.store.replace_unit(&unit_id, entries).await;
        self.note_storage(saved);
        info!(unit = %unit_id, questions = count, "imported results");
        Ok(count)
    }

    /// Serialize the current unit's entries verbatim.
    ///
    /// # Errors
    ///
    /// Returns `NoUnitSelected`, or `Export` if encoding fails.
    pub fn export_results(&self) -> Result<String, ControllerError> {
        let unit = self.current_unit()?;
        let empty = UnitSessions::new();
        let entries = self.store.unit_entries(unit.id()).unwrap_or(&empty);
        Ok(render_results(entries)?)
    }

    /// Build the submission for the current unit.
    ///
    /// # Errors
    ///
    /// Returns `EmptySubmission` when no required question has been
    /// attempted.
    pub fn export_submission(&mut self) -> Result<Submission, ControllerError> {
        let unit = self.current_unit()?;
        let built = build_submission(unit, self.store.unit_entries(unit.id()), &self.clock);
        match built {
            Ok(submission) => Ok(submission),
            Err(err) => Err(self.fail(err.into())),
        }
    }

    //
    // ─── VIEWS ────────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn question_view(&self) -> Option<QuestionView> {
        let unit = self.ctx.unit.as_ref()?;
        let qtag = self.ctx.selected_qtag.as_ref()?;
        let question = unit.question(qtag)?;
        let part = &self.ctx.selected_part;
        let in_flight = self.ctx.selected_key().is_some_and(|key| self.ctx.is_in_flight(&key));

        let result = self
            .store
            .entry(unit.id(), qtag)
            .and_then(|entry| entry.part(part));

        Some(QuestionView {
            unit: unit.id().clone(),
            qtag: qtag.clone(),
            text: question.text().to_string(),
            student_solution: self.current_solution(unit.id(), qtag),
            part_options: question.part_options(),
            selected_part: part.clone(),
            part: PartView::from_result(result),
            grade_button: GradeButton::new(in_flight),
            error: self.ctx.last_error.clone(),
        })
    }

    /// Rows and totals for the current unit.
    #[must_use]
    pub fn unit_table(&self) -> Option<UnitStatus> {
        let unit = self.ctx.unit.as_ref()?;
        Some(UnitStatus::compute(unit, self.store.unit_entries(unit.id())))
    }

    #[must_use]
    pub fn status(&self, qtag: &Qtag) -> Option<QuestionStatus> {
        let unit = self.ctx.unit.as_ref()?;
        let question = unit.question(qtag)?;
        Some(compute_status(self.store.entry(unit.id(), qtag), question))
    }

    //
    // ─── HELPERS ──────────────────────────────────────────────────────────────
    //

    fn current_unit(&self) -> Result<&Unit, ControllerError> {
        self.ctx.unit.as_ref().ok_or(ControllerError::NoUnitSelected)
    }

    fn current_selection(&self) -> Result<(Unit, Qtag), ControllerError> {
        let unit = self.current_unit()?;
        let qtag = self
            .ctx
            .selected_qtag
            .clone()
            .ok_or(ControllerError::NoQuestionSelected)?;
        Ok((unit.clone(), qtag))
    }

    fn current_solution(&self, unit: &UnitId, qtag: &Qtag) -> String {
        self.store
            .entry(unit, qtag)
            .map(|entry| entry.student_solution.as_str())
            .filter(|text| !text.is_empty())
            .or_else(|| self.ctx.student_file.get(qtag).map(String::as_str))
            .unwrap_or_default()
            .to_string()
    }

    fn require_view(&self) -> Result<QuestionView, ControllerError> {
        self.question_view().ok_or(ControllerError::NoQuestionSelected)
    }

    fn remember_selection(&mut self) {
        if let (Some(unit), Some(qtag)) = (&self.ctx.unit, &self.ctx.selected_qtag) {
            self.ctx.remembered.insert(unit.id().clone(), qtag.clone());
        }
    }

    fn fail(&mut self, err: ControllerError) -> ControllerError {
        self.ctx.last_error = Some(err.to_string());
        err
    }

    fn note_storage(&mut self, result: Result<(), StorageError>) {
        if let Err(err) = result {
            self.ctx.last_error = Some(format!("failed to save session: {err}"));
        }
    }

    async fn record_event(
        &self,
        key: &GradeKey,
        model: &str,
        verdict: &GradeVerdict,
        latency_ms: u64,
    ) {
        let Some(log) = &self.grade_log else {
            return;
        };
        let event = NewGradeEvent {
            unit_id: key.unit.clone(),
            qtag: key.qtag.clone(),
            part_label: key.part.clone(),
            model: model.to_string(),
            result: verdict.result.clone(),
            latency_ms,
            created_at: self.clock.now(),
        };
        if let Err(err) = log.record(event).await {
            warn!(error = %err, "failed to record grade event");
        }
    }
}
