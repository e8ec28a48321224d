use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

use grader_core::model::{PartLabel, Qtag, Unit, UnitId};

use crate::grading::GradeRequest;

/// Identifies one in-flight grading request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GradeKey {
    pub unit: UnitId,
    pub qtag: Qtag,
    pub part: PartLabel,
}

/// Caller-supplied knobs for one grading request. `None` fields fall back to
/// the question's preferred model and the default timeout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradeOptions {
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Option<Duration>,
}

/// A grading request that has been registered as in flight.
///
/// Obtained from `GradingController::begin_grade` and handed back to
/// `complete_grade` once the grading service answers.
#[derive(Debug)]
pub struct PendingGrade {
    pub(crate) key: GradeKey,
    pub(crate) request: GradeRequest,
    pub(crate) started: Instant,
}

impl PendingGrade {
    #[must_use]
    pub fn key(&self) -> &GradeKey {
        &self.key
    }

    #[must_use]
    pub fn request(&self) -> &GradeRequest {
        &self.request
    }
}

/// Mutable selection state owned by one controller.
#[derive(Debug, Default)]
pub struct SessionContext {
    pub(crate) unit_ids: Vec<UnitId>,
    pub(crate) unit: Option<Unit>,
    pub(crate) selected_qtag: Option<Qtag>,
    pub(crate) selected_part: PartLabel,
    /// Last question shown per unit, restored when the unit is loaded again.
    pub(crate) remembered: HashMap<UnitId, Qtag>,
    /// Solutions from an imported student file; shown when an entry is blank.
    pub(crate) student_file: BTreeMap<Qtag, String>,
    pub(crate) in_flight: HashSet<GradeKey>,
    pub(crate) last_error: Option<String>,
}

impl SessionContext {
    #[must_use]
    pub fn unit_ids(&self) -> &[UnitId] {
        &self.unit_ids
    }

    #[must_use]
    pub fn unit(&self) -> Option<&Unit> {
        self.unit.as_ref()
    }

    #[must_use]
    pub fn selected_qtag(&self) -> Option<&Qtag> {
        self.selected_qtag.as_ref()
    }

    #[must_use]
    pub fn selected_part(&self) -> &PartLabel {
        &self.selected_part
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn is_in_flight(&self, key: &GradeKey) -> bool {
        self.in_flight.contains(key)
    }

    /// Key for the current selection, if a question is selected.
    pub(crate) fn selected_key(&self) -> Option<GradeKey> {
        let unit = self.unit.as_ref()?;
        Some(GradeKey {
            unit: unit.id().clone(),
            qtag: self.selected_qtag.clone()?,
            part: self.selected_part.clone(),
        })
    }

    pub(crate) fn clear_selection(&mut self) {
        self.selected_qtag = None;
        self.selected_part = PartLabel::all();
    }
}
