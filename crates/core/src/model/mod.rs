mod ids;
mod session;
mod unit;

pub use ids::{ParseIdError, PartLabel, Qtag, UnitId};
pub use session::{
    EntryPatch, GradeStatus, PartPatch, PartResult, SessionEntry, SessionState, UnitSessions,
};
pub use unit::{Part, Question, QuestionDraft, Unit, UnitError};
