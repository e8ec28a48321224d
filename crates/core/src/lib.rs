#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod status;
pub mod time;
pub mod wrap;

pub use error::Error;
pub use status::{Classification, QuestionRow, QuestionStatus, UnitStatus, compute_status};
pub use time::Clock;
