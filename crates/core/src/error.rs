use thiserror::Error;

use crate::model::{ParseIdError, UnitError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Unit(#[from] UnitError),
    #[error(transparent)]
    Id(#[from] ParseIdError),
}
