use thiserror::Error;

use crate::engine::EngineError;
use crate::model::{CurriculumError, EnrollmentError, LedgerError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Curriculum(#[from] CurriculumError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Enrollment(#[from] EnrollmentError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}
