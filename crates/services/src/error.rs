//! Shared error types for the services crate.

use thiserror::Error;

use course_core::engine::EngineError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("learner is not enrolled in this course")]
    NotEnrolled,
    #[error("course not found")]
    CourseNotFound,
    /// The event referenced content missing from the current curriculum.
    /// The ledger is untouched; refetch the curriculum and re-issue.
    #[error(transparent)]
    InvalidReference(#[from] EngineError),
    /// The persist step kept losing the version race. Retry the whole
    /// report with freshly loaded state.
    #[error("progress update conflicted with concurrent updates")]
    ConcurrentModification,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `EnrollmentService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EnrollError {
    #[error("course not found")]
    CourseNotFound,
    #[error("learner is already enrolled in this course")]
    AlreadyEnrolled,
    #[error("learner is not enrolled in this course")]
    NotEnrolled,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `CertificateService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CertificateError {
    /// Always reports the current percentage so the caller can show the
    /// remaining gap.
    #[error("course not >= 100% complete")]
    NotEligible { current_progress: u8 },
    #[error("learner is not enrolled in this course")]
    NotEnrolled,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `RecommendationService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecommendationError {
    #[error("course recommendations are not configured")]
    Disabled,
    #[error("recommendation request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
