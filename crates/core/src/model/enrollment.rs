use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{CourseId, LearnerId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EnrollmentError {
    #[error("completed enrollment is missing its completion timestamp")]
    MissingCompletedAt,

    #[error("enrollment with status {status} must not carry a completion timestamp")]
    UnexpectedCompletedAt { status: EnrollmentStatus },
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle status of an enrollment.
///
/// `Active` moves to `Completed` exactly once, driven solely by the
/// ledger's aggregate reaching 100. `Cancelled` is an external,
/// likewise one-way transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Cancelled,
}

impl EnrollmentStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Completed => "completed",
            EnrollmentStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── ENROLLMENT ────────────────────────────────────────────────────────────────
//

/// One learner's membership in one course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    learner_id: LearnerId,
    course_id: CourseId,
    status: EnrollmentStatus,
    enrolled_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    /// A fresh, active enrollment.
    #[must_use]
    pub fn new(learner_id: LearnerId, course_id: CourseId, now: DateTime<Utc>) -> Self {
        Self {
            learner_id,
            course_id,
            status: EnrollmentStatus::Active,
            enrolled_at: now,
            completed_at: None,
        }
    }

    /// Rehydrate an enrollment from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `EnrollmentError` if the status and completion timestamp
    /// disagree: `Completed` requires one, `Active` forbids it.
    pub fn from_persisted(
        learner_id: LearnerId,
        course_id: CourseId,
        status: EnrollmentStatus,
        enrolled_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, EnrollmentError> {
        match (status, completed_at) {
            (EnrollmentStatus::Completed, None) => Err(EnrollmentError::MissingCompletedAt),
            (EnrollmentStatus::Active, Some(_)) => {
                Err(EnrollmentError::UnexpectedCompletedAt { status })
            }
            _ => Ok(Self {
                learner_id,
                course_id,
                status,
                enrolled_at,
                completed_at,
            }),
        }
    }

    #[must_use]
    pub fn learner_id(&self) -> &LearnerId {
        &self.learner_id
    }

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        &self.course_id
    }

    #[must_use]
    pub fn status(&self) -> EnrollmentStatus {
        self.status
    }

    #[must_use]
    pub fn enrolled_at(&self) -> DateTime<Utc> {
        self.enrolled_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == EnrollmentStatus::Active
    }

    /// Transition `Active` to `Completed`, stamping `completed_at` once.
    ///
    /// Returns true only when the transition actually happened; calling
    /// again on a completed (or cancelled) enrollment changes nothing.
    /// This is the sole writer of `completed_at`.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != EnrollmentStatus::Active {
            return false;
        }
        self.status = EnrollmentStatus::Completed;
        self.completed_at = Some(now);
        true
    }

    /// External one-way transition to `Cancelled`. Idempotent.
    ///
    /// A completed enrollment keeps its `completed_at` when cancelled.
    pub fn cancel(&mut self) -> bool {
        if self.status == EnrollmentStatus::Cancelled {
            return false;
        }
        self.status = EnrollmentStatus::Cancelled;
        true
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
