use std::sync::Arc;

use course_core::Clock;
use course_core::model::{CourseId, Enrollment, LearnerId, ProgressLedger};
use storage::repository::{
    CurriculumRepository, EnrollmentRepository, LedgerRepository, StorageError,
};

use crate::error::EnrollError;

/// Orchestrates the enrollment lifecycle and the ledger that goes with it.
#[derive(Clone)]
pub struct EnrollmentService {
    clock: Clock,
    enrollments: Arc<dyn EnrollmentRepository>,
    ledgers: Arc<dyn LedgerRepository>,
    curricula: Arc<dyn CurriculumRepository>,
}

impl EnrollmentService {
    #[must_use]
    pub fn new(
        clock: Clock,
        enrollments: Arc<dyn EnrollmentRepository>,
        ledgers: Arc<dyn LedgerRepository>,
        curricula: Arc<dyn CurriculumRepository>,
    ) -> Self {
        Self {
            clock,
            enrollments,
            ledgers,
            curricula,
        }
    }

    /// Enroll a learner: create the enrollment and its empty ledger.
    ///
    /// The enrollment row is written first and the ledger insert
    /// tolerates an existing row, so a crash between the two writes is
    /// repaired by calling `enroll` again.
    ///
    /// # Errors
    ///
    /// Returns `EnrollError::CourseNotFound` when the course has no
    /// curriculum, `AlreadyEnrolled` when the pair exists (including
    /// cancelled enrollments), and `Storage` for repository failures.
    pub async fn enroll(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<Enrollment, EnrollError> {
        if self.curricula.get_snapshot(course_id).await?.is_none() {
            return Err(EnrollError::CourseNotFound);
        }

        let now = self.clock.now();

        if self
            .enrollments
            .get_enrollment(learner_id, course_id)
            .await?
            .is_some()
        {
            // Heal a missing ledger left by an interrupted earlier enroll.
            if self.ledgers.get_ledger(learner_id, course_id).await?.is_none() {
                let ledger = ProgressLedger::new(learner_id.clone(), course_id.clone(), now);
                match self.ledgers.insert_ledger(&ledger).await {
                    Ok(()) | Err(StorageError::Conflict) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            return Err(EnrollError::AlreadyEnrolled);
        }

        let enrollment = Enrollment::new(learner_id.clone(), course_id.clone(), now);
        match self.enrollments.insert_enrollment(&enrollment).await {
            Ok(()) => {}
            Err(StorageError::Conflict) => return Err(EnrollError::AlreadyEnrolled),
            Err(e) => return Err(e.into()),
        }

        let ledger = ProgressLedger::new(learner_id.clone(), course_id.clone(), now);
        match self.ledgers.insert_ledger(&ledger).await {
            Ok(()) | Err(StorageError::Conflict) => {}
            Err(e) => return Err(e.into()),
        }

        tracing::info!(learner = %learner_id, course = %course_id, "learner enrolled");
        Ok(enrollment)
    }

    /// Cancel an enrollment. Idempotent; the ledger is kept.
    ///
    /// # Errors
    ///
    /// Returns `EnrollError::NotEnrolled` when the pair was never
    /// enrolled, or `Storage` for repository failures.
    pub async fn cancel(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<Enrollment, EnrollError> {
        let mut enrollment = self
            .enrollments
            .get_enrollment(learner_id, course_id)
            .await?
            .ok_or(EnrollError::NotEnrolled)?;

        if enrollment.cancel() {
            self.enrollments.update_enrollment(&enrollment).await?;
            tracing::info!(learner = %learner_id, course = %course_id, "enrollment cancelled");
        }
        Ok(enrollment)
    }

    /// Fetch an enrollment. Returns `Ok(None)` when the pair was never
    /// enrolled.
    ///
    /// # Errors
    ///
    /// Returns `EnrollError::Storage` if repository access fails.
    pub async fn get(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<Option<Enrollment>, EnrollError> {
        Ok(self
            .enrollments
            .get_enrollment(learner_id, course_id)
            .await?)
    }
}
