use std::sync::Arc;

use chrono::{DateTime, Utc};

use course_core::Clock;
use course_core::engine::{self, ProgressEvent};
use course_core::model::{
    CourseId, Enrollment, EnrollmentStatus, LearnerId, ProgressLedger, QuizId, SectionId,
};
use storage::repository::{
    CurriculumRepository, EnrollmentRepository, LedgerRepository, StorageError,
};

use crate::error::ProgressError;

/// How many times one report re-reads the ledger after losing the
/// version race before giving up.
const MAX_PERSIST_ATTEMPTS: u32 = 3;

/// Public view of a ledger returned to progress-report callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReport {
    pub overall_progress: u8,
    pub completed_sections: Vec<SectionId>,
    pub completed_quizzes: Vec<QuizId>,
    pub completed_final_exam: bool,
    pub last_accessed_at: DateTime<Utc>,
}

impl ProgressReport {
    #[must_use]
    pub fn from_ledger(ledger: &ProgressLedger) -> Self {
        Self {
            overall_progress: ledger.overall_progress(),
            completed_sections: ledger.completed_sections().iter().cloned().collect(),
            completed_quizzes: ledger.completed_quizzes().iter().cloned().collect(),
            completed_final_exam: ledger.completed_final_exam(),
            last_accessed_at: ledger.last_accessed_at(),
        }
    }
}

/// Drive the one-way `active -> completed` enrollment transition off a
/// freshly persisted ledger.
///
/// Returns true only when the transition happened on this call. A
/// completed or cancelled enrollment is left untouched, so repeated
/// invocations at 100% never move `completed_at`.
pub fn on_ledger_updated(
    enrollment: &mut Enrollment,
    ledger: &ProgressLedger,
    now: DateTime<Utc>,
) -> bool {
    if enrollment.is_active() && ledger.is_complete() {
        enrollment.mark_completed(now)
    } else {
        false
    }
}

/// Orchestrates one progress-report cycle: load, apply, persist with a
/// version check, and sync the enrollment on completion.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    ledgers: Arc<dyn LedgerRepository>,
    curricula: Arc<dyn CurriculumRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        ledgers: Arc<dyn LedgerRepository>,
        curricula: Arc<dyn CurriculumRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
    ) -> Self {
        Self {
            clock,
            ledgers,
            curricula,
            enrollments,
        }
    }

    /// Apply one progress event for an enrolled learner.
    ///
    /// The engine runs on an in-memory copy and the persist step is a
    /// compare-and-swap on the ledger's version, so two tabs reporting
    /// different sections concurrently both land: the loser re-reads the
    /// winner's ledger and reapplies its own event.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotEnrolled` when no usable enrollment or
    /// ledger exists, `CourseNotFound` when the curriculum is missing,
    /// `InvalidReference` for events naming unknown content,
    /// `ConcurrentModification` when the retries are exhausted, and
    /// `Storage` for repository failures.
    pub async fn report(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
        event: &ProgressEvent,
    ) -> Result<ProgressReport, ProgressError> {
        let enrollment = self
            .enrollments
            .get_enrollment(learner_id, course_id)
            .await?
            .ok_or(ProgressError::NotEnrolled)?;
        if enrollment.status() == EnrollmentStatus::Cancelled {
            return Err(ProgressError::NotEnrolled);
        }

        let snapshot = self
            .curricula
            .get_snapshot(course_id)
            .await?
            .ok_or(ProgressError::CourseNotFound)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let versioned = self
                .ledgers
                .get_ledger(learner_id, course_id)
                .await?
                .ok_or(ProgressError::NotEnrolled)?;

            let now = self.clock.now();
            let outcome = engine::apply_event(&versioned.ledger, &snapshot, event, now)?;

            match self
                .ledgers
                .update_ledger(&outcome.ledger, versioned.version)
                .await
            {
                Ok(_) => {
                    tracing::debug!(
                        learner = %learner_id,
                        course = %course_id,
                        progress = outcome.ledger.overall_progress(),
                        "progress event applied"
                    );
                    if outcome.completed {
                        self.sync_enrollment_completion(learner_id, course_id, &outcome.ledger)
                            .await?;
                    }
                    return Ok(ProgressReport::from_ledger(&outcome.ledger));
                }
                Err(StorageError::Conflict) if attempt < MAX_PERSIST_ATTEMPTS => {
                    tracing::warn!(
                        learner = %learner_id,
                        course = %course_id,
                        attempt,
                        "ledger version conflict, retrying"
                    );
                }
                Err(StorageError::Conflict) => {
                    return Err(ProgressError::ConcurrentModification);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Read the current ledger without applying an event.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotEnrolled` when no ledger exists, or
    /// `Storage` for repository failures.
    pub async fn current(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<ProgressReport, ProgressError> {
        let versioned = self
            .ledgers
            .get_ledger(learner_id, course_id)
            .await?
            .ok_or(ProgressError::NotEnrolled)?;
        Ok(ProgressReport::from_ledger(&versioned.ledger))
    }

    async fn sync_enrollment_completion(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
        ledger: &ProgressLedger,
    ) -> Result<(), ProgressError> {
        // Re-read so a retry loop that raced another tab still sees the
        // freshest enrollment state.
        let Some(mut enrollment) = self
            .enrollments
            .get_enrollment(learner_id, course_id)
            .await?
        else {
            return Ok(());
        };

        if on_ledger_updated(&mut enrollment, ledger, self.clock.now()) {
            self.enrollments.update_enrollment(&enrollment).await?;
            tracing::info!(learner = %learner_id, course = %course_id, "course completed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use course_core::model::{CurriculumSnapshot, ModuleId, ModuleOutline};
    use course_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    fn visit_section(module: &str, section: &str) -> ProgressEvent {
        ProgressEvent::VisitSection {
            module_id: ModuleId::new(module),
            section_id: SectionId::new(section),
        }
    }

    fn two_item_snapshot() -> CurriculumSnapshot {
        CurriculumSnapshot::new(
            vec![ModuleOutline::new(
                ModuleId::new("m1"),
                vec![SectionId::new("s1"), SectionId::new("s2")],
                None,
            )],
            None,
        )
        .unwrap()
    }

    async fn seeded_service(repo: &InMemoryRepository) -> (ProgressService, LearnerId, CourseId) {
        let learner = LearnerId::new("l1");
        let course = CourseId::new("c1");
        let now = fixed_now();

        repo.put_snapshot(&course, &two_item_snapshot()).await.unwrap();
        repo.insert_enrollment(&Enrollment::new(learner.clone(), course.clone(), now))
            .await
            .unwrap();
        repo.insert_ledger(&ProgressLedger::new(learner.clone(), course.clone(), now))
            .await
            .unwrap();

        let service = ProgressService::new(
            Clock::fixed(now),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        );
        (service, learner, course)
    }

    #[tokio::test]
    async fn report_applies_and_persists_an_event() {
        let repo = InMemoryRepository::new();
        let (service, learner, course) = seeded_service(&repo).await;

        let report = service
            .report(&learner, &course, &visit_section("m1", "s1"))
            .await
            .unwrap();
        assert_eq!(report.overall_progress, 50);
        assert_eq!(report.completed_sections, vec![SectionId::new("s1")]);

        let stored = repo.get_ledger(&learner, &course).await.unwrap().unwrap();
        assert_eq!(stored.ledger.overall_progress(), 50);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn current_reads_the_ledger_without_mutating_it() {
        let repo = InMemoryRepository::new();
        let (service, learner, course) = seeded_service(&repo).await;

        let reported = service
            .report(&learner, &course, &visit_section("m1", "s1"))
            .await
            .unwrap();

        let current = service.current(&learner, &course).await.unwrap();
        assert_eq!(current, reported);

        let stored = repo.get_ledger(&learner, &course).await.unwrap().unwrap();
        assert_eq!(stored.version, 2); // report wrote once, current not at all

        let err = service
            .current(&LearnerId::new("stranger"), &course)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::NotEnrolled));
    }

    #[tokio::test]
    async fn completion_flips_the_enrollment_exactly_once() {
        let repo = InMemoryRepository::new();
        let (service, learner, course) = seeded_service(&repo).await;

        service
            .report(&learner, &course, &visit_section("m1", "s1"))
            .await
            .unwrap();
        let enrollment = repo.get_enrollment(&learner, &course).await.unwrap().unwrap();
        assert_eq!(enrollment.status(), EnrollmentStatus::Active);

        let report = service
            .report(&learner, &course, &visit_section("m1", "s2"))
            .await
            .unwrap();
        assert_eq!(report.overall_progress, 100);

        let enrollment = repo.get_enrollment(&learner, &course).await.unwrap().unwrap();
        assert_eq!(enrollment.status(), EnrollmentStatus::Completed);
        let completed_at = enrollment.completed_at().unwrap();

        // Revisiting a finished course must not disturb completed_at.
        service
            .report(&learner, &course, &visit_section("m1", "s1"))
            .await
            .unwrap();
        let enrollment = repo.get_enrollment(&learner, &course).await.unwrap().unwrap();
        assert_eq!(enrollment.completed_at(), Some(completed_at));
    }

    #[tokio::test]
    async fn invalid_references_do_not_mutate_the_ledger() {
        let repo = InMemoryRepository::new();
        let (service, learner, course) = seeded_service(&repo).await;

        let before = repo.get_ledger(&learner, &course).await.unwrap().unwrap();
        let err = service
            .report(&learner, &course, &visit_section("m1", "does-not-exist"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::InvalidReference(_)));

        let after = repo.get_ledger(&learner, &course).await.unwrap().unwrap();
        assert_eq!(after.ledger, before.ledger);
        assert_eq!(after.version, before.version);
    }

    #[tokio::test]
    async fn unknown_or_cancelled_enrollments_are_rejected() {
        let repo = InMemoryRepository::new();
        let (service, learner, course) = seeded_service(&repo).await;

        let err = service
            .report(&LearnerId::new("stranger"), &course, &visit_section("m1", "s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::NotEnrolled));

        let mut enrollment = repo.get_enrollment(&learner, &course).await.unwrap().unwrap();
        enrollment.cancel();
        repo.update_enrollment(&enrollment).await.unwrap();

        let err = service
            .report(&learner, &course, &visit_section("m1", "s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::NotEnrolled));
    }

    #[test]
    fn coordinator_is_idempotent() {
        let now = fixed_now();
        let learner = LearnerId::new("l1");
        let course = CourseId::new("c1");
        let mut enrollment = Enrollment::new(learner.clone(), course.clone(), now);

        let mut ledger = ProgressLedger::new(learner, course, now);
        assert!(!on_ledger_updated(&mut enrollment, &ledger, now));

        let snapshot = two_item_snapshot();
        for event in [visit_section("m1", "s1"), visit_section("m1", "s2")] {
            ledger = engine::apply_event(&ledger, &snapshot, &event, now)
                .unwrap()
                .ledger;
        }
        assert!(on_ledger_updated(&mut enrollment, &ledger, now));
        assert_eq!(enrollment.completed_at(), Some(now));

        let later = now + Duration::hours(1);
        assert!(!on_ledger_updated(&mut enrollment, &ledger, later));
        assert_eq!(enrollment.completed_at(), Some(now));
    }
}
