use std::sync::Arc;

use chrono::{DateTime, Utc};

use course_core::model::{CourseId, EnrollmentStatus, LearnerId};
use storage::repository::{EnrollmentRepository, LedgerRepository, StorageError};

/// Presentation-agnostic row for a learner's course list.
///
/// This is intentionally **not** a UI view-model: no pre-formatted
/// strings, no localization assumptions. The UI may format timestamps
/// and percentages as needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentListItem {
    pub course_id: CourseId,
    pub status: EnrollmentStatus,
    pub overall_progress: u8,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

/// Aggregate counts for an instructor's course dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseStatistics {
    pub enrolled: usize,
    pub active: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub average_progress: u8,
}

/// Read-only queries over enrollments and ledgers for dashboards.
///
/// Never writes; progress mutation stays with `ProgressService`.
#[derive(Clone)]
pub struct DashboardService {
    enrollments: Arc<dyn EnrollmentRepository>,
    ledgers: Arc<dyn LedgerRepository>,
}

impl DashboardService {
    #[must_use]
    pub fn new(
        enrollments: Arc<dyn EnrollmentRepository>,
        ledgers: Arc<dyn LedgerRepository>,
    ) -> Self {
        Self {
            enrollments,
            ledgers,
        }
    }

    /// One row per course the learner is or was enrolled in.
    ///
    /// An enrollment whose ledger has not been created yet (an
    /// interrupted enroll) shows zero progress rather than failing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if repository access fails.
    pub async fn learner_overview(
        &self,
        learner_id: &LearnerId,
    ) -> Result<Vec<EnrollmentListItem>, StorageError> {
        let enrollments = self.enrollments.enrollments_for_learner(learner_id).await?;

        let mut items = Vec::with_capacity(enrollments.len());
        for enrollment in enrollments {
            let ledger = self
                .ledgers
                .get_ledger(learner_id, enrollment.course_id())
                .await?;
            let (overall_progress, last_accessed_at) = match &ledger {
                Some(versioned) => (
                    versioned.ledger.overall_progress(),
                    Some(versioned.ledger.last_accessed_at()),
                ),
                None => (0, None),
            };
            items.push(EnrollmentListItem {
                course_id: enrollment.course_id().clone(),
                status: enrollment.status(),
                overall_progress,
                enrolled_at: enrollment.enrolled_at(),
                completed_at: enrollment.completed_at(),
                last_accessed_at,
            });
        }
        Ok(items)
    }

    /// Enrollment counts and the mean progress percentage for a course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if repository access fails.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub async fn course_statistics(
        &self,
        course_id: &CourseId,
    ) -> Result<CourseStatistics, StorageError> {
        let enrollments = self.enrollments.enrollments_for_course(course_id).await?;
        let mut active = 0;
        let mut completed = 0;
        let mut cancelled = 0;
        for enrollment in &enrollments {
            match enrollment.status() {
                EnrollmentStatus::Active => active += 1,
                EnrollmentStatus::Completed => completed += 1,
                EnrollmentStatus::Cancelled => cancelled += 1,
            }
        }

        let ledgers = self.ledgers.ledgers_for_course(course_id).await?;
        let average_progress = if ledgers.is_empty() {
            0
        } else {
            let total: u32 = ledgers.iter().map(|l| u32::from(l.overall_progress())).sum();
            (f64::from(total) / ledgers.len() as f64).round() as u8
        };

        Ok(CourseStatistics {
            enrolled: enrollments.len(),
            active,
            completed,
            cancelled,
            average_progress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::engine::{self, ProgressEvent};
    use course_core::model::{
        CurriculumSnapshot, Enrollment, ModuleId, ModuleOutline, ProgressLedger, SectionId,
    };
    use course_core::time::fixed_now;
    use storage::repository::{CurriculumRepository, InMemoryRepository};

    fn snapshot() -> CurriculumSnapshot {
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

    async fn seed_learner(repo: &InMemoryRepository, learner: &str, course: &str, sections: &[&str]) {
        let learner = LearnerId::new(learner);
        let course = CourseId::new(course);
        let now = fixed_now();
        repo.put_snapshot(&course, &snapshot()).await.unwrap();
        repo.insert_enrollment(&Enrollment::new(learner.clone(), course.clone(), now))
            .await
            .unwrap();

        let mut ledger = ProgressLedger::new(learner.clone(), course.clone(), now);
        for section in sections {
            let event = ProgressEvent::VisitSection {
                module_id: ModuleId::new("m1"),
                section_id: SectionId::new(*section),
            };
            ledger = engine::apply_event(&ledger, &snapshot(), &event, now)
                .unwrap()
                .ledger;
        }
        repo.insert_ledger(&ledger).await.unwrap();
    }

    #[tokio::test]
    async fn learner_overview_lists_every_enrollment() {
        let repo = InMemoryRepository::new();
        seed_learner(&repo, "l1", "c1", &["s1"]).await;
        seed_learner(&repo, "l1", "c2", &[]).await;

        let service = DashboardService::new(Arc::new(repo.clone()), Arc::new(repo.clone()));
        let mut items = service.learner_overview(&LearnerId::new("l1")).await.unwrap();
        items.sort_by(|a, b| a.course_id.cmp(&b.course_id));

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].course_id, CourseId::new("c1"));
        assert_eq!(items[0].overall_progress, 50);
        assert_eq!(items[1].overall_progress, 0);
    }

    #[tokio::test]
    async fn course_statistics_average_over_ledgers() {
        let repo = InMemoryRepository::new();
        seed_learner(&repo, "l1", "c1", &["s1", "s2"]).await;
        seed_learner(&repo, "l2", "c1", &["s1"]).await;
        seed_learner(&repo, "l3", "c1", &[]).await;

        let service = DashboardService::new(Arc::new(repo.clone()), Arc::new(repo.clone()));
        let stats = service.course_statistics(&CourseId::new("c1")).await.unwrap();

        assert_eq!(stats.enrolled, 3);
        assert_eq!(stats.active, 3);
        assert_eq!(stats.completed, 0);
        // (100 + 50 + 0) / 3 = 50
        assert_eq!(stats.average_progress, 50);
    }

    #[tokio::test]
    async fn empty_course_statistics_are_all_zero() {
        let repo = InMemoryRepository::new();
        let service = DashboardService::new(Arc::new(repo.clone()), Arc::new(repo.clone()));
        let stats = service.course_statistics(&CourseId::new("ghost")).await.unwrap();
        assert_eq!(stats.enrolled, 0);
        assert_eq!(stats.average_progress, 0);
    }
}
