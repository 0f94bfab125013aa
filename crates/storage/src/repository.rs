use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use course_core::model::{
    Certificate, CourseId, CurriculumSnapshot, Enrollment, LearnerId, ProgressLedger,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A ledger together with its optimistic-concurrency version.
///
/// Every persisted write must cite the version it read; the repository
/// rejects the write with `StorageError::Conflict` when the stored
/// version has moved on, so two concurrent updates to the same ledger
/// can never silently overwrite each other.
#[derive(Debug, Clone)]
pub struct VersionedLedger {
    pub ledger: ProgressLedger,
    pub version: i64,
}

/// Repository contract for progress ledgers.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Create the ledger for a new enrollment.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a ledger already exists for
    /// the (learner, course) pair, or other storage errors.
    async fn insert_ledger(&self, ledger: &ProgressLedger) -> Result<(), StorageError>;

    /// Fetch a ledger with its current version.
    ///
    /// Returns `Ok(None)` when no ledger exists for the pair.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if repository access fails.
    async fn get_ledger(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<Option<VersionedLedger>, StorageError>;

    /// Persist an updated ledger if `expected_version` still matches,
    /// returning the new version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when the stored version differs,
    /// `StorageError::NotFound` when the ledger does not exist, or other
    /// storage errors.
    async fn update_ledger(
        &self,
        ledger: &ProgressLedger,
        expected_version: i64,
    ) -> Result<i64, StorageError>;

    /// All ledgers recorded for a course, for statistics.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if repository access fails.
    async fn ledgers_for_course(
        &self,
        course_id: &CourseId,
    ) -> Result<Vec<ProgressLedger>, StorageError>;
}

/// Repository contract for enrollments.
#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Create a new enrollment.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the pair is already enrolled,
    /// or other storage errors.
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError>;

    /// Fetch an enrollment. Returns `Ok(None)` when missing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if repository access fails.
    async fn get_enrollment(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<Option<Enrollment>, StorageError>;

    /// Persist status changes for an existing enrollment.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the enrollment does not
    /// exist, or other storage errors.
    async fn update_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError>;

    /// All enrollments of one learner.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if repository access fails.
    async fn enrollments_for_learner(
        &self,
        learner_id: &LearnerId,
    ) -> Result<Vec<Enrollment>, StorageError>;

    /// All enrollments in one course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if repository access fails.
    async fn enrollments_for_course(
        &self,
        course_id: &CourseId,
    ) -> Result<Vec<Enrollment>, StorageError>;
}

/// Repository contract for curriculum snapshots.
///
/// The snapshot is assembled in full here, outside the engine, so a
/// failed sub-fetch aborts the whole load instead of silently degrading
/// to an empty module list.
#[async_trait]
pub trait CurriculumRepository: Send + Sync {
    /// Load the current snapshot for a course.
    ///
    /// Returns `Ok(None)` when the course does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if repository access fails.
    async fn get_snapshot(
        &self,
        course_id: &CourseId,
    ) -> Result<Option<CurriculumSnapshot>, StorageError>;

    /// Replace the stored snapshot for a course wholesale.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be stored.
    async fn put_snapshot(
        &self,
        course_id: &CourseId,
        snapshot: &CurriculumSnapshot,
    ) -> Result<(), StorageError>;
}

/// Repository contract for certificates.
#[async_trait]
pub trait CertificateRepository: Send + Sync {
    /// Store a freshly issued certificate.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a certificate already exists
    /// for the (learner, course) pair, or other storage errors.
    async fn insert_certificate(&self, certificate: &Certificate) -> Result<(), StorageError>;

    /// Fetch the certificate for a pair. Returns `Ok(None)` when none
    /// was issued.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if repository access fails.
    async fn get_certificate(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<Option<Certificate>, StorageError>;
}

type PairKey = (LearnerId, CourseId);

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    curricula: Arc<Mutex<HashMap<CourseId, CurriculumSnapshot>>>,
    enrollments: Arc<Mutex<HashMap<PairKey, Enrollment>>>,
    ledgers: Arc<Mutex<HashMap<PairKey, (ProgressLedger, i64)>>>,
    certificates: Arc<Mutex<HashMap<PairKey, Certificate>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_err<T>(e: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl LedgerRepository for InMemoryRepository {
    async fn insert_ledger(&self, ledger: &ProgressLedger) -> Result<(), StorageError> {
        let mut guard = self.ledgers.lock().map_err(lock_err)?;
        let key = (ledger.learner_id().clone(), ledger.course_id().clone());
        if guard.contains_key(&key) {
            return Err(StorageError::Conflict);
        }
        guard.insert(key, (ledger.clone(), 1));
        Ok(())
    }

    async fn get_ledger(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<Option<VersionedLedger>, StorageError> {
        let guard = self.ledgers.lock().map_err(lock_err)?;
        Ok(guard
            .get(&(learner_id.clone(), course_id.clone()))
            .map(|(ledger, version)| VersionedLedger {
                ledger: ledger.clone(),
                version: *version,
            }))
    }

    async fn update_ledger(
        &self,
        ledger: &ProgressLedger,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        let mut guard = self.ledgers.lock().map_err(lock_err)?;
        let key = (ledger.learner_id().clone(), ledger.course_id().clone());
        let Some((stored, version)) = guard.get_mut(&key) else {
            return Err(StorageError::NotFound);
        };
        if *version != expected_version {
            return Err(StorageError::Conflict);
        }
        *stored = ledger.clone();
        *version += 1;
        Ok(*version)
    }

    async fn ledgers_for_course(
        &self,
        course_id: &CourseId,
    ) -> Result<Vec<ProgressLedger>, StorageError> {
        let guard = self.ledgers.lock().map_err(lock_err)?;
        Ok(guard
            .values()
            .filter(|(ledger, _)| ledger.course_id() == course_id)
            .map(|(ledger, _)| ledger.clone())
            .collect())
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryRepository {
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        let mut guard = self.enrollments.lock().map_err(lock_err)?;
        let key = (
            enrollment.learner_id().clone(),
            enrollment.course_id().clone(),
        );
        if guard.contains_key(&key) {
            return Err(StorageError::Conflict);
        }
        guard.insert(key, enrollment.clone());
        Ok(())
    }

    async fn get_enrollment(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        let guard = self.enrollments.lock().map_err(lock_err)?;
        Ok(guard.get(&(learner_id.clone(), course_id.clone())).cloned())
    }

    async fn update_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        let mut guard = self.enrollments.lock().map_err(lock_err)?;
        let key = (
            enrollment.learner_id().clone(),
            enrollment.course_id().clone(),
        );
        if !guard.contains_key(&key) {
            return Err(StorageError::NotFound);
        }
        guard.insert(key, enrollment.clone());
        Ok(())
    }

    async fn enrollments_for_learner(
        &self,
        learner_id: &LearnerId,
    ) -> Result<Vec<Enrollment>, StorageError> {
        let guard = self.enrollments.lock().map_err(lock_err)?;
        Ok(guard
            .values()
            .filter(|e| e.learner_id() == learner_id)
            .cloned()
            .collect())
    }

    async fn enrollments_for_course(
        &self,
        course_id: &CourseId,
    ) -> Result<Vec<Enrollment>, StorageError> {
        let guard = self.enrollments.lock().map_err(lock_err)?;
        Ok(guard
            .values()
            .filter(|e| e.course_id() == course_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CurriculumRepository for InMemoryRepository {
    async fn get_snapshot(
        &self,
        course_id: &CourseId,
    ) -> Result<Option<CurriculumSnapshot>, StorageError> {
        let guard = self.curricula.lock().map_err(lock_err)?;
        Ok(guard.get(course_id).cloned())
    }

    async fn put_snapshot(
        &self,
        course_id: &CourseId,
        snapshot: &CurriculumSnapshot,
    ) -> Result<(), StorageError> {
        let mut guard = self.curricula.lock().map_err(lock_err)?;
        guard.insert(course_id.clone(), snapshot.clone());
        Ok(())
    }
}

#[async_trait]
impl CertificateRepository for InMemoryRepository {
    async fn insert_certificate(&self, certificate: &Certificate) -> Result<(), StorageError> {
        let mut guard = self.certificates.lock().map_err(lock_err)?;
        let key = (
            certificate.learner_id().clone(),
            certificate.course_id().clone(),
        );
        if guard.contains_key(&key) {
            return Err(StorageError::Conflict);
        }
        guard.insert(key, certificate.clone());
        Ok(())
    }

    async fn get_certificate(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<Option<Certificate>, StorageError> {
        let guard = self.certificates.lock().map_err(lock_err)?;
        Ok(guard.get(&(learner_id.clone(), course_id.clone())).cloned())
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub curricula: Arc<dyn CurriculumRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub ledgers: Arc<dyn LedgerRepository>,
    pub certificates: Arc<dyn CertificateRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            curricula: Arc::new(repo.clone()),
            enrollments: Arc::new(repo.clone()),
            ledgers: Arc::new(repo.clone()),
            certificates: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use course_core::engine::{self, ProgressEvent};
    use course_core::model::{ModuleId, ModuleOutline, SectionId};
    use course_core::time::fixed_now;

    fn pair() -> (LearnerId, CourseId) {
        (LearnerId::new("l1"), CourseId::new("c1"))
    }

    fn one_section_snapshot() -> CurriculumSnapshot {
        CurriculumSnapshot::new(
            vec![ModuleOutline::new(
                ModuleId::new("m1"),
                vec![SectionId::new("s1")],
                None,
            )],
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn ledger_round_trips_with_version() {
        let repo = InMemoryRepository::new();
        let (learner, course) = pair();
        let ledger = ProgressLedger::new(learner.clone(), course.clone(), fixed_now());

        repo.insert_ledger(&ledger).await.unwrap();
        let fetched = repo.get_ledger(&learner, &course).await.unwrap().unwrap();
        assert_eq!(fetched.version, 1);
        assert_eq!(fetched.ledger, ledger);

        assert!(matches!(
            repo.insert_ledger(&ledger).await,
            Err(StorageError::Conflict)
        ));
    }

    #[tokio::test]
    async fn stale_version_update_is_rejected() {
        let repo = InMemoryRepository::new();
        let (learner, course) = pair();
        let snapshot = one_section_snapshot();
        let ledger = ProgressLedger::new(learner.clone(), course.clone(), fixed_now());
        repo.insert_ledger(&ledger).await.unwrap();

        let event = ProgressEvent::VisitSection {
            module_id: ModuleId::new("m1"),
            section_id: SectionId::new("s1"),
        };
        let updated = engine::apply_event(&ledger, &snapshot, &event, fixed_now())
            .unwrap()
            .ledger;

        let new_version = repo.update_ledger(&updated, 1).await.unwrap();
        assert_eq!(new_version, 2);

        // A second writer still holding version 1 must not clobber the first.
        let other = engine::apply_event(
            &ledger,
            &snapshot,
            &event,
            fixed_now() + Duration::minutes(1),
        )
        .unwrap()
        .ledger;
        assert!(matches!(
            repo.update_ledger(&other, 1).await,
            Err(StorageError::Conflict)
        ));

        let stored = repo.get_ledger(&learner, &course).await.unwrap().unwrap();
        assert_eq!(stored.ledger, updated);
    }

    #[tokio::test]
    async fn certificate_uniqueness_is_enforced() {
        let repo = InMemoryRepository::new();
        let (learner, course) = pair();
        let first = Certificate::issue(learner.clone(), course.clone(), fixed_now());
        repo.insert_certificate(&first).await.unwrap();

        let second = Certificate::issue(learner.clone(), course.clone(), fixed_now());
        assert!(matches!(
            repo.insert_certificate(&second).await,
            Err(StorageError::Conflict)
        ));

        let stored = repo
            .get_certificate(&learner, &course)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id(), first.id());
    }

    #[tokio::test]
    async fn enrollment_queries_filter_by_learner_and_course() {
        let repo = InMemoryRepository::new();
        let now = fixed_now();
        for (l, c) in [("l1", "c1"), ("l1", "c2"), ("l2", "c1")] {
            let enrollment = Enrollment::new(LearnerId::new(l), CourseId::new(c), now);
            repo.insert_enrollment(&enrollment).await.unwrap();
        }

        let by_learner = repo
            .enrollments_for_learner(&LearnerId::new("l1"))
            .await
            .unwrap();
        assert_eq!(by_learner.len(), 2);

        let by_course = repo
            .enrollments_for_course(&CourseId::new("c1"))
            .await
            .unwrap();
        assert_eq!(by_course.len(), 2);
    }
}
