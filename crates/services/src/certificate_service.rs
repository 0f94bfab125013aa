use std::sync::Arc;

use course_core::Clock;
use course_core::model::{Certificate, CourseId, LearnerId, eligible_for_certificate};
use storage::repository::{CertificateRepository, LedgerRepository, StorageError};

use crate::error::CertificateError;

/// Gates and issues completion certificates, at most one per
/// (learner, course) pair.
#[derive(Clone)]
pub struct CertificateService {
    clock: Clock,
    ledgers: Arc<dyn LedgerRepository>,
    certificates: Arc<dyn CertificateRepository>,
}

impl CertificateService {
    #[must_use]
    pub fn new(
        clock: Clock,
        ledgers: Arc<dyn LedgerRepository>,
        certificates: Arc<dyn CertificateRepository>,
    ) -> Self {
        Self {
            clock,
            ledgers,
            certificates,
        }
    }

    /// Issue the certificate for a completed course, or return the one
    /// already issued.
    ///
    /// Repeat calls are successes, not failures: the existing
    /// certificate comes back unchanged. Two racing first issuances
    /// resolve through the repository's uniqueness constraint, and the
    /// loser returns the winner's certificate.
    ///
    /// # Errors
    ///
    /// Returns `CertificateError::NotEnrolled` when no ledger exists,
    /// `NotEligible` (carrying the current percentage) below full
    /// completion, and `Storage` for repository failures.
    pub async fn issue(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<Certificate, CertificateError> {
        if let Some(existing) = self
            .certificates
            .get_certificate(learner_id, course_id)
            .await?
        {
            return Ok(existing);
        }

        let ledger = self
            .ledgers
            .get_ledger(learner_id, course_id)
            .await?
            .ok_or(CertificateError::NotEnrolled)?
            .ledger;

        if !eligible_for_certificate(&ledger) {
            return Err(CertificateError::NotEligible {
                current_progress: ledger.overall_progress(),
            });
        }

        let certificate =
            Certificate::issue(learner_id.clone(), course_id.clone(), self.clock.now());
        match self.certificates.insert_certificate(&certificate).await {
            Ok(()) => {
                tracing::info!(
                    learner = %learner_id,
                    course = %course_id,
                    certificate = %certificate.id(),
                    "certificate issued"
                );
                Ok(certificate)
            }
            // Another request won the race; hand back its certificate.
            Err(StorageError::Conflict) => self
                .certificates
                .get_certificate(learner_id, course_id)
                .await?
                .ok_or(CertificateError::Storage(StorageError::NotFound)),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch the issued certificate, if any.
    ///
    /// # Errors
    ///
    /// Returns `CertificateError::Storage` if repository access fails.
    pub async fn find(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<Option<Certificate>, CertificateError> {
        Ok(self
            .certificates
            .get_certificate(learner_id, course_id)
            .await?)
    }
}
