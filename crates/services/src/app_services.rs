use std::sync::Arc;

use course_core::Clock;
use storage::repository::Storage;

use crate::certificate_service::CertificateService;
use crate::dashboard::DashboardService;
use crate::enrollment_service::EnrollmentService;
use crate::error::AppServicesError;
use crate::progress_service::ProgressService;
use crate::recommendation_service::RecommendationService;

/// Assembles the application-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    progress: Arc<ProgressService>,
    enrollments: Arc<EnrollmentService>,
    certificates: Arc<CertificateService>,
    dashboard: Arc<DashboardService>,
    recommendations: Arc<RecommendationService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock))
    }

    /// Wire services over an already constructed storage aggregate.
    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock) -> Self {
        let progress = Arc::new(ProgressService::new(
            clock,
            Arc::clone(&storage.ledgers),
            Arc::clone(&storage.curricula),
            Arc::clone(&storage.enrollments),
        ));
        let enrollments = Arc::new(EnrollmentService::new(
            clock,
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.ledgers),
            Arc::clone(&storage.curricula),
        ));
        let certificates = Arc::new(CertificateService::new(
            clock,
            Arc::clone(&storage.ledgers),
            Arc::clone(&storage.certificates),
        ));
        let dashboard = Arc::new(DashboardService::new(
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.ledgers),
        ));
        let recommendations = Arc::new(RecommendationService::from_env());

        Self {
            progress,
            enrollments,
            certificates,
            dashboard,
            recommendations,
        }
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn enrollments(&self) -> Arc<EnrollmentService> {
        Arc::clone(&self.enrollments)
    }

    #[must_use]
    pub fn certificates(&self) -> Arc<CertificateService> {
        Arc::clone(&self.certificates)
    }

    #[must_use]
    pub fn dashboard(&self) -> Arc<DashboardService> {
        Arc::clone(&self.dashboard)
    }

    #[must_use]
    pub fn recommendations(&self) -> Arc<RecommendationService> {
        Arc::clone(&self.recommendations)
    }
}
