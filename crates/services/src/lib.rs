#![forbid(unsafe_code)]

pub mod app_services;
pub mod certificate_service;
pub mod dashboard;
pub mod enrollment_service;
pub mod error;
pub mod progress_service;
pub mod recommendation_service;

pub use course_core::Clock;

pub use app_services::AppServices;
pub use certificate_service::CertificateService;
pub use dashboard::{CourseStatistics, DashboardService, EnrollmentListItem};
pub use enrollment_service::EnrollmentService;
pub use error::{
    AppServicesError, CertificateError, EnrollError, ProgressError, RecommendationError,
};
pub use progress_service::{ProgressReport, ProgressService, on_ledger_updated};
pub use recommendation_service::{
    CourseRecommendation, RecommendationConfig, RecommendationService,
};
