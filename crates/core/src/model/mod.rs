mod certificate;
mod curriculum;
mod enrollment;
mod ids;
mod ledger;

pub use certificate::{Certificate, eligible_for_certificate};
pub use curriculum::{CurriculumError, CurriculumSnapshot, ModuleOutline};
pub use enrollment::{Enrollment, EnrollmentError, EnrollmentStatus};
pub use ids::{
    CertificateId, CourseId, LearnerId, ModuleId, ParseIdError, QuizId, SectionId,
};
pub use ledger::{LedgerError, Location, ProgressLedger};
