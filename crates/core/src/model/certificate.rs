use chrono::{DateTime, Utc};
use url::Url;

use crate::model::ids::{CertificateId, CourseId, LearnerId};
use crate::model::ledger::ProgressLedger;

/// Completion certificate for one (learner, course) pair.
///
/// The issuer guarantees at most one certificate per pair; re-issuing
/// returns the existing record unchanged. That uniqueness is enforced at
/// the persistence boundary, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    id: CertificateId,
    learner_id: LearnerId,
    course_id: CourseId,
    issued_at: DateTime<Utc>,
}

impl Certificate {
    /// Mint a certificate with a fresh shareable identifier.
    #[must_use]
    pub fn issue(learner_id: LearnerId, course_id: CourseId, now: DateTime<Utc>) -> Self {
        Self {
            id: CertificateId::generate(),
            learner_id,
            course_id,
            issued_at: now,
        }
    }

    /// Rehydrate a certificate from persisted storage.
    #[must_use]
    pub fn from_persisted(
        id: CertificateId,
        learner_id: LearnerId,
        course_id: CourseId,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            learner_id,
            course_id,
            issued_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> CertificateId {
        self.id
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
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Public link for sharing this certificate.
    ///
    /// # Errors
    ///
    /// Returns `url::ParseError` if the base cannot be joined, e.g. a
    /// `cannot-be-a-base` URL.
    pub fn share_url(&self, base: &Url) -> Result<Url, url::ParseError> {
        base.join(&format!("certificates/{}", self.id))
    }
}

/// Certificate eligibility gate.
///
/// Accepts anything at or above 100 rather than testing equality, so a
/// percentage that overshoots through rounding still passes.
#[must_use]
pub fn eligible_for_certificate(ledger: &ProgressLedger) -> bool {
    ledger.overall_progress() >= 100
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use std::collections::BTreeSet;

    fn ledger_at(progress: u8) -> ProgressLedger {
        ProgressLedger::from_persisted(
            LearnerId::new("l1"),
            CourseId::new("c1"),
            BTreeSet::new(),
            BTreeSet::new(),
            false,
            None,
            progress,
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn eligibility_requires_full_completion() {
        assert!(!eligible_for_certificate(&ledger_at(0)));
        assert!(!eligible_for_certificate(&ledger_at(99)));
        assert!(eligible_for_certificate(&ledger_at(100)));
    }

    #[test]
    fn share_url_embeds_the_certificate_id() {
        let cert = Certificate::issue(LearnerId::new("l1"), CourseId::new("c1"), fixed_now());
        let base = Url::parse("https://lms.example.org/").unwrap();
        let url = cert.share_url(&base).unwrap();
        assert_eq!(
            url.as_str(),
            format!("https://lms.example.org/certificates/{}", cert.id())
        );
    }

    #[test]
    fn issue_generates_distinct_ids() {
        let a = Certificate::issue(LearnerId::new("l1"), CourseId::new("c1"), fixed_now());
        let b = Certificate::issue(LearnerId::new("l1"), CourseId::new("c2"), fixed_now());
        assert_ne!(a.id(), b.id());
    }
}
