use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{CourseId, LearnerId, ModuleId, QuizId, SectionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LedgerError {
    #[error("overall progress must be at most 100, got {0}")]
    InvalidProgress(u8),
}

//
// ─── LOCATION ──────────────────────────────────────────────────────────────────
//

/// Last-visited position within a course.
///
/// Section and quiz pointers are mutually exclusive: visiting one kind
/// replaces the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Section {
        module_id: ModuleId,
        section_id: SectionId,
    },
    Quiz {
        module_id: ModuleId,
        quiz_id: QuizId,
    },
}

//
// ─── PROGRESS LEDGER ───────────────────────────────────────────────────────────
//

/// Per-(learner, course) record of completed items and the derived
/// aggregate percentage.
///
/// Created empty at enrollment time and mutated only through the
/// progress engine, which recomputes `overall_progress` after every
/// event. The completed-item sets dedup on insertion, so re-visiting an
/// already completed item is a no-op on the set while still advancing
/// `last_accessed_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressLedger {
    learner_id: LearnerId,
    course_id: CourseId,
    completed_sections: BTreeSet<SectionId>,
    completed_quizzes: BTreeSet<QuizId>,
    completed_final_exam: bool,
    location: Option<Location>,
    overall_progress: u8,
    last_accessed_at: DateTime<Utc>,
}

impl ProgressLedger {
    /// Fresh ledger for a new enrollment, with nothing completed.
    #[must_use]
    pub fn new(learner_id: LearnerId, course_id: CourseId, now: DateTime<Utc>) -> Self {
        Self {
            learner_id,
            course_id,
            completed_sections: BTreeSet::new(),
            completed_quizzes: BTreeSet::new(),
            completed_final_exam: false,
            location: None,
            overall_progress: 0,
            last_accessed_at: now,
        }
    }

    /// Rehydrate a ledger from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidProgress` if the stored percentage
    /// exceeds 100.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        learner_id: LearnerId,
        course_id: CourseId,
        completed_sections: BTreeSet<SectionId>,
        completed_quizzes: BTreeSet<QuizId>,
        completed_final_exam: bool,
        location: Option<Location>,
        overall_progress: u8,
        last_accessed_at: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        if overall_progress > 100 {
            return Err(LedgerError::InvalidProgress(overall_progress));
        }

        Ok(Self {
            learner_id,
            course_id,
            completed_sections,
            completed_quizzes,
            completed_final_exam,
            location,
            overall_progress,
            last_accessed_at,
        })
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
    pub fn completed_sections(&self) -> &BTreeSet<SectionId> {
        &self.completed_sections
    }

    #[must_use]
    pub fn completed_quizzes(&self) -> &BTreeSet<QuizId> {
        &self.completed_quizzes
    }

    #[must_use]
    pub fn completed_final_exam(&self) -> bool {
        self.completed_final_exam
    }

    #[must_use]
    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// Derived aggregate percentage, 0 to 100. Only the engine writes it.
    #[must_use]
    pub fn overall_progress(&self) -> u8 {
        self.overall_progress
    }

    #[must_use]
    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.last_accessed_at
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.overall_progress == 100
    }

    // Engine-internal mutators. Kept crate-private so callers outside the
    // engine cannot update completion state without a recompute.

    pub(crate) fn record_section_visit(&mut self, module_id: ModuleId, section_id: SectionId) {
        self.completed_sections.insert(section_id.clone());
        self.location = Some(Location::Section {
            module_id,
            section_id,
        });
    }

    pub(crate) fn record_quiz_visit(&mut self, module_id: ModuleId, quiz_id: QuizId) {
        self.completed_quizzes.insert(quiz_id.clone());
        self.location = Some(Location::Quiz { module_id, quiz_id });
    }

    pub(crate) fn set_final_exam_completed(&mut self, completed: bool) {
        self.completed_final_exam = completed;
        self.location = None;
    }

    pub(crate) fn set_overall_progress(&mut self, progress: u8) {
        debug_assert!(progress <= 100);
        self.overall_progress = progress;
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed_at = now;
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn empty_ledger() -> ProgressLedger {
        ProgressLedger::new(LearnerId::new("l1"), CourseId::new("c1"), fixed_now())
    }

    #[test]
    fn new_ledger_is_empty() {
        let ledger = empty_ledger();
        assert!(ledger.completed_sections().is_empty());
        assert!(ledger.completed_quizzes().is_empty());
        assert!(!ledger.completed_final_exam());
        assert!(ledger.location().is_none());
        assert_eq!(ledger.overall_progress(), 0);
        assert!(!ledger.is_complete());
    }

    #[test]
    fn visiting_a_quiz_replaces_a_section_location() {
        let mut ledger = empty_ledger();
        ledger.record_section_visit(ModuleId::new("m1"), SectionId::new("s1"));
        ledger.record_quiz_visit(ModuleId::new("m1"), QuizId::new("q1"));

        assert_eq!(
            ledger.location(),
            Some(&Location::Quiz {
                module_id: ModuleId::new("m1"),
                quiz_id: QuizId::new("q1"),
            })
        );
        assert!(ledger.completed_sections().contains(&SectionId::new("s1")));
    }

    #[test]
    fn repeated_section_visits_dedup() {
        let mut ledger = empty_ledger();
        ledger.record_section_visit(ModuleId::new("m1"), SectionId::new("s1"));
        ledger.record_section_visit(ModuleId::new("m1"), SectionId::new("s1"));
        assert_eq!(ledger.completed_sections().len(), 1);
    }

    #[test]
    fn final_exam_completion_clears_location() {
        let mut ledger = empty_ledger();
        ledger.record_section_visit(ModuleId::new("m1"), SectionId::new("s1"));
        ledger.set_final_exam_completed(true);

        assert!(ledger.completed_final_exam());
        assert!(ledger.location().is_none());
    }

    #[test]
    fn from_persisted_rejects_out_of_range_progress() {
        let result = ProgressLedger::from_persisted(
            LearnerId::new("l1"),
            CourseId::new("c1"),
            BTreeSet::new(),
            BTreeSet::new(),
            false,
            None,
            101,
            fixed_now(),
        );

        assert_eq!(result.unwrap_err(), LedgerError::InvalidProgress(101));
    }
}
