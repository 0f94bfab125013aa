//! Pure progress computation: applies one event to a ledger against a
//! curriculum snapshot and recomputes the aggregate percentage.
//!
//! Nothing here performs I/O. Loading the snapshot and persisting the
//! returned ledger are the caller's responsibility, which keeps event
//! application a plain function of its inputs and safe to run on
//! independent copies concurrently.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{CurriculumSnapshot, ModuleId, ProgressLedger, QuizId, SectionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Rejection of an event that references content missing from the
/// current curriculum snapshot.
///
/// Always recoverable: the caller refetches the curriculum and re-issues
/// a correct event. The ledger is never mutated on rejection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineError {
    #[error("module {0} is not part of the current curriculum")]
    UnknownModule(ModuleId),

    #[error("module {module_id} has no section {section_id}")]
    SectionNotInModule {
        module_id: ModuleId,
        section_id: SectionId,
    },

    #[error("module {module_id} has no quiz {quiz_id}")]
    QuizNotInModule {
        module_id: ModuleId,
        quiz_id: QuizId,
    },
}

//
// ─── EVENTS ────────────────────────────────────────────────────────────────────
//

/// One learner action reported against a course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The learner viewed a section; viewing marks it complete.
    VisitSection {
        module_id: ModuleId,
        section_id: SectionId,
    },
    /// The learner finished a module quiz.
    VisitQuiz {
        module_id: ModuleId,
        quiz_id: QuizId,
    },
    /// Final-exam completion flag. `false` is an administrative reset,
    /// never produced by normal client flows.
    SetFinalExamCompleted(bool),
}

/// Updated ledger plus the completion signal for the enrollment
/// coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventOutcome {
    pub ledger: ProgressLedger,
    /// True iff the resulting aggregate is 100.
    pub completed: bool,
}

//
// ─── EVENT APPLICATION ─────────────────────────────────────────────────────────
//

/// Apply one event and recompute the aggregate.
///
/// Validation happens before any mutation and the input ledger is only
/// read, so a rejected event leaves the caller's state untouched. On
/// success the returned ledger always carries a freshly recomputed
/// `overall_progress` and `last_accessed_at == now`, even when the event
/// was a no-op on the completed-item sets.
///
/// # Errors
///
/// Returns `EngineError` when the event references a module, section, or
/// quiz absent from the snapshot.
pub fn apply_event(
    ledger: &ProgressLedger,
    snapshot: &CurriculumSnapshot,
    event: &ProgressEvent,
    now: DateTime<Utc>,
) -> Result<EventOutcome, EngineError> {
    match event {
        ProgressEvent::VisitSection {
            module_id,
            section_id,
        } => {
            let module = snapshot
                .module(module_id)
                .ok_or_else(|| EngineError::UnknownModule(module_id.clone()))?;
            if !module.contains_section(section_id) {
                return Err(EngineError::SectionNotInModule {
                    module_id: module_id.clone(),
                    section_id: section_id.clone(),
                });
            }
        }
        ProgressEvent::VisitQuiz { module_id, quiz_id } => {
            let module = snapshot
                .module(module_id)
                .ok_or_else(|| EngineError::UnknownModule(module_id.clone()))?;
            if !module.has_quiz(quiz_id) {
                return Err(EngineError::QuizNotInModule {
                    module_id: module_id.clone(),
                    quiz_id: quiz_id.clone(),
                });
            }
        }
        // The flag is accepted even when the snapshot carries no final
        // exam; the aggregate only ever counts an exam the snapshot has.
        ProgressEvent::SetFinalExamCompleted(_) => {}
    }

    let mut next = ledger.clone();
    match event {
        ProgressEvent::VisitSection {
            module_id,
            section_id,
        } => next.record_section_visit(module_id.clone(), section_id.clone()),
        ProgressEvent::VisitQuiz { module_id, quiz_id } => {
            next.record_quiz_visit(module_id.clone(), quiz_id.clone());
        }
        ProgressEvent::SetFinalExamCompleted(completed) => {
            next.set_final_exam_completed(*completed);
        }
    }

    next.set_overall_progress(recompute_aggregate(&next, snapshot));
    next.touch(now);

    let completed = next.is_complete();
    Ok(EventOutcome {
        ledger: next,
        completed,
    })
}

/// Recompute the aggregate percentage from the ledger and the current
/// snapshot.
///
/// Completed items are intersected with the snapshot rather than counted
/// raw: the curriculum can shrink after a learner recorded an item
/// complete, and stale ids must neither inflate the percentage past 100
/// nor keep contributing once removed. A snapshot with no items yields 0
/// (a course with no content cannot be completed).
///
/// Rounding is half-up, so with three items one completion reads 33 and
/// two read 67.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn recompute_aggregate(ledger: &ProgressLedger, snapshot: &CurriculumSnapshot) -> u8 {
    let total = snapshot.total_items();
    if total == 0 {
        return 0;
    }

    let mut completed = ledger
        .completed_sections()
        .iter()
        .filter(|s| snapshot.contains_section(s))
        .count();
    completed += ledger
        .completed_quizzes()
        .iter()
        .filter(|q| snapshot.contains_quiz(q))
        .count();
    if ledger.completed_final_exam() && snapshot.final_exam().is_some() {
        completed += 1;
    }

    let percentage = (completed as f64 * 100.0 / total as f64).round();
    percentage.clamp(0.0, 100.0) as u8
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CourseId, LearnerId, Location, ModuleOutline};
    use crate::time::fixed_now;
    use chrono::Duration;

    fn module_id(id: &str) -> ModuleId {
        ModuleId::new(id)
    }

    fn section_id(id: &str) -> SectionId {
        SectionId::new(id)
    }

    fn quiz_id(id: &str) -> QuizId {
        QuizId::new(id)
    }

    fn empty_ledger() -> ProgressLedger {
        ProgressLedger::new(LearnerId::new("l1"), CourseId::new("c1"), fixed_now())
    }

    fn visit_section(module: &str, section: &str) -> ProgressEvent {
        ProgressEvent::VisitSection {
            module_id: module_id(module),
            section_id: section_id(section),
        }
    }

    fn visit_quiz(module: &str, quiz: &str) -> ProgressEvent {
        ProgressEvent::VisitQuiz {
            module_id: module_id(module),
            quiz_id: quiz_id(quiz),
        }
    }

    /// Two modules: m1 with s1, s2 and quiz q1; m2 with s3. Final exam.
    /// Six completable items in total.
    fn course_snapshot() -> CurriculumSnapshot {
        CurriculumSnapshot::new(
            vec![
                ModuleOutline::new(
                    module_id("m1"),
                    vec![section_id("s1"), section_id("s2")],
                    Some(quiz_id("q1")),
                ),
                ModuleOutline::new(module_id("m2"), vec![section_id("s3")], None),
            ],
            Some(quiz_id("final")),
        )
        .unwrap()
    }

    /// One module with two sections and a quiz: three items, no exam.
    fn three_item_snapshot() -> CurriculumSnapshot {
        CurriculumSnapshot::new(
            vec![ModuleOutline::new(
                module_id("m1"),
                vec![section_id("s1"), section_id("s2")],
                Some(quiz_id("q1")),
            )],
            None,
        )
        .unwrap()
    }

    #[test]
    fn visit_section_marks_complete_and_sets_location() {
        let snapshot = course_snapshot();
        let outcome =
            apply_event(&empty_ledger(), &snapshot, &visit_section("m1", "s1"), fixed_now())
                .unwrap();

        assert!(outcome.ledger.completed_sections().contains(&section_id("s1")));
        assert_eq!(
            outcome.ledger.location(),
            Some(&Location::Section {
                module_id: module_id("m1"),
                section_id: section_id("s1"),
            })
        );
        assert_eq!(outcome.ledger.overall_progress(), 17); // 1 of 6, half-up
        assert!(!outcome.completed);
    }

    #[test]
    fn visit_quiz_replaces_section_location() {
        let snapshot = course_snapshot();
        let now = fixed_now();
        let first = apply_event(&empty_ledger(), &snapshot, &visit_section("m1", "s1"), now)
            .unwrap()
            .ledger;
        let second = apply_event(&first, &snapshot, &visit_quiz("m1", "q1"), now)
            .unwrap()
            .ledger;

        assert_eq!(
            second.location(),
            Some(&Location::Quiz {
                module_id: module_id("m1"),
                quiz_id: quiz_id("q1"),
            })
        );
    }

    #[test]
    fn progress_is_monotonic_under_visit_events() {
        let snapshot = course_snapshot();
        let events = [
            visit_section("m1", "s1"),
            visit_section("m1", "s1"), // revisit
            visit_quiz("m1", "q1"),
            visit_section("m2", "s3"),
            visit_section("m1", "s2"),
            ProgressEvent::SetFinalExamCompleted(true),
        ];

        let mut ledger = empty_ledger();
        let mut last = 0;
        for event in &events {
            ledger = apply_event(&ledger, &snapshot, event, fixed_now())
                .unwrap()
                .ledger;
            assert!(ledger.overall_progress() >= last);
            last = ledger.overall_progress();
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn reapplying_an_event_only_advances_last_accessed_at() {
        let snapshot = course_snapshot();
        let now = fixed_now();
        let later = now + Duration::minutes(5);
        let event = visit_section("m1", "s1");

        let once = apply_event(&empty_ledger(), &snapshot, &event, now).unwrap().ledger;
        let twice = apply_event(&once, &snapshot, &event, later).unwrap().ledger;

        assert_eq!(twice.last_accessed_at(), later);
        let mut expected = once.clone();
        expected.touch(later);
        assert_eq!(twice, expected);
    }

    #[test]
    fn shrunken_snapshot_drops_stale_completions() {
        let snapshot = three_item_snapshot();
        let now = fixed_now();
        let mut ledger = empty_ledger();
        for event in [
            visit_section("m1", "s1"),
            visit_section("m1", "s2"),
            visit_quiz("m1", "q1"),
        ] {
            ledger = apply_event(&ledger, &snapshot, &event, now).unwrap().ledger;
        }
        assert_eq!(ledger.overall_progress(), 100);

        // The instructor removes s2; the completed item stops counting.
        let shrunk = CurriculumSnapshot::new(
            vec![ModuleOutline::new(
                module_id("m1"),
                vec![section_id("s1")],
                Some(quiz_id("q1")),
            )],
            None,
        )
        .unwrap();

        assert_eq!(recompute_aggregate(&ledger, &shrunk), 100);
        let outcome = apply_event(&ledger, &shrunk, &visit_section("m1", "s1"), now).unwrap();
        assert_eq!(outcome.ledger.overall_progress(), 100);
        assert!(outcome.ledger.overall_progress() <= 100);
    }

    #[test]
    fn rounding_is_half_up_over_three_items() {
        let snapshot = three_item_snapshot();
        let now = fixed_now();
        let mut ledger = empty_ledger();

        ledger = apply_event(&ledger, &snapshot, &visit_section("m1", "s1"), now)
            .unwrap()
            .ledger;
        assert_eq!(ledger.overall_progress(), 33);

        ledger = apply_event(&ledger, &snapshot, &visit_section("m1", "s2"), now)
            .unwrap()
            .ledger;
        assert_eq!(ledger.overall_progress(), 67);

        ledger = apply_event(&ledger, &snapshot, &visit_quiz("m1", "q1"), now)
            .unwrap()
            .ledger;
        assert_eq!(ledger.overall_progress(), 100);
    }

    #[test]
    fn empty_curriculum_stays_at_zero() {
        let ledger = empty_ledger();
        assert_eq!(recompute_aggregate(&ledger, &CurriculumSnapshot::empty()), 0);

        let outcome = apply_event(
            &ledger,
            &CurriculumSnapshot::empty(),
            &ProgressEvent::SetFinalExamCompleted(true),
            fixed_now(),
        )
        .unwrap();
        assert_eq!(outcome.ledger.overall_progress(), 0);
        assert!(!outcome.completed);
    }

    #[test]
    fn unknown_references_leave_the_ledger_unchanged() {
        let snapshot = course_snapshot();
        let ledger = apply_event(
            &empty_ledger(),
            &snapshot,
            &visit_section("m1", "s1"),
            fixed_now(),
        )
        .unwrap()
        .ledger;
        let before = ledger.clone();

        let err = apply_event(&ledger, &snapshot, &visit_section("m1", "does-not-exist"), fixed_now())
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::SectionNotInModule {
                module_id: module_id("m1"),
                section_id: section_id("does-not-exist"),
            }
        );
        assert_eq!(ledger, before);

        let err = apply_event(&ledger, &snapshot, &visit_section("nope", "s1"), fixed_now())
            .unwrap_err();
        assert_eq!(err, EngineError::UnknownModule(module_id("nope")));

        // s3 exists, but in m2
        let err = apply_event(&ledger, &snapshot, &visit_section("m1", "s3"), fixed_now())
            .unwrap_err();
        assert!(matches!(err, EngineError::SectionNotInModule { .. }));

        let err = apply_event(&ledger, &snapshot, &visit_quiz("m2", "q1"), fixed_now())
            .unwrap_err();
        assert!(matches!(err, EngineError::QuizNotInModule { .. }));

        assert_eq!(ledger, before);
    }

    #[test]
    fn final_exam_only_course_completes_in_one_event() {
        let snapshot = CurriculumSnapshot::new(vec![], Some(quiz_id("final"))).unwrap();
        assert_eq!(snapshot.total_items(), 1);

        let outcome = apply_event(
            &empty_ledger(),
            &snapshot,
            &ProgressEvent::SetFinalExamCompleted(true),
            fixed_now(),
        )
        .unwrap();

        assert_eq!(outcome.ledger.overall_progress(), 100);
        assert!(outcome.completed);
        assert!(outcome.ledger.location().is_none());
    }

    #[test]
    fn final_exam_reset_lowers_the_aggregate() {
        let snapshot = CurriculumSnapshot::new(vec![], Some(quiz_id("final"))).unwrap();
        let now = fixed_now();
        let done = apply_event(
            &empty_ledger(),
            &snapshot,
            &ProgressEvent::SetFinalExamCompleted(true),
            now,
        )
        .unwrap()
        .ledger;

        let outcome = apply_event(
            &done,
            &snapshot,
            &ProgressEvent::SetFinalExamCompleted(false),
            now,
        )
        .unwrap();
        assert_eq!(outcome.ledger.overall_progress(), 0);
        assert!(!outcome.completed);
    }

    #[test]
    fn final_exam_flag_without_an_exam_never_counts() {
        let snapshot = three_item_snapshot();
        let outcome = apply_event(
            &empty_ledger(),
            &snapshot,
            &ProgressEvent::SetFinalExamCompleted(true),
            fixed_now(),
        )
        .unwrap();

        assert!(outcome.ledger.completed_final_exam());
        assert_eq!(outcome.ledger.overall_progress(), 0);
    }
}
