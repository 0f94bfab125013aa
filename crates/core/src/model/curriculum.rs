use std::collections::HashSet;

use thiserror::Error;

use crate::model::ids::{ModuleId, QuizId, SectionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CurriculumError {
    #[error("section {0} appears more than once in the curriculum")]
    DuplicateSection(SectionId),

    #[error("quiz {0} appears more than once in the curriculum")]
    DuplicateQuiz(QuizId),
}

//
// ─── MODULE OUTLINE ────────────────────────────────────────────────────────────
//

/// One module of a course: its ordered sections and an optional quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleOutline {
    module_id: ModuleId,
    sections: Vec<SectionId>,
    quiz: Option<QuizId>,
}

impl ModuleOutline {
    #[must_use]
    pub fn new(module_id: ModuleId, sections: Vec<SectionId>, quiz: Option<QuizId>) -> Self {
        Self {
            module_id,
            sections,
            quiz,
        }
    }

    #[must_use]
    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    #[must_use]
    pub fn sections(&self) -> &[SectionId] {
        &self.sections
    }

    #[must_use]
    pub fn quiz(&self) -> Option<&QuizId> {
        self.quiz.as_ref()
    }

    #[must_use]
    pub fn contains_section(&self, section_id: &SectionId) -> bool {
        self.sections.iter().any(|s| s == section_id)
    }

    #[must_use]
    pub fn has_quiz(&self, quiz_id: &QuizId) -> bool {
        self.quiz.as_ref() == Some(quiz_id)
    }
}

//
// ─── CURRICULUM SNAPSHOT ───────────────────────────────────────────────────────
//

/// Read-only view of a course's content at one point in time.
///
/// A snapshot is assembled in full by a loader before any progress
/// computation runs; the engine never fetches course content itself.
/// The curriculum may change over the life of an enrollment (modules
/// added or removed), so every aggregate recomputation takes the
/// current snapshot as input.
///
/// Invariant: section and quiz identifiers are unique across the whole
/// snapshot, the course-level final exam included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurriculumSnapshot {
    modules: Vec<ModuleOutline>,
    final_exam: Option<QuizId>,
}

impl CurriculumSnapshot {
    /// Build a snapshot, validating identifier uniqueness.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError::DuplicateSection` or `DuplicateQuiz` if
    /// an identifier appears more than once anywhere in the snapshot.
    pub fn new(
        modules: Vec<ModuleOutline>,
        final_exam: Option<QuizId>,
    ) -> Result<Self, CurriculumError> {
        let mut seen_sections: HashSet<&SectionId> = HashSet::new();
        let mut seen_quizzes: HashSet<&QuizId> = HashSet::new();

        for module in &modules {
            for section in &module.sections {
                if !seen_sections.insert(section) {
                    return Err(CurriculumError::DuplicateSection(section.clone()));
                }
            }
            if let Some(quiz) = &module.quiz {
                if !seen_quizzes.insert(quiz) {
                    return Err(CurriculumError::DuplicateQuiz(quiz.clone()));
                }
            }
        }

        if let Some(exam) = &final_exam {
            if seen_quizzes.contains(exam) {
                return Err(CurriculumError::DuplicateQuiz(exam.clone()));
            }
        }

        Ok(Self {
            modules,
            final_exam,
        })
    }

    /// A snapshot with no content at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            modules: Vec::new(),
            final_exam: None,
        }
    }

    #[must_use]
    pub fn modules(&self) -> &[ModuleOutline] {
        &self.modules
    }

    #[must_use]
    pub fn final_exam(&self) -> Option<&QuizId> {
        self.final_exam.as_ref()
    }

    #[must_use]
    pub fn module(&self, module_id: &ModuleId) -> Option<&ModuleOutline> {
        self.modules.iter().find(|m| &m.module_id == module_id)
    }

    /// Number of completable items: every section, every module quiz,
    /// plus the final exam when present.
    #[must_use]
    pub fn total_items(&self) -> usize {
        let sections: usize = self.modules.iter().map(|m| m.sections.len()).sum();
        let quizzes = self.modules.iter().filter(|m| m.quiz.is_some()).count();
        sections + quizzes + usize::from(self.final_exam.is_some())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_items() == 0
    }

    /// True if any module in the snapshot still contains this section.
    #[must_use]
    pub fn contains_section(&self, section_id: &SectionId) -> bool {
        self.modules.iter().any(|m| m.contains_section(section_id))
    }

    /// True if this quiz is still a module quiz in the snapshot.
    ///
    /// The final exam is tracked separately on the ledger and is not
    /// part of this lookup.
    #[must_use]
    pub fn contains_quiz(&self, quiz_id: &QuizId) -> bool {
        self.modules.iter().any(|m| m.has_quiz(quiz_id))
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
