use std::collections::BTreeSet;

use course_core::model::{
    Certificate, CertificateId, CourseId, Enrollment, EnrollmentStatus, LearnerId, Location,
    ModuleId, ProgressLedger, QuizId, SectionId,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn parse_status(s: &str) -> Result<EnrollmentStatus, StorageError> {
    match s {
        "active" => Ok(EnrollmentStatus::Active),
        "completed" => Ok(EnrollmentStatus::Completed),
        "cancelled" => Ok(EnrollmentStatus::Cancelled),
        _ => Err(StorageError::Serialization(format!("invalid status: {s}"))),
    }
}

pub(crate) fn map_enrollment_row(row: &sqlx::sqlite::SqliteRow) -> Result<Enrollment, StorageError> {
    let status_str: String = row.try_get("status").map_err(ser)?;
    Enrollment::from_persisted(
        LearnerId::new(row.try_get::<String, _>("learner_id").map_err(ser)?),
        CourseId::new(row.try_get::<String, _>("course_id").map_err(ser)?),
        parse_status(status_str.as_str())?,
        row.try_get("enrolled_at").map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
    )
    .map_err(ser)
}

/// Split a `Location` into the three ledger columns.
pub(crate) fn location_columns(
    location: Option<&Location>,
) -> (&'static str, Option<String>, Option<String>) {
    match location {
        None => ("none", None, None),
        Some(Location::Section {
            module_id,
            section_id,
        }) => (
            "section",
            Some(module_id.as_str().to_owned()),
            Some(section_id.as_str().to_owned()),
        ),
        Some(Location::Quiz { module_id, quiz_id }) => (
            "quiz",
            Some(module_id.as_str().to_owned()),
            Some(quiz_id.as_str().to_owned()),
        ),
    }
}

fn parse_location(
    kind: &str,
    module_id: Option<String>,
    item_id: Option<String>,
) -> Result<Option<Location>, StorageError> {
    match kind {
        "none" => Ok(None),
        "section" | "quiz" => {
            let module_id = module_id.ok_or_else(|| {
                StorageError::Serialization("location is missing its module id".into())
            })?;
            let item_id = item_id.ok_or_else(|| {
                StorageError::Serialization("location is missing its item id".into())
            })?;
            let module_id = ModuleId::new(module_id);
            Ok(Some(if kind == "section" {
                Location::Section {
                    module_id,
                    section_id: SectionId::new(item_id),
                }
            } else {
                Location::Quiz {
                    module_id,
                    quiz_id: QuizId::new(item_id),
                }
            }))
        }
        _ => Err(StorageError::Serialization(format!(
            "invalid location kind: {kind}"
        ))),
    }
}

pub(crate) fn map_ledger_row(
    row: &sqlx::sqlite::SqliteRow,
    completed_sections: BTreeSet<SectionId>,
    completed_quizzes: BTreeSet<QuizId>,
) -> Result<ProgressLedger, StorageError> {
    let location_kind: String = row.try_get("location_kind").map_err(ser)?;
    let location = parse_location(
        location_kind.as_str(),
        row.try_get("location_module_id").map_err(ser)?,
        row.try_get("location_item_id").map_err(ser)?,
    )?;

    let progress_i64: i64 = row.try_get("overall_progress").map_err(ser)?;
    let overall_progress = u8::try_from(progress_i64).map_err(|_| {
        StorageError::Serialization(format!("invalid overall_progress: {progress_i64}"))
    })?;

    ProgressLedger::from_persisted(
        LearnerId::new(row.try_get::<String, _>("learner_id").map_err(ser)?),
        CourseId::new(row.try_get::<String, _>("course_id").map_err(ser)?),
        completed_sections,
        completed_quizzes,
        row.try_get::<bool, _>("completed_final_exam").map_err(ser)?,
        location,
        overall_progress,
        row.try_get("last_accessed_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_certificate_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<Certificate, StorageError> {
    let id_str: String = row.try_get("id").map_err(ser)?;
    let id: CertificateId = id_str.parse().map_err(ser)?;
    Ok(Certificate::from_persisted(
        id,
        LearnerId::new(row.try_get::<String, _>("learner_id").map_err(ser)?),
        CourseId::new(row.try_get::<String, _>("course_id").map_err(ser)?),
        row.try_get("issued_at").map_err(ser)?,
    ))
}

/// Maps unique-constraint violations to `Conflict`, everything else to
/// `Connection`.
pub(crate) fn map_write_err(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        _ => StorageError::Connection(e.to_string()),
    }
}
