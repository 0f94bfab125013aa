use std::collections::{BTreeSet, HashMap};

use course_core::model::{CourseId, LearnerId, ProgressLedger, QuizId, SectionId};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{location_columns, map_ledger_row, map_write_err, ser},
};
use crate::repository::{LedgerRepository, StorageError, VersionedLedger};

fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

async fn replace_item_sets(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    ledger: &ProgressLedger,
) -> Result<(), StorageError> {
    sqlx::query("DELETE FROM ledger_sections WHERE learner_id = ?1 AND course_id = ?2")
        .bind(ledger.learner_id().as_str())
        .bind(ledger.course_id().as_str())
        .execute(&mut **tx)
        .await
        .map_err(conn)?;
    sqlx::query("DELETE FROM ledger_quizzes WHERE learner_id = ?1 AND course_id = ?2")
        .bind(ledger.learner_id().as_str())
        .bind(ledger.course_id().as_str())
        .execute(&mut **tx)
        .await
        .map_err(conn)?;

    for section_id in ledger.completed_sections() {
        sqlx::query(
            "INSERT INTO ledger_sections (learner_id, course_id, section_id) VALUES (?1, ?2, ?3)",
        )
        .bind(ledger.learner_id().as_str())
        .bind(ledger.course_id().as_str())
        .bind(section_id.as_str())
        .execute(&mut **tx)
        .await
        .map_err(conn)?;
    }
    for quiz_id in ledger.completed_quizzes() {
        sqlx::query(
            "INSERT INTO ledger_quizzes (learner_id, course_id, quiz_id) VALUES (?1, ?2, ?3)",
        )
        .bind(ledger.learner_id().as_str())
        .bind(ledger.course_id().as_str())
        .bind(quiz_id.as_str())
        .execute(&mut **tx)
        .await
        .map_err(conn)?;
    }

    Ok(())
}

#[async_trait::async_trait]
impl LedgerRepository for SqliteRepository {
    async fn insert_ledger(&self, ledger: &ProgressLedger) -> Result<(), StorageError> {
        let (kind, loc_module, loc_item) = location_columns(ledger.location());

        let mut tx = self.pool().begin().await.map_err(conn)?;
        sqlx::query(
            r"
            INSERT INTO progress_ledgers (
                learner_id, course_id, completed_final_exam,
                location_kind, location_module_id, location_item_id,
                overall_progress, last_accessed_at, version
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1)
            ",
        )
        .bind(ledger.learner_id().as_str())
        .bind(ledger.course_id().as_str())
        .bind(ledger.completed_final_exam())
        .bind(kind)
        .bind(loc_module)
        .bind(loc_item)
        .bind(i64::from(ledger.overall_progress()))
        .bind(ledger.last_accessed_at())
        .execute(&mut *tx)
        .await
        .map_err(map_write_err)?;

        replace_item_sets(&mut tx, ledger).await?;
        tx.commit().await.map_err(conn)
    }

    async fn get_ledger(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<Option<VersionedLedger>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                learner_id, course_id, completed_final_exam, location_kind,
                location_module_id, location_item_id, overall_progress,
                last_accessed_at, version
            FROM progress_ledgers
            WHERE learner_id = ?1 AND course_id = ?2
            ",
        )
        .bind(learner_id.as_str())
        .bind(course_id.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let sections: BTreeSet<SectionId> = sqlx::query(
            "SELECT section_id FROM ledger_sections WHERE learner_id = ?1 AND course_id = ?2",
        )
        .bind(learner_id.as_str())
        .bind(course_id.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(conn)?
        .into_iter()
        .map(|r| {
            r.try_get::<String, _>("section_id")
                .map(SectionId::new)
                .map_err(ser)
        })
        .collect::<Result<_, _>>()?;

        let quizzes: BTreeSet<QuizId> = sqlx::query(
            "SELECT quiz_id FROM ledger_quizzes WHERE learner_id = ?1 AND course_id = ?2",
        )
        .bind(learner_id.as_str())
        .bind(course_id.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(conn)?
        .into_iter()
        .map(|r| {
            r.try_get::<String, _>("quiz_id")
                .map(QuizId::new)
                .map_err(ser)
        })
        .collect::<Result<_, _>>()?;

        let version: i64 = row.try_get("version").map_err(ser)?;
        Ok(Some(VersionedLedger {
            ledger: map_ledger_row(&row, sections, quizzes)?,
            version,
        }))
    }

    async fn update_ledger(
        &self,
        ledger: &ProgressLedger,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        let (kind, loc_module, loc_item) = location_columns(ledger.location());

        let mut tx = self.pool().begin().await.map_err(conn)?;
        let result = sqlx::query(
            r"
            UPDATE progress_ledgers SET
                completed_final_exam = ?3,
                location_kind = ?4,
                location_module_id = ?5,
                location_item_id = ?6,
                overall_progress = ?7,
                last_accessed_at = ?8,
                version = version + 1
            WHERE learner_id = ?1 AND course_id = ?2 AND version = ?9
            ",
        )
        .bind(ledger.learner_id().as_str())
        .bind(ledger.course_id().as_str())
        .bind(ledger.completed_final_exam())
        .bind(kind)
        .bind(loc_module)
        .bind(loc_item)
        .bind(i64::from(ledger.overall_progress()))
        .bind(ledger.last_accessed_at())
        .bind(expected_version)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        if result.rows_affected() == 0 {
            // distinguish a lost race from a ledger that never existed
            let exists = sqlx::query(
                "SELECT 1 FROM progress_ledgers WHERE learner_id = ?1 AND course_id = ?2",
            )
            .bind(ledger.learner_id().as_str())
            .bind(ledger.course_id().as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?;
            return Err(if exists.is_some() {
                StorageError::Conflict
            } else {
                StorageError::NotFound
            });
        }

        replace_item_sets(&mut tx, ledger).await?;
        tx.commit().await.map_err(conn)?;
        Ok(expected_version + 1)
    }

    async fn ledgers_for_course(
        &self,
        course_id: &CourseId,
    ) -> Result<Vec<ProgressLedger>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                learner_id, course_id, completed_final_exam, location_kind,
                location_module_id, location_item_id, overall_progress,
                last_accessed_at, version
            FROM progress_ledgers
            WHERE course_id = ?1
            ORDER BY learner_id
            ",
        )
        .bind(course_id.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(conn)?;

        let mut sections_by_learner: HashMap<String, BTreeSet<SectionId>> = HashMap::new();
        for row in sqlx::query(
            "SELECT learner_id, section_id FROM ledger_sections WHERE course_id = ?1",
        )
        .bind(course_id.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(conn)?
        {
            let learner: String = row.try_get("learner_id").map_err(ser)?;
            let section: String = row.try_get("section_id").map_err(ser)?;
            sections_by_learner
                .entry(learner)
                .or_default()
                .insert(SectionId::new(section));
        }

        let mut quizzes_by_learner: HashMap<String, BTreeSet<QuizId>> = HashMap::new();
        for row in
            sqlx::query("SELECT learner_id, quiz_id FROM ledger_quizzes WHERE course_id = ?1")
                .bind(course_id.as_str())
                .fetch_all(self.pool())
                .await
                .map_err(conn)?
        {
            let learner: String = row.try_get("learner_id").map_err(ser)?;
            let quiz: String = row.try_get("quiz_id").map_err(ser)?;
            quizzes_by_learner
                .entry(learner)
                .or_default()
                .insert(QuizId::new(quiz));
        }

        let mut ledgers = Vec::with_capacity(rows.len());
        for row in rows {
            let learner: String = row.try_get("learner_id").map_err(ser)?;
            let sections = sections_by_learner.remove(&learner).unwrap_or_default();
            let quizzes = quizzes_by_learner.remove(&learner).unwrap_or_default();
            ledgers.push(map_ledger_row(&row, sections, quizzes)?);
        }
        Ok(ledgers)
    }
}
