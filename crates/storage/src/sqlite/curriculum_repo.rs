use std::collections::HashMap;

use course_core::model::{CourseId, CurriculumSnapshot, ModuleId, ModuleOutline, QuizId, SectionId};
use sqlx::Row;

use super::{SqliteRepository, mapping::ser};
use crate::repository::{CurriculumRepository, StorageError};

fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl CurriculumRepository for SqliteRepository {
    async fn get_snapshot(
        &self,
        course_id: &CourseId,
    ) -> Result<Option<CurriculumSnapshot>, StorageError> {
        let course_row = sqlx::query("SELECT final_exam_id FROM courses WHERE id = ?1")
            .bind(course_id.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(conn)?;

        let Some(course_row) = course_row else {
            return Ok(None);
        };
        let final_exam = course_row
            .try_get::<Option<String>, _>("final_exam_id")
            .map_err(ser)?
            .map(QuizId::new);

        let module_rows = sqlx::query(
            r"
            SELECT id, quiz_id
            FROM modules
            WHERE course_id = ?1
            ORDER BY position
            ",
        )
        .bind(course_id.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(conn)?;

        let mut sections_by_module: HashMap<String, Vec<SectionId>> = HashMap::new();
        for row in sqlx::query(
            r"
            SELECT module_id, id
            FROM sections
            WHERE course_id = ?1
            ORDER BY position
            ",
        )
        .bind(course_id.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(conn)?
        {
            let module: String = row.try_get("module_id").map_err(ser)?;
            let section: String = row.try_get("id").map_err(ser)?;
            sections_by_module
                .entry(module)
                .or_default()
                .push(SectionId::new(section));
        }

        let mut modules = Vec::with_capacity(module_rows.len());
        for row in module_rows {
            let module_id: String = row.try_get("id").map_err(ser)?;
            let quiz = row
                .try_get::<Option<String>, _>("quiz_id")
                .map_err(ser)?
                .map(QuizId::new);
            let sections = sections_by_module.remove(&module_id).unwrap_or_default();
            modules.push(ModuleOutline::new(ModuleId::new(module_id), sections, quiz));
        }

        CurriculumSnapshot::new(modules, final_exam)
            .map(Some)
            .map_err(ser)
    }

    async fn put_snapshot(
        &self,
        course_id: &CourseId,
        snapshot: &CurriculumSnapshot,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool().begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO courses (id, final_exam_id)
            VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET final_exam_id = excluded.final_exam_id
            ",
        )
        .bind(course_id.as_str())
        .bind(snapshot.final_exam().map(|q| q.as_str().to_owned()))
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM sections WHERE course_id = ?1")
            .bind(course_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        sqlx::query("DELETE FROM modules WHERE course_id = ?1")
            .bind(course_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (module_pos, module) in snapshot.modules().iter().enumerate() {
            let module_pos = i64::try_from(module_pos)
                .map_err(|_| StorageError::Serialization("module position overflow".into()))?;
            sqlx::query(
                r"
                INSERT INTO modules (course_id, id, position, quiz_id)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(course_id.as_str())
            .bind(module.module_id().as_str())
            .bind(module_pos)
            .bind(module.quiz().map(|q| q.as_str().to_owned()))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

            for (section_pos, section) in module.sections().iter().enumerate() {
                let section_pos = i64::try_from(section_pos).map_err(|_| {
                    StorageError::Serialization("section position overflow".into())
                })?;
                sqlx::query(
                    r"
                    INSERT INTO sections (course_id, module_id, id, position)
                    VALUES (?1, ?2, ?3, ?4)
                    ",
                )
                .bind(course_id.as_str())
                .bind(module.module_id().as_str())
                .bind(section.as_str())
                .bind(section_pos)
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
            }
        }

        tx.commit().await.map_err(conn)
    }
}
