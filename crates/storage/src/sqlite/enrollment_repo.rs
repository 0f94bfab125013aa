use course_core::model::{CourseId, Enrollment, LearnerId};

use super::{
    SqliteRepository,
    mapping::{map_enrollment_row, map_write_err},
};
use crate::repository::{EnrollmentRepository, StorageError};

fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl EnrollmentRepository for SqliteRepository {
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO enrollments (learner_id, course_id, status, enrolled_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(enrollment.learner_id().as_str())
        .bind(enrollment.course_id().as_str())
        .bind(enrollment.status().as_str())
        .bind(enrollment.enrolled_at())
        .bind(enrollment.completed_at())
        .execute(self.pool())
        .await
        .map_err(map_write_err)?;
        Ok(())
    }

    async fn get_enrollment(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT learner_id, course_id, status, enrolled_at, completed_at
            FROM enrollments
            WHERE learner_id = ?1 AND course_id = ?2
            ",
        )
        .bind(learner_id.as_str())
        .bind(course_id.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(conn)?;

        row.map(|r| map_enrollment_row(&r)).transpose()
    }

    async fn update_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        let result = sqlx::query(
            r"
            UPDATE enrollments SET
                status = ?3,
                completed_at = ?4
            WHERE learner_id = ?1 AND course_id = ?2
            ",
        )
        .bind(enrollment.learner_id().as_str())
        .bind(enrollment.course_id().as_str())
        .bind(enrollment.status().as_str())
        .bind(enrollment.completed_at())
        .execute(self.pool())
        .await
        .map_err(conn)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn enrollments_for_learner(
        &self,
        learner_id: &LearnerId,
    ) -> Result<Vec<Enrollment>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT learner_id, course_id, status, enrolled_at, completed_at
            FROM enrollments
            WHERE learner_id = ?1
            ORDER BY course_id
            ",
        )
        .bind(learner_id.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(conn)?;

        rows.iter().map(map_enrollment_row).collect()
    }

    async fn enrollments_for_course(
        &self,
        course_id: &CourseId,
    ) -> Result<Vec<Enrollment>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT learner_id, course_id, status, enrolled_at, completed_at
            FROM enrollments
            WHERE course_id = ?1
            ORDER BY learner_id
            ",
        )
        .bind(course_id.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(conn)?;

        rows.iter().map(map_enrollment_row).collect()
    }
}
