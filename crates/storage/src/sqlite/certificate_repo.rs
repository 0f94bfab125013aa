use course_core::model::{Certificate, CourseId, LearnerId};

use super::{
    SqliteRepository,
    mapping::{map_certificate_row, map_write_err},
};
use crate::repository::{CertificateRepository, StorageError};

fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl CertificateRepository for SqliteRepository {
    async fn insert_certificate(&self, certificate: &Certificate) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO certificates (id, learner_id, course_id, issued_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(certificate.id().to_string())
        .bind(certificate.learner_id().as_str())
        .bind(certificate.course_id().as_str())
        .bind(certificate.issued_at())
        .execute(self.pool())
        .await
        .map_err(map_write_err)?;
        Ok(())
    }

    async fn get_certificate(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<Option<Certificate>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, learner_id, course_id, issued_at
            FROM certificates
            WHERE learner_id = ?1 AND course_id = ?2
            ",
        )
        .bind(learner_id.as_str())
        .bind(course_id.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(conn)?;

        row.map(|r| map_certificate_row(&r)).transpose()
    }
}
