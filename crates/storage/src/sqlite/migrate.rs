use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema (curriculum tables, enrollments, progress
/// ledgers with their completed-item sets, certificates, and indexes).
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS courses (
                    id TEXT PRIMARY KEY,
                    final_exam_id TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS modules (
                    course_id TEXT NOT NULL,
                    id TEXT NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    quiz_id TEXT,
                    PRIMARY KEY (course_id, id),
                    FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS sections (
                    course_id TEXT NOT NULL,
                    module_id TEXT NOT NULL,
                    id TEXT NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    PRIMARY KEY (course_id, id),
                    FOREIGN KEY (course_id, module_id) REFERENCES modules(course_id, id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS enrollments (
                    learner_id TEXT NOT NULL,
                    course_id TEXT NOT NULL,
                    status TEXT NOT NULL CHECK (status IN ('active', 'completed', 'cancelled')),
                    enrolled_at TEXT NOT NULL,
                    completed_at TEXT,
                    PRIMARY KEY (learner_id, course_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS progress_ledgers (
                    learner_id TEXT NOT NULL,
                    course_id TEXT NOT NULL,
                    completed_final_exam INTEGER NOT NULL CHECK (completed_final_exam IN (0, 1)),
                    location_kind TEXT NOT NULL CHECK (location_kind IN ('none', 'section', 'quiz')),
                    location_module_id TEXT,
                    location_item_id TEXT,
                    overall_progress INTEGER NOT NULL CHECK (overall_progress BETWEEN 0 AND 100),
                    last_accessed_at TEXT NOT NULL,
                    version INTEGER NOT NULL CHECK (version >= 1),
                    PRIMARY KEY (learner_id, course_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS ledger_sections (
                    learner_id TEXT NOT NULL,
                    course_id TEXT NOT NULL,
                    section_id TEXT NOT NULL,
                    PRIMARY KEY (learner_id, course_id, section_id),
                    FOREIGN KEY (learner_id, course_id)
                        REFERENCES progress_ledgers(learner_id, course_id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS ledger_quizzes (
                    learner_id TEXT NOT NULL,
                    course_id TEXT NOT NULL,
                    quiz_id TEXT NOT NULL,
                    PRIMARY KEY (learner_id, course_id, quiz_id),
                    FOREIGN KEY (learner_id, course_id)
                        REFERENCES progress_ledgers(learner_id, course_id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS certificates (
                    id TEXT PRIMARY KEY,
                    learner_id TEXT NOT NULL,
                    course_id TEXT NOT NULL,
                    issued_at TEXT NOT NULL,
                    UNIQUE (learner_id, course_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_enrollments_course
                    ON enrollments (course_id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_progress_ledgers_course
                    ON progress_ledgers (course_id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_sections_course_module
                    ON sections (course_id, module_id, position);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
