use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs versioned migrations for the current schema.
///
/// Version 1 creates the lesson catalog, progress documents, and raw quiz
/// answers. Auxiliary progress fields are stored as JSON text.
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

    // Version 1: catalog + progress.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS lesson_blocks (
                    id TEXT PRIMARY KEY,
                    lesson_id TEXT NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    kind TEXT NOT NULL,
                    content TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_lesson_blocks_lesson_position
                    ON lesson_blocks (lesson_id, position);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS quest_progress (
                    learner_id TEXT NOT NULL,
                    lesson_id TEXT NOT NULL,
                    revision INTEGER NOT NULL CHECK (revision >= 0),
                    current_step_index INTEGER NOT NULL CHECK (current_step_index >= 0),
                    completed_block_ids TEXT NOT NULL,
                    role TEXT,
                    video_progress TEXT NOT NULL,
                    table_state TEXT NOT NULL,
                    form_state TEXT NOT NULL,
                    completed_at TEXT,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (learner_id, lesson_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS quest_quiz_answers (
                    learner_id TEXT NOT NULL,
                    lesson_id TEXT NOT NULL,
                    block_id TEXT NOT NULL,
                    answers TEXT NOT NULL,
                    recorded_at TEXT NOT NULL,
                    PRIMARY KEY (learner_id, lesson_id, block_id)
                );
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
