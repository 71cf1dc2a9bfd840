use async_trait::async_trait;
use chrono::Utc;
use quest_core::ResetScope;
use quest_core::model::{BlockId, LearnerId, LessonId, ProgressPatch, ProgressState};
use quest_core::quiz::QuizAnswers;
use sqlx::{Row, SqliteConnection};

use super::SqliteRepository;
use super::mapping::{from_json, index_to_i64, map_progress_row, revision_to_i64, ser, to_json};
use crate::repository::{ProgressStore, StorageError};

fn conn_err<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

async fn fetch_progress(
    conn: &mut SqliteConnection,
    learner: LearnerId,
    lesson: LessonId,
) -> Result<Option<ProgressState>, StorageError> {
    let row = sqlx::query(
        r"
        SELECT
            revision, current_step_index, completed_block_ids, role,
            video_progress, table_state, form_state, completed_at
        FROM quest_progress
        WHERE learner_id = ?1 AND lesson_id = ?2
        ",
    )
    .bind(learner.to_string())
    .bind(lesson.to_string())
    .fetch_optional(&mut *conn)
    .await
    .map_err(conn_err)?;

    row.as_ref().map(map_progress_row).transpose()
}

async fn write_progress(
    conn: &mut SqliteConnection,
    learner: LearnerId,
    lesson: LessonId,
    state: &ProgressState,
) -> Result<(), StorageError> {
    sqlx::query(
        r"
        INSERT INTO quest_progress (
            learner_id, lesson_id, revision, current_step_index, completed_block_ids,
            role, video_progress, table_state, form_state, completed_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(learner_id, lesson_id) DO UPDATE SET
            revision = excluded.revision,
            current_step_index = excluded.current_step_index,
            completed_block_ids = excluded.completed_block_ids,
            role = excluded.role,
            video_progress = excluded.video_progress,
            table_state = excluded.table_state,
            form_state = excluded.form_state,
            completed_at = excluded.completed_at,
            updated_at = excluded.updated_at
        ",
    )
    .bind(learner.to_string())
    .bind(lesson.to_string())
    .bind(revision_to_i64(state.revision())?)
    .bind(index_to_i64("current_step_index", state.current_step_index())?)
    .bind(to_json("completed_block_ids", state.completed_block_ids())?)
    .bind(state.role())
    .bind(to_json("video_progress", state.video_progress_map())?)
    .bind(to_json("table_state", state.table())?)
    .bind(to_json("form_state", state.form())?)
    .bind(state.completed_at())
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .map_err(conn_err)?;

    Ok(())
}

#[async_trait]
impl ProgressStore for SqliteRepository {
    async fn load(
        &self,
        learner: LearnerId,
        lesson: LessonId,
    ) -> Result<Option<ProgressState>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(conn_err)?;
        fetch_progress(&mut conn, learner, lesson).await
    }

    async fn merge(
        &self,
        learner: LearnerId,
        lesson: LessonId,
        patch: &ProgressPatch,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn_err)?;

        let mut state = fetch_progress(&mut tx, learner, lesson)
            .await?
            .unwrap_or_default();
        if let Err(err) = state.apply_patch(patch.clone()) {
            tracing::warn!(%learner, %lesson, %err, "rejecting stale progress write");
            return Err(err.into());
        }
        write_progress(&mut tx, learner, lesson, &state).await?;

        tx.commit().await.map_err(conn_err)?;
        tracing::debug!(%learner, %lesson, revision = patch.revision, "progress merged");
        Ok(())
    }

    async fn reset_block(
        &self,
        learner: LearnerId,
        lesson: LessonId,
        block: BlockId,
        scope: ResetScope,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn_err)?;

        if scope == ResetScope::RoleQuiz {
            sqlx::query(
                r"
                DELETE FROM quest_quiz_answers
                WHERE learner_id = ?1 AND lesson_id = ?2 AND block_id = ?3
                ",
            )
            .bind(learner.to_string())
            .bind(lesson.to_string())
            .bind(block.to_string())
            .execute(&mut *tx)
            .await
            .map_err(conn_err)?;
        }

        if let Some(mut state) = fetch_progress(&mut tx, learner, lesson).await? {
            state.clear_block(block, scope);
            state.set_revision(state.revision() + 1);
            write_progress(&mut tx, learner, lesson, &state).await?;
        }

        tx.commit().await.map_err(conn_err)?;
        tracing::debug!(%learner, %lesson, %block, %scope, "block reset in store");
        Ok(())
    }

    async fn record_quiz_answers(
        &self,
        learner: LearnerId,
        lesson: LessonId,
        block: BlockId,
        answers: &QuizAnswers,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO quest_quiz_answers (learner_id, lesson_id, block_id, answers, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(learner_id, lesson_id, block_id) DO UPDATE SET
                answers = excluded.answers,
                recorded_at = excluded.recorded_at
            ",
        )
        .bind(learner.to_string())
        .bind(lesson.to_string())
        .bind(block.to_string())
        .bind(to_json("answers", answers)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn_err)?;

        Ok(())
    }

    async fn quiz_answers(
        &self,
        learner: LearnerId,
        lesson: LessonId,
        block: BlockId,
    ) -> Result<Option<QuizAnswers>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT answers
            FROM quest_quiz_answers
            WHERE learner_id = ?1 AND lesson_id = ?2 AND block_id = ?3
            ",
        )
        .bind(learner.to_string())
        .bind(lesson.to_string())
        .bind(block.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("answers").map_err(ser)?;
        from_json("answers", &raw).map(Some)
    }
}
