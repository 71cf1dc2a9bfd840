use async_trait::async_trait;
use quest_core::model::{Block, BlockId, LessonId};

use super::SqliteRepository;
use super::mapping::{map_block_row, to_json};
use crate::repository::{BlockCatalog, StorageError};

#[async_trait]
impl BlockCatalog for SqliteRepository {
    async fn lesson_blocks(&self, lesson: LessonId) -> Result<Vec<Block>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, position, kind, content
            FROM lesson_blocks
            WHERE lesson_id = ?1
            ORDER BY position ASC, id ASC
            ",
        )
        .bind(lesson.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(map_block_row).collect()
    }

    async fn upsert_block(&self, lesson: LessonId, block: &Block) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO lesson_blocks (id, lesson_id, position, kind, content)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                lesson_id = excluded.lesson_id,
                position = excluded.position,
                kind = excluded.kind,
                content = excluded.content
            ",
        )
        .bind(block.id().to_string())
        .bind(lesson.to_string())
        .bind(i64::from(block.position()))
        .bind(block.kind().tag())
        .bind(to_json("content", block.content())?)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn remove_block(&self, lesson: LessonId, block: BlockId) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM lesson_blocks WHERE id = ?1 AND lesson_id = ?2")
            .bind(block.to_string())
            .bind(lesson.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
