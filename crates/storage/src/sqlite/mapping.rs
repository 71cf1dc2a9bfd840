use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use quest_core::model::{
    Block, BlockId, BlockKind, FormState, ProgressParts, ProgressState, TableState,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn to_json<T: Serialize>(field: &'static str, value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value)
        .map_err(|e| StorageError::Serialization(format!("{field}: {e}")))
}

pub(crate) fn from_json<T: DeserializeOwned>(field: &'static str, raw: &str) -> Result<T, StorageError> {
    serde_json::from_str(raw).map_err(|e| StorageError::Serialization(format!("{field}: {e}")))
}

pub(crate) fn index_to_i64(field: &'static str, v: usize) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn revision_to_i64(v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization("revision overflow".into()))
}

fn i64_to_usize(field: &'static str, v: i64) -> Result<usize, StorageError> {
    usize::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn block_id_from_str(raw: &str) -> Result<BlockId, StorageError> {
    raw.parse::<BlockId>().map_err(ser)
}

pub(crate) fn map_block_row(row: &SqliteRow) -> Result<Block, StorageError> {
    let id = block_id_from_str(&row.try_get::<String, _>("id").map_err(ser)?)?;
    let kind = BlockKind::from_tag(&row.try_get::<String, _>("kind").map_err(ser)?);
    let content: serde_json::Value =
        from_json("content", &row.try_get::<String, _>("content").map_err(ser)?)?;
    let position_i64: i64 = row.try_get("position").map_err(ser)?;
    let position = u32::try_from(position_i64)
        .map_err(|_| StorageError::Serialization(format!("invalid position: {position_i64}")))?;

    Ok(Block::new(id, kind, content, position))
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<ProgressState, StorageError> {
    let completed_block_ids: BTreeSet<BlockId> = from_json(
        "completed_block_ids",
        &row.try_get::<String, _>("completed_block_ids").map_err(ser)?,
    )?;
    let video_progress: BTreeMap<BlockId, u8> = from_json(
        "video_progress",
        &row.try_get::<String, _>("video_progress").map_err(ser)?,
    )?;
    let table: TableState =
        from_json("table_state", &row.try_get::<String, _>("table_state").map_err(ser)?)?;
    let form: FormState =
        from_json("form_state", &row.try_get::<String, _>("form_state").map_err(ser)?)?;
    let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at").map_err(ser)?;

    Ok(ProgressState::from_parts(ProgressParts {
        revision: i64_to_u64("revision", row.try_get("revision").map_err(ser)?)?,
        current_step_index: i64_to_usize(
            "current_step_index",
            row.try_get("current_step_index").map_err(ser)?,
        )?,
        completed_block_ids,
        role: row.try_get("role").map_err(ser)?,
        video_progress,
        table,
        form,
        completed_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_index_is_rejected() {
        let err = i64_to_usize("current_step_index", -1).unwrap_err();
        assert!(matches!(err, StorageError::Serialization(msg) if msg.contains("current_step_index")));
    }

    #[test]
    fn json_errors_name_the_field() {
        let err = from_json::<TableState>("table_state", "not json").unwrap_err();
        assert!(matches!(err, StorageError::Serialization(msg) if msg.starts_with("table_state")));
    }
}
