use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::ids::BlockId;
use crate::model::progress::{FormState, ProgressError, ProgressParts, ProgressState, TableState};

/// Partial, additive update of a progress document.
///
/// Only `Some` fields are written. `video_progress` merges per block with the
/// maximum of stored and incoming values. `completed_at` never overwrites an
/// existing timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressPatch {
    pub revision: u64,
    pub current_step_index: Option<usize>,
    pub completed_block_ids: Option<BTreeSet<BlockId>>,
    pub role: Option<Option<String>>,
    pub video_progress: Option<BTreeMap<BlockId, u8>>,
    pub table: Option<TableState>,
    pub form: Option<FormState>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProgressPatch {
    /// Builds the patch that turns `before` into `after`.
    ///
    /// The step pointer is always included so every committed write pins it.
    #[must_use]
    pub fn between(before: &ProgressState, after: &ProgressState) -> Self {
        let changed_videos: BTreeMap<BlockId, u8> = after
            .video_progress_map()
            .iter()
            .filter(|(id, pct)| before.video_progress(**id) != Some(**pct))
            .map(|(id, pct)| (*id, *pct))
            .collect();

        Self {
            revision: after.revision(),
            current_step_index: Some(after.current_step_index()),
            completed_block_ids: (before.completed_block_ids() != after.completed_block_ids())
                .then(|| after.completed_block_ids().clone()),
            role: (before.role() != after.role()).then(|| after.role().map(str::to_owned)),
            video_progress: (!changed_videos.is_empty()).then_some(changed_videos),
            table: (before.table() != after.table()).then(|| after.table().clone()),
            form: (before.form() != after.form()).then(|| after.form().clone()),
            completed_at: if before.completed_at() == after.completed_at() {
                None
            } else {
                after.completed_at()
            },
        }
    }
}

impl ProgressState {
    /// Applies a patch on top of this state.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::StaleRevision` unless the patch revision is
    /// strictly greater than the current one. The state is left untouched.
    pub fn apply_patch(&mut self, patch: ProgressPatch) -> Result<(), ProgressError> {
        if patch.revision <= self.revision() {
            return Err(ProgressError::StaleRevision {
                stored: self.revision(),
                incoming: patch.revision,
            });
        }

        let mut parts: ProgressParts = std::mem::take(self).into_parts();
        parts.revision = patch.revision;
        if let Some(index) = patch.current_step_index {
            parts.current_step_index = index;
        }
        if let Some(ids) = patch.completed_block_ids {
            parts.completed_block_ids = ids;
        }
        if let Some(role) = patch.role {
            parts.role = role;
        }
        if let Some(videos) = patch.video_progress {
            for (id, pct) in videos {
                let entry = parts.video_progress.entry(id).or_insert(0);
                *entry = (*entry).max(pct);
            }
        }
        if let Some(table) = patch.table {
            parts.table = table;
        }
        if let Some(form) = patch.form {
            parts.form = form;
        }
        if parts.completed_at.is_none() {
            parts.completed_at = patch.completed_at;
        }

        *self = ProgressState::from_parts(parts);
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
