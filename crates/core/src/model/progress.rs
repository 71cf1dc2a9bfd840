use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::model::ids::BlockId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("stale write: stored revision {stored}, incoming revision {incoming}")]
    StaleRevision { stored: u64, incoming: u64 },
}

//
// ─── AUXILIARY STATE ───────────────────────────────────────────────────────────
//

/// One row of the diagnostic table, column name to cell text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: BTreeMap<String, String>,
}

impl TableRow {
    #[must_use]
    pub fn new<K, V>(cells: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            cells: cells
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Diagnostic table ("point A") data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TableState {
    pub rows: Vec<TableRow>,
    pub completed: bool,
}

impl TableState {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && !self.completed
    }
}

/// Sequential form ("point B") data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormState {
    pub answers: BTreeMap<String, String>,
    pub completed: bool,
    pub summary: Option<String>,
}

impl FormState {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty() && !self.completed && self.summary.is_none()
    }
}

//
// ─── PROGRESS STATE ────────────────────────────────────────────────────────────
//

/// Persisted shape of a progress document, used by storage adapters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressParts {
    pub revision: u64,
    pub current_step_index: usize,
    pub completed_block_ids: BTreeSet<BlockId>,
    pub role: Option<String>,
    pub video_progress: BTreeMap<BlockId, u8>,
    pub table: TableState,
    pub form: FormState,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Progress of one learner through one lesson.
///
/// `revision` grows by one with every committed write; stores use it to
/// refuse a write that is older than what they already hold.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressState {
    revision: u64,
    current_step_index: usize,
    completed_block_ids: BTreeSet<BlockId>,
    role: Option<String>,
    video_progress: BTreeMap<BlockId, u8>,
    table: TableState,
    form: FormState,
    completed_at: Option<DateTime<Utc>>,
}

impl ProgressState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrate from storage. Video percentages are clamped to 100.
    #[must_use]
    pub fn from_parts(parts: ProgressParts) -> Self {
        Self {
            revision: parts.revision,
            current_step_index: parts.current_step_index,
            completed_block_ids: parts.completed_block_ids,
            role: parts.role.filter(|r| !r.trim().is_empty()),
            video_progress: parts
                .video_progress
                .into_iter()
                .map(|(id, pct)| (id, pct.min(100)))
                .collect(),
            table: parts.table,
            form: parts.form,
            completed_at: parts.completed_at,
        }
    }

    #[must_use]
    pub fn into_parts(self) -> ProgressParts {
        ProgressParts {
            revision: self.revision,
            current_step_index: self.current_step_index,
            completed_block_ids: self.completed_block_ids,
            role: self.role,
            video_progress: self.video_progress,
            table: self.table,
            form: self.form,
            completed_at: self.completed_at,
        }
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    #[must_use]
    pub fn completed_block_ids(&self) -> &BTreeSet<BlockId> {
        &self.completed_block_ids
    }

    #[must_use]
    pub fn is_completed(&self, block_id: BlockId) -> bool {
        self.completed_block_ids.contains(&block_id)
    }

    #[must_use]
    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    /// Highest watched percentage recorded for a video block.
    #[must_use]
    pub fn video_progress(&self, block_id: BlockId) -> Option<u8> {
        self.video_progress.get(&block_id).copied()
    }

    #[must_use]
    pub fn video_progress_map(&self) -> &BTreeMap<BlockId, u8> {
        &self.video_progress
    }

    #[must_use]
    pub fn table(&self) -> &TableState {
        &self.table
    }

    #[must_use]
    pub fn form(&self) -> &FormState {
        &self.form
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    pub fn set_current_step_index(&mut self, index: usize) {
        self.current_step_index = index;
    }

    /// Returns `true` if the block was not completed before.
    pub fn mark_completed(&mut self, block_id: BlockId) -> bool {
        self.completed_block_ids.insert(block_id)
    }

    /// Only reset operations call this. Returns `true` if the block was completed.
    pub fn unmark_completed(&mut self, block_id: BlockId) -> bool {
        self.completed_block_ids.remove(&block_id)
    }

    pub fn set_role(&mut self, role: Option<String>) {
        self.role = role.filter(|r| !r.trim().is_empty());
    }

    /// Records a watched percentage, keeping the maximum seen so far.
    ///
    /// Returns `true` if the stored value grew.
    pub fn record_video_progress(&mut self, block_id: BlockId, percent: u8) -> bool {
        let percent = percent.min(100);
        let entry = self.video_progress.entry(block_id).or_insert(0);
        if percent > *entry {
            *entry = percent;
            true
        } else {
            false
        }
    }

    pub fn push_table_row(&mut self, row: TableRow) {
        self.table.rows.push(row);
    }

    pub fn set_table_completed(&mut self, completed: bool) {
        self.table.completed = completed;
    }

    pub fn clear_table(&mut self) {
        self.table = TableState::default();
    }

    pub fn set_form_answer(&mut self, step_id: impl Into<String>, answer: impl Into<String>) {
        self.form.answers.insert(step_id.into(), answer.into());
    }

    pub fn complete_form(&mut self, summary: Option<String>) {
        self.form.completed = true;
        self.form.summary = summary.filter(|s| !s.trim().is_empty());
    }

    pub fn clear_form(&mut self) {
        self.form = FormState::default();
    }

    /// Sets the terminal marker. A second call keeps the first timestamp.
    pub fn set_completed_at(&mut self, at: DateTime<Utc>) {
        if self.completed_at.is_none() {
            self.completed_at = Some(at);
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn video_progress_keeps_maximum() {
        let id = BlockId::random();
        let mut state = ProgressState::new();
        assert!(state.record_video_progress(id, 40));
        assert!(!state.record_video_progress(id, 30));
        assert_eq!(state.video_progress(id), Some(40));
        assert!(state.record_video_progress(id, 96));
        assert_eq!(state.video_progress(id), Some(96));
    }

    #[test]
    fn video_progress_clamps_to_100() {
        let id = BlockId::random();
        let mut state = ProgressState::new();
        state.record_video_progress(id, 250);
        assert_eq!(state.video_progress(id), Some(100));
    }

    #[test]
    fn completed_at_is_set_once() {
        let mut state = ProgressState::new();
        let first = fixed_now();
        state.set_completed_at(first);
        state.set_completed_at(first + chrono::Duration::hours(1));
        assert_eq!(state.completed_at(), Some(first));
    }

    #[test]
    fn blank_role_is_treated_as_unset() {
        let mut state = ProgressState::new();
        state.set_role(Some("   ".into()));
        assert_eq!(state.role(), None);
    }

    #[test]
    fn parts_round_trip() {
        let mut state = ProgressState::new();
        state.set_revision(3);
        state.set_current_step_index(2);
        state.mark_completed(BlockId::random());
        state.push_table_row(TableRow::new([("goal", "ship")]));
        state.set_form_answer("why", "because");

        let rebuilt = ProgressState::from_parts(state.clone().into_parts());
        assert_eq!(rebuilt, state);
    }
}
