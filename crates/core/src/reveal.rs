//! Cumulative reveal: what the player shows for a given progress state.
//!
//! Everything here is derived from `current_step_index` and the completed set.
//! Nothing about visibility is stored.

use crate::gate::BlockRegistry;
use crate::model::{Block, BlockId, BlockKind, FormState, ProgressState, TableState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    Interactive,
    ReadOnly,
}

/// Data already recorded for a step, handed to its renderer so a frozen step
/// shows its final state instead of an empty one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedData<'a> {
    None,
    Role(Option<&'a str>),
    Video { watched_percent: Option<u8> },
    Table(&'a TableState),
    Form(&'a FormState),
}

impl<'a> RecordedData<'a> {
    #[must_use]
    pub fn for_block(block: &Block, state: &'a ProgressState) -> Self {
        match block.kind() {
            BlockKind::RoleSelectionQuiz | BlockKind::RoleDescription => Self::Role(state.role()),
            BlockKind::UnskippableVideo | BlockKind::SkippableVideo => Self::Video {
                watched_percent: state.video_progress(block.id()),
            },
            BlockKind::DiagnosticTable => Self::Table(state.table()),
            BlockKind::SequentialForm => Self::Form(state.form()),
            _ => Self::None,
        }
    }
}

/// One rendered step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepView<'a> {
    pub index: usize,
    pub block: &'a Block,
    pub mode: StepMode,
    pub completed: bool,
    pub gate_open: bool,
    pub recorded: RecordedData<'a>,
}

/// Entry of the step indicator strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepIndicator {
    pub index: usize,
    pub block_id: BlockId,
    pub completed: bool,
    pub current: bool,
    /// The learner may jump here without passing a gate.
    pub reachable: bool,
    pub gate_open: bool,
}

/// Steps at or before the current index, in order. Later steps are not
/// returned at all. Only the current step is interactive, and nothing is once
/// the lesson is finished.
#[must_use]
pub fn visible_steps<'a>(
    steps: &'a [Block],
    state: &'a ProgressState,
    registry: &BlockRegistry,
) -> Vec<StepView<'a>> {
    let current = state.current_step_index();
    steps
        .iter()
        .enumerate()
        .take_while(|(index, _)| *index <= current)
        .map(|(index, block)| StepView {
            index,
            block,
            mode: if index == current && !state.is_finished() {
                StepMode::Interactive
            } else {
                StepMode::ReadOnly
            },
            completed: state.is_completed(block.id()),
            gate_open: registry.is_open(block, state),
            recorded: RecordedData::for_block(block, state),
        })
        .collect()
}

/// Whether the indicator may move the learner to `target` directly.
///
/// Any index up to the current one is reachable. A later index is reachable
/// only when every step from the current one up to it is already completed,
/// so no unvisited step is ever skipped.
#[must_use]
pub fn can_jump_to(steps: &[Block], state: &ProgressState, target: usize) -> bool {
    if target >= steps.len() {
        return false;
    }
    let current = state.current_step_index();
    if target <= current {
        return true;
    }
    steps[current..target]
        .iter()
        .all(|b| state.is_completed(b.id()))
}

#[must_use]
pub fn step_indicators(
    steps: &[Block],
    state: &ProgressState,
    registry: &BlockRegistry,
) -> Vec<StepIndicator> {
    steps
        .iter()
        .enumerate()
        .map(|(index, block)| StepIndicator {
            index,
            block_id: block.id(),
            completed: state.is_completed(block.id()),
            current: index == state.current_step_index(),
            reachable: can_jump_to(steps, state, index),
            gate_open: registry.is_open(block, state),
        })
        .collect()
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
