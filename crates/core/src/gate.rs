//! Gate evaluation: which step blocks let the learner move on.
//!
//! Each block kind maps to a `BlockBehavior` descriptor in a `BlockRegistry`.
//! Kinds without an entry fall back to a pass-through behavior that is always
//! open. Evaluation is pure; calling it twice with the same inputs yields the
//! same answer.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{Block, BlockId, BlockKind, ProgressState};

/// Rule deciding whether a block's gate is open, ignoring sticky completion.
pub type GateFn = fn(&Block, &ProgressState) -> bool;

/// What a per-block reset has to clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetScope {
    RoleQuiz,
    DiagnosticTable,
    SequentialForm,
}

impl ResetScope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoleQuiz => "role_quiz",
            Self::DiagnosticTable => "diagnostic_table",
            Self::SequentialForm => "sequential_form",
        }
    }
}

impl fmt::Display for ResetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── BEHAVIOR DESCRIPTOR ───────────────────────────────────────────────────────
//

/// Everything the progression engine needs to know about one block kind.
#[derive(Clone, Copy)]
pub struct BlockBehavior {
    pub is_open: GateFn,
    /// Completion of the block moves the learner to the next step on its own.
    pub auto_advances: bool,
    pub reset: Option<ResetScope>,
    /// Shown when a forward move is refused.
    pub closed_message: &'static str,
}

impl BlockBehavior {
    /// Ungated step, present only for progress counting.
    pub const PASS_THROUGH: Self = Self {
        is_open: always_open,
        auto_advances: false,
        reset: None,
        closed_message: "This step is locked.",
    };
}

impl fmt::Debug for BlockBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockBehavior")
            .field("auto_advances", &self.auto_advances)
            .field("reset", &self.reset)
            .field("closed_message", &self.closed_message)
            .finish_non_exhaustive()
    }
}

fn always_open(_block: &Block, _state: &ProgressState) -> bool {
    true
}

fn role_selected(_block: &Block, state: &ProgressState) -> bool {
    state.role().is_some()
}

fn acknowledged(block: &Block, state: &ProgressState) -> bool {
    state.is_completed(block.id())
}

fn video_watched(block: &Block, state: &ProgressState) -> bool {
    let Ok(video) = block.video() else {
        return false;
    };
    if !video.has_source() {
        return video.admin_bypass;
    }
    state
        .video_progress(block.id())
        .is_some_and(|pct| pct >= video.threshold_percent)
}

fn table_filled(_block: &Block, state: &ProgressState) -> bool {
    !state.table().rows.is_empty() && state.table().completed
}

fn form_submitted(_block: &Block, state: &ProgressState) -> bool {
    state.form().completed
}

//
// ─── REGISTRY ──────────────────────────────────────────────────────────────────
//

/// Refused forward move, with a learner-facing explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRejection {
    pub block_id: BlockId,
    pub kind: BlockKind,
    pub message: String,
}

impl fmt::Display for GateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Block kind to behavior table.
#[derive(Debug, Clone)]
pub struct BlockRegistry {
    behaviors: HashMap<BlockKind, BlockBehavior>,
    fallback: BlockBehavior,
}

impl BlockRegistry {
    /// Registry with no gated kinds; everything passes through.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            behaviors: HashMap::new(),
            fallback: BlockBehavior::PASS_THROUGH,
        }
    }

    /// The built-in rule table for quest lessons.
    #[must_use]
    pub fn builtin() -> Self {
        Self::empty()
            .with(
                BlockKind::RoleSelectionQuiz,
                BlockBehavior {
                    is_open: role_selected,
                    auto_advances: false,
                    reset: Some(ResetScope::RoleQuiz),
                    closed_message: "Complete the quiz to find out your role.",
                },
            )
            .with(
                BlockKind::RoleDescription,
                BlockBehavior {
                    is_open: acknowledged,
                    auto_advances: true,
                    reset: None,
                    closed_message: "Confirm that you have read your role description.",
                },
            )
            .with(
                BlockKind::UnskippableVideo,
                BlockBehavior {
                    is_open: video_watched,
                    auto_advances: true,
                    reset: None,
                    closed_message: "Watch the video to the end to continue.",
                },
            )
            .with(
                BlockKind::SkippableVideo,
                BlockBehavior {
                    is_open: always_open,
                    auto_advances: true,
                    reset: None,
                    closed_message: BlockBehavior::PASS_THROUGH.closed_message,
                },
            )
            .with(
                BlockKind::DiagnosticTable,
                BlockBehavior {
                    is_open: table_filled,
                    auto_advances: true,
                    reset: Some(ResetScope::DiagnosticTable),
                    closed_message: "Add at least one row and save the table.",
                },
            )
            .with(
                BlockKind::SequentialForm,
                BlockBehavior {
                    is_open: form_submitted,
                    auto_advances: false,
                    reset: Some(ResetScope::SequentialForm),
                    closed_message: "Answer every question and submit the form.",
                },
            )
    }

    #[must_use]
    pub fn with(mut self, kind: BlockKind, behavior: BlockBehavior) -> Self {
        self.register(kind, behavior);
        self
    }

    /// Adds or replaces a kind. Returns the previous behavior, if any.
    pub fn register(&mut self, kind: BlockKind, behavior: BlockBehavior) -> Option<BlockBehavior> {
        self.behaviors.insert(kind, behavior)
    }

    #[must_use]
    pub fn behavior(&self, kind: &BlockKind) -> &BlockBehavior {
        self.behaviors.get(kind).unwrap_or(&self.fallback)
    }

    /// Gate state of `block`. Completion is sticky: a completed block is open.
    #[must_use]
    pub fn is_open(&self, block: &Block, state: &ProgressState) -> bool {
        state.is_completed(block.id()) || self.rule_is_open(block, state)
    }

    /// The kind's own rule, without the sticky completion shortcut.
    #[must_use]
    pub fn rule_is_open(&self, block: &Block, state: &ProgressState) -> bool {
        (self.behavior(block.kind()).is_open)(block, state)
    }

    /// `None` when the gate is open.
    #[must_use]
    pub fn rejection(&self, block: &Block, state: &ProgressState) -> Option<GateRejection> {
        if self.is_open(block, state) {
            return None;
        }
        Some(GateRejection {
            block_id: block.id(),
            kind: block.kind().clone(),
            message: self.closed_message(block.kind()).to_owned(),
        })
    }

    #[must_use]
    pub fn closed_message(&self, kind: &BlockKind) -> &'static str {
        self.behavior(kind).closed_message
    }

    #[must_use]
    pub fn auto_advances(&self, kind: &BlockKind) -> bool {
        self.behavior(kind).auto_advances
    }

    #[must_use]
    pub fn reset_scope(&self, kind: &BlockKind) -> Option<ResetScope> {
        self.behavior(kind).reset
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
