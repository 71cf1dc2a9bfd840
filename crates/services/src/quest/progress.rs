use chrono::{DateTime, Utc};
use quest_core::GateRejection;

/// Aggregated view of lesson progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestProgress {
    pub total_steps: usize,
    pub completed_steps: usize,
    pub current_step_index: usize,
    pub is_finished: bool,
}

/// Result of a committed or refused transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step pointer moved.
    Moved { from: usize, to: usize },
    /// Data was recorded for the current step; the pointer stayed.
    Recorded,
    /// Nothing to do; no write was issued.
    Unchanged,
    /// Forward move refused by the gate of the current step.
    Blocked(GateRejection),
    Finished { completed_at: DateTime<Utc> },
}

impl StepOutcome {
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }

    /// Learner-facing text for a refused move.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Blocked(rejection) => Some(&rejection.message),
            _ => None,
        }
    }
}
