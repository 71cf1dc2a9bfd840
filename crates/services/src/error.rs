//! Shared error types for the services crate.

use thiserror::Error;

use quest_core::model::{BlockContentError, BlockId, BlockKind};
use quest_core::quiz::QuizError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the progression controller.
///
/// A closed gate is not an error; it is reported as
/// `StepOutcome::Blocked` instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuestError {
    #[error("lesson has no step blocks")]
    EmptyLesson,
    #[error("lesson already finished")]
    Finished,
    #[error("block {0} is not a step of this lesson")]
    UnknownBlock(BlockId),
    #[error("step {index} is not the current step")]
    StepNotInteractive { index: usize },
    #[error("step {index} has not been reached yet")]
    StepNotVisited { index: usize },
    #[error("only the last step can finish the lesson (current {current}, last {last})")]
    NotLastStep { current: usize, last: usize },
    #[error("step index {index} is out of range for {len} steps")]
    StepOutOfRange { index: usize, len: usize },
    #[error("cannot jump from step {from} to step {to}")]
    JumpNotAllowed { from: usize, to: usize },
    #[error("block {block_id} is a {kind} block")]
    WrongBlockKind { block_id: BlockId, kind: BlockKind },
    #[error("form has no step {step_id}")]
    UnknownFormStep { step_id: String },
    #[error(transparent)]
    Content(#[from] BlockContentError),
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
