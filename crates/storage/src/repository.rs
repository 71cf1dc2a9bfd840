use async_trait::async_trait;
use quest_core::ResetScope;
use quest_core::model::{
    Block, BlockId, LearnerId, LessonId, ProgressError, ProgressPatch, ProgressState,
};
use quest_core::quiz::QuizAnswers;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// A write carried a revision that is not newer than the stored one.
    #[error("conflict: stored revision {stored}, incoming revision {incoming}")]
    Conflict { stored: u64, incoming: u64 },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<ProgressError> for StorageError {
    fn from(err: ProgressError) -> Self {
        match err {
            ProgressError::StaleRevision { stored, incoming } => {
                StorageError::Conflict { stored, incoming }
            }
            other => StorageError::Serialization(other.to_string()),
        }
    }
}

/// Durable progress documents, one per (learner, lesson).
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Fetch the stored progress, or `None` if the learner never opened the lesson.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the document cannot be read.
    async fn load(
        &self,
        learner: LearnerId,
        lesson: LessonId,
    ) -> Result<Option<ProgressState>, StorageError>;

    /// Apply a partial update, creating the document if missing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the patch is older than the stored
    /// document, or other storage errors.
    async fn merge(
        &self,
        learner: LearnerId,
        lesson: LessonId,
        patch: &ProgressPatch,
    ) -> Result<(), StorageError>;

    /// Authoritative clear of one block's data. Bumps the stored revision.
    ///
    /// For `ResetScope::RoleQuiz` the raw quiz answers are deleted as well.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the clear cannot be applied.
    async fn reset_block(
        &self,
        learner: LearnerId,
        lesson: LessonId,
        block: BlockId,
        scope: ResetScope,
    ) -> Result<(), StorageError>;

    /// Store the raw answers a learner gave in a role quiz.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the answers cannot be stored.
    async fn record_quiz_answers(
        &self,
        learner: LearnerId,
        lesson: LessonId,
        block: BlockId,
        answers: &QuizAnswers,
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the answers cannot be read.
    async fn quiz_answers(
        &self,
        learner: LearnerId,
        lesson: LessonId,
        block: BlockId,
    ) -> Result<Option<QuizAnswers>, StorageError>;
}

/// Read access to authored lessons, plus the writes seeding and tests need.
#[async_trait]
pub trait BlockCatalog: Send + Sync {
    /// All blocks of a lesson ordered by position. Empty if the lesson has none.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the blocks cannot be read.
    async fn lesson_blocks(&self, lesson: LessonId) -> Result<Vec<Block>, StorageError>;

    /// Persist or update a block.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the block cannot be stored.
    async fn upsert_block(&self, lesson: LessonId, block: &Block) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the block does not exist.
    async fn remove_block(&self, lesson: LessonId, block: BlockId) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    progress: Arc<Mutex<HashMap<(LearnerId, LessonId), ProgressState>>>,
    answers: Arc<Mutex<HashMap<(LearnerId, LessonId, BlockId), QuizAnswers>>>,
    blocks: Arc<Mutex<HashMap<LessonId, Vec<Block>>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl ProgressStore for InMemoryRepository {
    async fn load(
        &self,
        learner: LearnerId,
        lesson: LessonId,
    ) -> Result<Option<ProgressState>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(guard.get(&(learner, lesson)).cloned())
    }

    async fn merge(
        &self,
        learner: LearnerId,
        lesson: LessonId,
        patch: &ProgressPatch,
    ) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        let doc = guard.entry((learner, lesson)).or_default();
        doc.apply_patch(patch.clone())?;
        Ok(())
    }

    async fn reset_block(
        &self,
        learner: LearnerId,
        lesson: LessonId,
        block: BlockId,
        scope: ResetScope,
    ) -> Result<(), StorageError> {
        if scope == ResetScope::RoleQuiz {
            let mut answers = self.answers.lock().map_err(poisoned)?;
            answers.remove(&(learner, lesson, block));
        }

        let mut guard = self.progress.lock().map_err(poisoned)?;
        if let Some(doc) = guard.get_mut(&(learner, lesson)) {
            doc.clear_block(block, scope);
            doc.set_revision(doc.revision() + 1);
        }
        Ok(())
    }

    async fn record_quiz_answers(
        &self,
        learner: LearnerId,
        lesson: LessonId,
        block: BlockId,
        answers: &QuizAnswers,
    ) -> Result<(), StorageError> {
        let mut guard = self.answers.lock().map_err(poisoned)?;
        guard.insert((learner, lesson, block), answers.clone());
        Ok(())
    }

    async fn quiz_answers(
        &self,
        learner: LearnerId,
        lesson: LessonId,
        block: BlockId,
    ) -> Result<Option<QuizAnswers>, StorageError> {
        let guard = self.answers.lock().map_err(poisoned)?;
        Ok(guard.get(&(learner, lesson, block)).cloned())
    }
}

#[async_trait]
impl BlockCatalog for InMemoryRepository {
    async fn lesson_blocks(&self, lesson: LessonId) -> Result<Vec<Block>, StorageError> {
        let guard = self.blocks.lock().map_err(poisoned)?;
        let mut blocks = guard.get(&lesson).cloned().unwrap_or_default();
        blocks.sort_by_key(Block::position);
        Ok(blocks)
    }

    async fn upsert_block(&self, lesson: LessonId, block: &Block) -> Result<(), StorageError> {
        let mut guard = self.blocks.lock().map_err(poisoned)?;
        let blocks = guard.entry(lesson).or_default();
        match blocks.iter_mut().find(|b| b.id() == block.id()) {
            Some(existing) => *existing = block.clone(),
            None => blocks.push(block.clone()),
        }
        Ok(())
    }

    async fn remove_block(&self, lesson: LessonId, block: BlockId) -> Result<(), StorageError> {
        let mut guard = self.blocks.lock().map_err(poisoned)?;
        let blocks = guard.get_mut(&lesson).ok_or(StorageError::NotFound)?;
        let before = blocks.len();
        blocks.retain(|b| b.id() != block);
        if blocks.len() == before {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

/// Aggregates the catalog and progress store behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub catalog: Arc<dyn BlockCatalog>,
    pub progress: Arc<dyn ProgressStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let catalog: Arc<dyn BlockCatalog> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressStore> = Arc::new(repo);
        Self { catalog, progress }
    }
}
