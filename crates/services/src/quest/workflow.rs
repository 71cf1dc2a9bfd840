use std::sync::Arc;

use quest_core::BlockRegistry;
use quest_core::model::{BlockId, LearnerId, LessonId, ProgressPatch, TableRow};
use quest_core::quiz::QuizAnswers;
use storage::repository::{BlockCatalog, ProgressStore};

use super::listener::LessonCompletionListener;
use super::progress::StepOutcome;
use super::session::{QuestSession, Staged};
use crate::Clock;
use crate::error::QuestError;

/// Orchestrates lesson loading and persisted transitions.
///
/// Each operation plans against the session's confirmed state, writes the
/// difference through the store, and applies it to the session only after
/// the write succeeds. A failed write leaves the session on the last
/// confirmed state.
#[derive(Clone)]
pub struct QuestService {
    clock: Clock,
    catalog: Arc<dyn BlockCatalog>,
    pub(super) progress: Arc<dyn ProgressStore>,
    registry: Arc<BlockRegistry>,
    listener: Option<Arc<dyn LessonCompletionListener>>,
}

impl QuestService {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn BlockCatalog>,
        progress: Arc<dyn ProgressStore>,
    ) -> Self {
        Self {
            clock,
            catalog,
            progress,
            registry: Arc::new(BlockRegistry::builtin()),
            listener: None,
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: BlockRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn LessonCompletionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    #[must_use]
    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    /// Load the lesson's blocks and the learner's progress.
    ///
    /// A learner without stored progress starts at the first step. Nothing
    /// is written until the first transition.
    ///
    /// # Errors
    ///
    /// Returns `QuestError::EmptyLesson` if the lesson has no step blocks, or
    /// `QuestError::Storage` if either read fails.
    pub async fn open_lesson(
        &self,
        learner: LearnerId,
        lesson: LessonId,
    ) -> Result<QuestSession, QuestError> {
        let blocks = self.catalog.lesson_blocks(lesson).await?;
        let state = self
            .progress
            .load(learner, lesson)
            .await?
            .unwrap_or_default();
        let session = QuestSession::new(learner, lesson, &blocks, state, Arc::clone(&self.registry))?;
        tracing::debug!(
            %learner,
            %lesson,
            steps = session.steps().len(),
            current = session.current_index(),
            "lesson opened"
        );
        Ok(session)
    }

    /// Move to `target`. Backward moves always succeed; forward moves pass
    /// the gate of the current step.
    ///
    /// # Errors
    ///
    /// Returns `QuestError` for an invalid target, a finished lesson, or a
    /// failed write.
    pub async fn go_to(
        &self,
        session: &mut QuestSession,
        target: usize,
    ) -> Result<StepOutcome, QuestError> {
        let staged = session.plan_go_to(target)?;
        self.commit(session, staged).await
    }

    /// # Errors
    ///
    /// Returns `QuestError::StepOutOfRange` on the last step; see `go_to`.
    pub async fn next(&self, session: &mut QuestSession) -> Result<StepOutcome, QuestError> {
        let staged = session.plan_next()?;
        self.commit(session, staged).await
    }

    /// # Errors
    ///
    /// Returns `QuestError::Finished` after the lesson ended, or a storage error.
    pub async fn back(&self, session: &mut QuestSession) -> Result<StepOutcome, QuestError> {
        let staged = session.plan_back()?;
        self.commit(session, staged).await
    }

    /// Complete the last step and end the lesson. The completion listener
    /// fires after the write is confirmed.
    ///
    /// # Errors
    ///
    /// Returns `QuestError::NotLastStep` when not on the last step,
    /// `QuestError::Finished` when already finished, or a storage error.
    pub async fn finish(&self, session: &mut QuestSession) -> Result<StepOutcome, QuestError> {
        let staged = session.plan_finish(self.clock.now())?;
        self.commit(session, staged).await
    }

    /// Derive the role, complete the quiz step, then store the raw answers.
    /// Answers are only written once the role is committed. The quiz does
    /// not advance on its own.
    ///
    /// # Errors
    ///
    /// Returns `QuestError::Quiz` for incomplete or unknown answers, or any
    /// error an event on a non-current step produces.
    pub async fn submit_role_quiz(
        &self,
        session: &mut QuestSession,
        block_id: BlockId,
        answers: &QuizAnswers,
    ) -> Result<StepOutcome, QuestError> {
        let staged = session.plan_role_quiz(block_id, answers)?;
        let outcome = self.commit(session, staged).await?;
        if let Err(err) = self
            .progress
            .record_quiz_answers(session.learner(), session.lesson(), block_id, answers)
            .await
        {
            tracing::warn!(
                learner = %session.learner(),
                lesson = %session.lesson(),
                block = %block_id,
                %err,
                "role committed but raw answers were not recorded"
            );
            return Err(err.into());
        }
        Ok(outcome)
    }

    /// # Errors
    ///
    /// Returns `QuestError` if the block is not the current role description.
    pub async fn acknowledge_role_description(
        &self,
        session: &mut QuestSession,
        block_id: BlockId,
    ) -> Result<StepOutcome, QuestError> {
        let staged = session.plan_acknowledge(block_id)?;
        self.commit(session, staged).await
    }

    /// Record a player progress tick. Only the highest value is kept, so a
    /// lower report after seeking back writes nothing.
    ///
    /// # Errors
    ///
    /// Returns `QuestError` if the block is not the current video step.
    pub async fn report_video_progress(
        &self,
        session: &mut QuestSession,
        block_id: BlockId,
        percent: u8,
    ) -> Result<StepOutcome, QuestError> {
        let staged = session.plan_video_progress(block_id, percent)?;
        self.commit(session, staged).await
    }

    /// Player reports the end of the video.
    ///
    /// # Errors
    ///
    /// Returns `QuestError` if the block is not the current video step.
    pub async fn complete_video(
        &self,
        session: &mut QuestSession,
        block_id: BlockId,
    ) -> Result<StepOutcome, QuestError> {
        let staged = session.plan_complete_video(block_id)?;
        self.commit(session, staged).await
    }

    /// # Errors
    ///
    /// Returns `QuestError` if the block is not the current diagnostic table.
    pub async fn add_table_row(
        &self,
        session: &mut QuestSession,
        block_id: BlockId,
        row: TableRow,
    ) -> Result<StepOutcome, QuestError> {
        let staged = session.plan_table_row(block_id, row)?;
        self.commit(session, staged).await
    }

    /// # Errors
    ///
    /// Returns `QuestError` if the block is not the current diagnostic table.
    pub async fn complete_table(
        &self,
        session: &mut QuestSession,
        block_id: BlockId,
    ) -> Result<StepOutcome, QuestError> {
        let staged = session.plan_complete_table(block_id)?;
        self.commit(session, staged).await
    }

    /// # Errors
    ///
    /// Returns `QuestError::UnknownFormStep` if the form has no such step.
    pub async fn answer_form_step(
        &self,
        session: &mut QuestSession,
        block_id: BlockId,
        step_id: &str,
        answer: &str,
    ) -> Result<StepOutcome, QuestError> {
        let staged = session.plan_form_answer(block_id, step_id, answer)?;
        self.commit(session, staged).await
    }

    /// Submit the form. `summary` is the generated text shown once the form
    /// is done, if the caller produced one.
    ///
    /// # Errors
    ///
    /// Returns `QuestError` if the block is not the current form.
    pub async fn complete_form(
        &self,
        session: &mut QuestSession,
        block_id: BlockId,
        summary: Option<String>,
    ) -> Result<StepOutcome, QuestError> {
        let staged = session.plan_complete_form(block_id, summary)?;
        self.commit(session, staged).await
    }

    pub(super) async fn commit(
        &self,
        session: &mut QuestSession,
        staged: Staged,
    ) -> Result<StepOutcome, QuestError> {
        let Staged { next, outcome } = staged;
        let Some(next) = next else {
            if let StepOutcome::Blocked(rejection) = &outcome {
                tracing::debug!(
                    lesson = %session.lesson(),
                    block = %rejection.block_id,
                    kind = %rejection.kind,
                    "forward move refused by gate"
                );
            }
            return Ok(outcome);
        };

        let patch = ProgressPatch::between(session.state(), &next);
        if let Err(err) = self
            .progress
            .merge(session.learner(), session.lesson(), &patch)
            .await
        {
            tracing::warn!(
                learner = %session.learner(),
                lesson = %session.lesson(),
                revision = patch.revision,
                confirmed = session.current_index(),
                %err,
                "progress write failed; staying on last confirmed state"
            );
            return Err(err.into());
        }

        session.apply(next);
        tracing::debug!(
            lesson = %session.lesson(),
            revision = patch.revision,
            current = session.current_index(),
            ?outcome,
            "transition committed"
        );

        if let StepOutcome::Finished { completed_at } = &outcome {
            tracing::info!(
                learner = %session.learner(),
                lesson = %session.lesson(),
                %completed_at,
                "lesson finished"
            );
            if let Some(listener) = &self.listener {
                listener.lesson_completed(session.learner(), session.lesson(), *completed_at);
            }
        }
        Ok(outcome)
    }
}
