use quest_core::ResetScope;
use quest_core::model::BlockId;

use super::progress::StepOutcome;
use super::session::QuestSession;
use super::workflow::QuestService;
use crate::error::QuestError;

impl QuestService {
    /// Clear one block's recorded data without touching any other step.
    ///
    /// - role quiz: the store clears the role and the raw answers, then the
    ///   session reloads from the store. Nothing is cleared locally if the
    ///   store call fails.
    /// - diagnostic table: rows and the saved flag are cleared and the step
    ///   pointer moves back by one.
    /// - sequential form: answers, the saved flag and the summary are
    ///   cleared; the pointer stays.
    ///
    /// In every case the block leaves the completed set.
    ///
    /// # Errors
    ///
    /// Returns `QuestError::WrongBlockKind` for a block without reset,
    /// `QuestError::StepNotVisited` for a step the learner never reached,
    /// `QuestError::Finished` after the lesson ended, or a storage error.
    pub async fn reset_block(
        &self,
        session: &mut QuestSession,
        block_id: BlockId,
    ) -> Result<StepOutcome, QuestError> {
        let scope = session.reset_scope(block_id)?;

        if scope != ResetScope::RoleQuiz {
            let staged = session.plan_local_reset(block_id, scope);
            let outcome = self.commit(session, staged).await?;
            tracing::info!(
                lesson = %session.lesson(),
                block = %block_id,
                %scope,
                current = session.current_index(),
                "block reset"
            );
            return Ok(outcome);
        }

        let (learner, lesson) = (session.learner(), session.lesson());
        if let Err(err) = self
            .progress
            .reset_block(learner, lesson, block_id, scope)
            .await
        {
            tracing::warn!(%learner, %lesson, block = %block_id, %err, "quiz reset failed; local data kept");
            return Err(err.into());
        }

        let reloaded = self
            .progress
            .load(learner, lesson)
            .await?
            .unwrap_or_default();
        session.rehydrate(reloaded);
        tracing::info!(%learner, %lesson, block = %block_id, %scope, "block reset");
        Ok(StepOutcome::Recorded)
    }
}
