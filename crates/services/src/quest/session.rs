use std::sync::Arc;

use chrono::{DateTime, Utc};
use quest_core::model::{
    Block, BlockId, BlockKind, LearnerId, LessonId, ProgressState, TableRow, step_blocks,
};
use quest_core::quiz::{QuizAnswers, derive_role};
use quest_core::reveal::{self, StepIndicator, StepView};
use quest_core::{BlockRegistry, GateRejection, ResetScope};

use super::progress::{QuestProgress, StepOutcome};
use crate::error::QuestError;

//
// ─── STAGED CHANGE ─────────────────────────────────────────────────────────────
//

/// A transition computed against the confirmed state but not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Staged {
    /// `None` when nothing needs to be written.
    pub(crate) next: Option<ProgressState>,
    pub(crate) outcome: StepOutcome,
}

impl Staged {
    fn unchanged() -> Self {
        Self {
            next: None,
            outcome: StepOutcome::Unchanged,
        }
    }

    fn blocked(rejection: GateRejection) -> Self {
        Self {
            next: None,
            outcome: StepOutcome::Blocked(rejection),
        }
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// In-memory walk of one learner through one lesson.
///
/// Holds the step blocks and the last state confirmed by the store. Every
/// transition is planned here against that state; `QuestService` persists the
/// plan and only then swaps it in. Taking the session by `&mut` serializes
/// transitions: a second one cannot start while a write is outstanding.
pub struct QuestSession {
    learner: LearnerId,
    lesson: LessonId,
    steps: Vec<Block>,
    state: ProgressState,
    registry: Arc<BlockRegistry>,
}

impl QuestSession {
    /// Build a session from the raw catalog blocks and the stored state.
    ///
    /// Decorative blocks are dropped. A stored step index past the end of the
    /// step list (blocks removed after progress was recorded) is clamped to
    /// the last step; the clamp is persisted by the next committed write.
    ///
    /// # Errors
    ///
    /// Returns `QuestError::EmptyLesson` if the lesson has no step blocks.
    pub fn new(
        learner: LearnerId,
        lesson: LessonId,
        blocks: &[Block],
        state: ProgressState,
        registry: Arc<BlockRegistry>,
    ) -> Result<Self, QuestError> {
        let steps = step_blocks(blocks);
        if steps.is_empty() {
            return Err(QuestError::EmptyLesson);
        }

        let mut session = Self {
            learner,
            lesson,
            steps,
            state,
            registry,
        };
        session.clamp_index();
        Ok(session)
    }

    #[must_use]
    pub fn learner(&self) -> LearnerId {
        self.learner
    }

    #[must_use]
    pub fn lesson(&self) -> LessonId {
        self.lesson
    }

    #[must_use]
    pub fn steps(&self) -> &[Block] {
        &self.steps
    }

    /// Last state confirmed by the store (plus any resume clamp).
    #[must_use]
    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    #[must_use]
    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.state.current_step_index()
    }

    #[must_use]
    pub fn last_index(&self) -> usize {
        self.steps.len() - 1
    }

    #[must_use]
    pub fn current_block(&self) -> &Block {
        &self.steps[self.current_index()]
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    #[must_use]
    pub fn progress(&self) -> QuestProgress {
        QuestProgress {
            total_steps: self.steps.len(),
            completed_steps: self
                .steps
                .iter()
                .filter(|b| self.state.is_completed(b.id()))
                .count(),
            current_step_index: self.current_index(),
            is_finished: self.is_finished(),
        }
    }

    /// Why the learner cannot move past the current step, if they cannot.
    #[must_use]
    pub fn current_rejection(&self) -> Option<GateRejection> {
        self.registry.rejection(self.current_block(), &self.state)
    }

    #[must_use]
    pub fn visible_steps(&self) -> Vec<StepView<'_>> {
        reveal::visible_steps(&self.steps, &self.state, &self.registry)
    }

    #[must_use]
    pub fn indicators(&self) -> Vec<StepIndicator> {
        reveal::step_indicators(&self.steps, &self.state, &self.registry)
    }

    #[must_use]
    pub fn can_jump_to(&self, target: usize) -> bool {
        reveal::can_jump_to(&self.steps, &self.state, target)
    }

    pub(crate) fn apply(&mut self, next: ProgressState) {
        self.state = next;
    }

    /// Replace the state with a fresh copy from the store.
    pub(crate) fn rehydrate(&mut self, state: ProgressState) {
        self.state = state;
        self.clamp_index();
    }

    fn clamp_index(&mut self) {
        let stored = self.state.current_step_index();
        let last = self.last_index();
        if stored > last {
            tracing::warn!(
                learner = %self.learner,
                lesson = %self.lesson,
                stored,
                clamped = last,
                "stored step index is past the end of the lesson; clamping"
            );
            self.state.set_current_step_index(last);
        }
    }

    //
    // ─── PLANNING HELPERS ──────────────────────────────────────────────────────
    //

    fn draft(&self) -> ProgressState {
        let mut next = self.state.clone();
        next.set_revision(self.state.revision() + 1);
        next
    }

    /// Drops drafts that change nothing but the revision.
    fn stage(&self, next: ProgressState, outcome: StepOutcome) -> Staged {
        let mut rebased = next.clone();
        rebased.set_revision(self.state.revision());
        if rebased == self.state {
            return Staged::unchanged();
        }
        Staged {
            next: Some(next),
            outcome,
        }
    }

    fn ensure_running(&self) -> Result<(), QuestError> {
        if self.is_finished() {
            return Err(QuestError::Finished);
        }
        Ok(())
    }

    fn locate(&self, block_id: BlockId) -> Result<(usize, &Block), QuestError> {
        self.steps
            .iter()
            .enumerate()
            .find(|(_, b)| b.id() == block_id)
            .ok_or(QuestError::UnknownBlock(block_id))
    }

    /// The block an event targets, which must be the current step.
    fn interactive(
        &self,
        block_id: BlockId,
        accepts: impl Fn(&BlockKind) -> bool,
    ) -> Result<&Block, QuestError> {
        self.ensure_running()?;
        let (index, block) = self.locate(block_id)?;
        if index != self.current_index() {
            return Err(QuestError::StepNotInteractive { index });
        }
        if !accepts(block.kind()) {
            return Err(QuestError::WrongBlockKind {
                block_id,
                kind: block.kind().clone(),
            });
        }
        Ok(block)
    }

    fn rejection_for(&self, block: &Block) -> GateRejection {
        GateRejection {
            block_id: block.id(),
            kind: block.kind().clone(),
            message: self.registry.closed_message(block.kind()).to_owned(),
        }
    }

    /// Marks the current step completed in `next`, then moves on if its kind
    /// auto-advances and it is not the last step.
    fn complete_current(&self, next: &mut ProgressState) -> StepOutcome {
        let from = self.current_index();
        let block = self.current_block();
        next.mark_completed(block.id());
        if self.registry.auto_advances(block.kind()) && from < self.last_index() {
            next.set_current_step_index(from + 1);
            return StepOutcome::Moved { from, to: from + 1 };
        }
        StepOutcome::Recorded
    }

    /// Completes the current step if `next` satisfies its gate.
    fn complete_if_open(&self, block: &Block, mut next: ProgressState) -> Staged {
        if !self.registry.is_open(block, &next) {
            return Staged::blocked(self.rejection_for(block));
        }
        let outcome = self.complete_current(&mut next);
        self.stage(next, outcome)
    }

    //
    // ─── NAVIGATION ────────────────────────────────────────────────────────────
    //

    pub(crate) fn plan_go_to(&self, target: usize) -> Result<Staged, QuestError> {
        self.ensure_running()?;
        let len = self.steps.len();
        if target >= len {
            return Err(QuestError::StepOutOfRange { index: target, len });
        }

        let from = self.current_index();
        if target == from {
            return Ok(Staged::unchanged());
        }

        let mut next = self.draft();
        if target < from {
            next.set_current_step_index(target);
            return Ok(self.stage(next, StepOutcome::Moved { from, to: target }));
        }

        if let Some(rejection) = self.current_rejection() {
            return Ok(Staged::blocked(rejection));
        }
        next.mark_completed(self.current_block().id());
        if !reveal::can_jump_to(&self.steps, &next, target) {
            return Err(QuestError::JumpNotAllowed { from, to: target });
        }
        next.set_current_step_index(target);
        Ok(self.stage(next, StepOutcome::Moved { from, to: target }))
    }

    pub(crate) fn plan_next(&self) -> Result<Staged, QuestError> {
        self.plan_go_to(self.current_index() + 1)
    }

    pub(crate) fn plan_back(&self) -> Result<Staged, QuestError> {
        self.ensure_running()?;
        match self.current_index().checked_sub(1) {
            Some(target) => self.plan_go_to(target),
            None => Ok(Staged::unchanged()),
        }
    }

    pub(crate) fn plan_finish(&self, now: DateTime<Utc>) -> Result<Staged, QuestError> {
        self.ensure_running()?;
        let current = self.current_index();
        let last = self.last_index();
        if current != last {
            return Err(QuestError::NotLastStep { current, last });
        }
        if let Some(rejection) = self.current_rejection() {
            return Ok(Staged::blocked(rejection));
        }

        let mut next = self.draft();
        next.mark_completed(self.current_block().id());
        next.set_completed_at(now);
        Ok(self.stage(next, StepOutcome::Finished { completed_at: now }))
    }

    //
    // ─── BLOCK EVENTS ──────────────────────────────────────────────────────────
    //

    pub(crate) fn plan_role_quiz(
        &self,
        block_id: BlockId,
        answers: &QuizAnswers,
    ) -> Result<Staged, QuestError> {
        let block = self.interactive(block_id, |k| *k == BlockKind::RoleSelectionQuiz)?;
        let role = derive_role(&block.role_quiz()?, answers)?;
        let mut next = self.draft();
        next.set_role(Some(role));
        Ok(self.complete_if_open(block, next))
    }

    pub(crate) fn plan_acknowledge(&self, block_id: BlockId) -> Result<Staged, QuestError> {
        self.interactive(block_id, |k| *k == BlockKind::RoleDescription)?;
        let mut next = self.draft();
        let outcome = self.complete_current(&mut next);
        Ok(self.stage(next, outcome))
    }

    pub(crate) fn plan_video_progress(
        &self,
        block_id: BlockId,
        percent: u8,
    ) -> Result<Staged, QuestError> {
        self.interactive(block_id, BlockKind::is_video)?.video()?;
        let mut next = self.draft();
        next.record_video_progress(block_id, percent.min(100));
        Ok(self.stage(next, StepOutcome::Recorded))
    }

    pub(crate) fn plan_complete_video(&self, block_id: BlockId) -> Result<Staged, QuestError> {
        let block = self.interactive(block_id, BlockKind::is_video)?;
        block.video()?;
        Ok(self.complete_if_open(block, self.draft()))
    }

    pub(crate) fn plan_table_row(
        &self,
        block_id: BlockId,
        row: TableRow,
    ) -> Result<Staged, QuestError> {
        self.interactive(block_id, |k| *k == BlockKind::DiagnosticTable)?;
        let mut next = self.draft();
        next.push_table_row(row);
        Ok(self.stage(next, StepOutcome::Recorded))
    }

    pub(crate) fn plan_complete_table(&self, block_id: BlockId) -> Result<Staged, QuestError> {
        let block = self.interactive(block_id, |k| *k == BlockKind::DiagnosticTable)?;
        if self.state.table().rows.is_empty() {
            return Ok(Staged::blocked(self.rejection_for(block)));
        }
        let mut next = self.draft();
        next.set_table_completed(true);
        Ok(self.complete_if_open(block, next))
    }

    pub(crate) fn plan_form_answer(
        &self,
        block_id: BlockId,
        step_id: &str,
        answer: &str,
    ) -> Result<Staged, QuestError> {
        let block = self.interactive(block_id, |k| *k == BlockKind::SequentialForm)?;
        if !block.form()?.has_step(step_id) {
            return Err(QuestError::UnknownFormStep {
                step_id: step_id.to_owned(),
            });
        }
        let mut next = self.draft();
        next.set_form_answer(step_id, answer);
        Ok(self.stage(next, StepOutcome::Recorded))
    }

    pub(crate) fn plan_complete_form(
        &self,
        block_id: BlockId,
        summary: Option<String>,
    ) -> Result<Staged, QuestError> {
        let block = self.interactive(block_id, |k| *k == BlockKind::SequentialForm)?;
        let content = block.form()?;
        let answers = &self.state.form().answers;
        let all_answered = content.steps.iter().all(|step| {
            answers
                .get(&step.id)
                .is_some_and(|answer| !answer.trim().is_empty())
        });
        if !all_answered {
            return Ok(Staged::blocked(self.rejection_for(block)));
        }

        let mut next = self.draft();
        next.complete_form(summary.filter(|s| !s.trim().is_empty()));
        Ok(self.complete_if_open(block, next))
    }

    //
    // ─── RESETS ────────────────────────────────────────────────────────────────
    //

    /// Validates a reset request and returns the scope of data it clears.
    pub(crate) fn reset_scope(&self, block_id: BlockId) -> Result<ResetScope, QuestError> {
        self.ensure_running()?;
        let (index, block) = self.locate(block_id)?;
        let scope =
            self.registry
                .reset_scope(block.kind())
                .ok_or_else(|| QuestError::WrongBlockKind {
                    block_id,
                    kind: block.kind().clone(),
                })?;
        if index > self.current_index() && !self.state.is_completed(block_id) {
            return Err(QuestError::StepNotVisited { index });
        }
        Ok(scope)
    }

    /// Clears one block's data locally. A table reset also steps back once.
    pub(crate) fn plan_local_reset(&self, block_id: BlockId, scope: ResetScope) -> Staged {
        let mut next = self.draft();
        next.clear_block(block_id, scope);

        let from = self.current_index();
        let mut outcome = StepOutcome::Recorded;
        if scope == ResetScope::DiagnosticTable {
            let to = from.saturating_sub(1);
            next.set_current_step_index(to);
            if to != from {
                outcome = StepOutcome::Moved { from, to };
            }
        }
        self.stage(next, outcome)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use quest_core::time::fixed_now;
    use serde_json::{Value, json};

    fn block(kind: BlockKind, content: Value, position: u32) -> Block {
        Block::new(BlockId::random(), kind, content, position)
    }

    fn quiz_content() -> Value {
        json!({
            "questions": [
                { "id": "q1", "options": [
                    { "id": "a", "role": "X" },
                    { "id": "b", "role": "Y" }
                ]}
            ]
        })
    }

    fn session(blocks: &[Block], state: ProgressState) -> QuestSession {
        QuestSession::new(
            LearnerId::random(),
            LessonId::random(),
            blocks,
            state,
            Arc::new(BlockRegistry::builtin()),
        )
        .unwrap()
    }

    trait CommitLocally {
        fn commit(&mut self, staged: Staged) -> StepOutcome;
    }

    impl CommitLocally for QuestSession {
        fn commit(&mut self, staged: Staged) -> StepOutcome {
            if let Some(next) = staged.next {
                self.apply(next);
            }
            staged.outcome
        }
    }

    #[test]
    fn decorative_only_lesson_is_empty() {
        let blocks = vec![
            block(BlockKind::Heading, Value::Null, 0),
            block(BlockKind::Divider, Value::Null, 1),
        ];
        let err = QuestSession::new(
            LearnerId::random(),
            LessonId::random(),
            &blocks,
            ProgressState::new(),
            Arc::new(BlockRegistry::builtin()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, QuestError::EmptyLesson));
    }

    #[test]
    fn resume_index_past_end_is_clamped_to_last_step() {
        let blocks = vec![
            block(BlockKind::Text, Value::Null, 0),
            block(BlockKind::Text, Value::Null, 1),
        ];
        let mut state = ProgressState::new();
        state.set_current_step_index(7);
        let session = session(&blocks, state);
        assert_eq!(session.current_index(), 1);
        assert_eq!(session.state().revision(), 0);
    }

    #[test]
    fn forward_move_blocked_by_closed_gate_changes_nothing() {
        let blocks = vec![
            block(BlockKind::RoleSelectionQuiz, quiz_content(), 0),
            block(BlockKind::Text, Value::Null, 1),
        ];
        let session = session(&blocks, ProgressState::new());
        let staged = session.plan_next().unwrap();
        assert!(staged.next.is_none());
        assert_eq!(
            staged.outcome.message(),
            Some("Complete the quiz to find out your role.")
        );
    }

    #[test]
    fn next_on_last_step_is_out_of_range() {
        let blocks = vec![block(BlockKind::Text, Value::Null, 0)];
        let session = session(&blocks, ProgressState::new());
        assert!(matches!(
            session.plan_next(),
            Err(QuestError::StepOutOfRange { index: 1, len: 1 })
        ));
    }

    #[test]
    fn forward_move_marks_step_completed_and_bumps_revision() {
        let blocks = vec![
            block(BlockKind::Text, Value::Null, 0),
            block(BlockKind::Callout, Value::Null, 1),
        ];
        let mut session = session(&blocks, ProgressState::new());
        let outcome = session.commit(session.plan_next().unwrap());
        assert_eq!(outcome, StepOutcome::Moved { from: 0, to: 1 });
        assert!(session.state().is_completed(blocks[0].id()));
        assert_eq!(session.state().revision(), 1);
    }

    #[test]
    fn back_always_moves_without_gate_check() {
        let blocks = vec![
            block(BlockKind::Text, Value::Null, 0),
            block(BlockKind::DiagnosticTable, Value::Null, 1),
        ];
        let mut state = ProgressState::new();
        state.set_current_step_index(1);
        let mut session = session(&blocks, state);
        assert!(session.current_rejection().is_some());

        let outcome = session.commit(session.plan_back().unwrap());
        assert_eq!(outcome, StepOutcome::Moved { from: 1, to: 0 });
        assert!(!session.state().is_completed(blocks[1].id()));

        let staged = session.plan_back().unwrap();
        assert_eq!(staged.outcome, StepOutcome::Unchanged);
    }

    #[test]
    fn jump_over_unvisited_step_is_refused() {
        let blocks = vec![
            block(BlockKind::Text, Value::Null, 0),
            block(BlockKind::Text, Value::Null, 1),
            block(BlockKind::Text, Value::Null, 2),
        ];
        let session = session(&blocks, ProgressState::new());
        assert!(matches!(
            session.plan_go_to(2),
            Err(QuestError::JumpNotAllowed { from: 0, to: 2 })
        ));
    }

    #[test]
    fn jump_forward_over_completed_steps_is_allowed() {
        let blocks = vec![
            block(BlockKind::Text, Value::Null, 0),
            block(BlockKind::Text, Value::Null, 1),
            block(BlockKind::Text, Value::Null, 2),
        ];
        let mut state = ProgressState::new();
        state.mark_completed(blocks[0].id());
        state.mark_completed(blocks[1].id());
        let mut session = session(&blocks, state);
        let outcome = session.commit(session.plan_go_to(2).unwrap());
        assert_eq!(outcome, StepOutcome::Moved { from: 0, to: 2 });
    }

    #[test]
    fn quiz_submission_sets_role_without_advancing() {
        let blocks = vec![
            block(BlockKind::RoleSelectionQuiz, quiz_content(), 0),
            block(BlockKind::Text, Value::Null, 1),
        ];
        let mut session = session(&blocks, ProgressState::new());
        let answers: QuizAnswers = [("q1".to_owned(), "b".to_owned())].into_iter().collect();
        let staged = session.plan_role_quiz(blocks[0].id(), &answers).unwrap();
        let outcome = session.commit(staged);
        assert_eq!(outcome, StepOutcome::Recorded);
        assert_eq!(session.state().role(), Some("Y"));
        assert_eq!(session.current_index(), 0);
        assert!(session.current_rejection().is_none());
    }

    #[test]
    fn incomplete_quiz_answers_are_rejected() {
        let blocks = vec![block(BlockKind::RoleSelectionQuiz, quiz_content(), 0)];
        let session = session(&blocks, ProgressState::new());
        let err = session
            .plan_role_quiz(blocks[0].id(), &QuizAnswers::new())
            .unwrap_err();
        assert!(matches!(err, QuestError::Quiz(_)));
    }

    #[test]
    fn events_for_other_steps_are_rejected() {
        let blocks = vec![
            block(BlockKind::Text, Value::Null, 0),
            block(BlockKind::RoleDescription, Value::Null, 1),
        ];
        let session = session(&blocks, ProgressState::new());
        assert!(matches!(
            session.plan_acknowledge(blocks[1].id()),
            Err(QuestError::StepNotInteractive { index: 1 })
        ));
        assert!(matches!(
            session.plan_complete_video(blocks[0].id()),
            Err(QuestError::WrongBlockKind { .. })
        ));
        assert!(matches!(
            session.plan_acknowledge(BlockId::random()),
            Err(QuestError::UnknownBlock(_))
        ));
    }

    #[test]
    fn unskippable_video_completion_needs_threshold() {
        let blocks = vec![
            block(
                BlockKind::UnskippableVideo,
                json!({ "source": "v.mp4", "threshold_percent": 90 }),
                0,
            ),
            block(BlockKind::Text, Value::Null, 1),
        ];
        let id = blocks[0].id();
        let mut session = session(&blocks, ProgressState::new());

        let staged = session.plan_complete_video(id).unwrap();
        assert!(staged.outcome.is_blocked());

        session.commit(session.plan_video_progress(id, 91).unwrap());
        let outcome = session.commit(session.plan_complete_video(id).unwrap());
        assert_eq!(outcome, StepOutcome::Moved { from: 0, to: 1 });
        assert!(session.state().is_completed(id));
    }

    #[test]
    fn repeated_video_report_issues_no_write() {
        let blocks = vec![block(BlockKind::SkippableVideo, Value::Null, 0)];
        let id = blocks[0].id();
        let mut session = session(&blocks, ProgressState::new());
        session.commit(session.plan_video_progress(id, 50).unwrap());
        let staged = session.plan_video_progress(id, 20).unwrap();
        assert!(staged.next.is_none());
        assert_eq!(staged.outcome, StepOutcome::Unchanged);
    }

    #[test]
    fn malformed_video_content_is_reported() {
        let blocks = vec![
            block(
                BlockKind::UnskippableVideo,
                json!({ "source": "v.mp4", "threshold_percent": 150 }),
                0,
            ),
            block(BlockKind::Text, Value::Null, 1),
        ];
        let id = blocks[0].id();
        let session = session(&blocks, ProgressState::new());

        assert!(matches!(
            session.plan_video_progress(id, 100),
            Err(QuestError::Content(_))
        ));
        assert!(matches!(
            session.plan_complete_video(id),
            Err(QuestError::Content(_))
        ));
    }

    #[test]
    fn auto_advance_stops_on_last_step() {
        let blocks = vec![block(BlockKind::RoleDescription, Value::Null, 0)];
        let mut session = session(&blocks, ProgressState::new());
        let outcome = session.commit(session.plan_acknowledge(blocks[0].id()).unwrap());
        assert_eq!(outcome, StepOutcome::Recorded);
        assert_eq!(session.current_index(), 0);
        assert!(session.state().is_completed(blocks[0].id()));
    }

    #[test]
    fn empty_table_cannot_be_completed() {
        let blocks = vec![block(BlockKind::DiagnosticTable, Value::Null, 0)];
        let session = session(&blocks, ProgressState::new());
        let staged = session.plan_complete_table(blocks[0].id()).unwrap();
        assert_eq!(
            staged.outcome.message(),
            Some("Add at least one row and save the table.")
        );
    }

    #[test]
    fn form_needs_every_answer_and_does_not_advance() {
        let blocks = vec![
            block(
                BlockKind::SequentialForm,
                json!({ "steps": [{ "id": "a" }, { "id": "b" }] }),
                0,
            ),
            block(BlockKind::Text, Value::Null, 1),
        ];
        let id = blocks[0].id();
        let mut session = session(&blocks, ProgressState::new());

        session.commit(session.plan_form_answer(id, "a", "one").unwrap());
        assert!(
            session
                .plan_complete_form(id, None)
                .unwrap()
                .outcome
                .is_blocked()
        );
        assert!(matches!(
            session.plan_form_answer(id, "zzz", "x"),
            Err(QuestError::UnknownFormStep { .. })
        ));

        session.commit(session.plan_form_answer(id, "b", "two").unwrap());
        let staged = session
            .plan_complete_form(id, Some("summary".into()))
            .unwrap();
        let outcome = session.commit(staged);
        assert_eq!(outcome, StepOutcome::Recorded);
        assert_eq!(session.current_index(), 0);
        assert_eq!(session.state().form().summary.as_deref(), Some("summary"));
    }

    #[test]
    fn finish_only_from_last_open_step() {
        let blocks = vec![
            block(BlockKind::Text, Value::Null, 0),
            block(BlockKind::SequentialForm, Value::Null, 1),
        ];
        let mut session = session(&blocks, ProgressState::new());
        assert!(matches!(
            session.plan_finish(fixed_now()),
            Err(QuestError::NotLastStep { current: 0, last: 1 })
        ));

        session.commit(session.plan_next().unwrap());
        assert!(session.plan_finish(fixed_now()).unwrap().outcome.is_blocked());

        session.commit(session.plan_complete_form(blocks[1].id(), None).unwrap());
        let outcome = session.commit(session.plan_finish(fixed_now()).unwrap());
        assert_eq!(
            outcome,
            StepOutcome::Finished {
                completed_at: fixed_now()
            }
        );
        assert!(session.is_finished());
        assert!(matches!(session.plan_back(), Err(QuestError::Finished)));
        assert!(matches!(
            session.plan_finish(fixed_now()),
            Err(QuestError::Finished)
        ));
    }

    #[test]
    fn reset_rules() {
        let blocks = vec![
            block(BlockKind::Text, Value::Null, 0),
            block(BlockKind::DiagnosticTable, Value::Null, 1),
            block(BlockKind::SequentialForm, Value::Null, 2),
        ];
        let session = session(&blocks, ProgressState::new());
        assert!(matches!(
            session.reset_scope(blocks[0].id()),
            Err(QuestError::WrongBlockKind { .. })
        ));
        assert!(matches!(
            session.reset_scope(blocks[2].id()),
            Err(QuestError::StepNotVisited { index: 2 })
        ));
    }

    #[test]
    fn form_reset_keeps_index() {
        let blocks = vec![
            block(BlockKind::Text, Value::Null, 0),
            block(BlockKind::SequentialForm, Value::Null, 1),
        ];
        let mut state = ProgressState::new();
        state.set_current_step_index(1);
        state.set_form_answer("a", "x");
        state.complete_form(None);
        state.mark_completed(blocks[1].id());
        let session = session(&blocks, state);

        let scope = session.reset_scope(blocks[1].id()).unwrap();
        let staged = session.plan_local_reset(blocks[1].id(), scope);
        assert_eq!(staged.outcome, StepOutcome::Recorded);
        let next = staged.next.unwrap();
        assert_eq!(next.current_step_index(), 1);
        assert!(next.form().is_empty());
        assert!(!next.is_completed(blocks[1].id()));
    }
}
