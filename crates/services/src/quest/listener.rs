use chrono::{DateTime, Utc};
use quest_core::model::{LearnerId, LessonId};

/// Notified once per lesson, when the learner commits the Finish transition.
pub trait LessonCompletionListener: Send + Sync {
    fn lesson_completed(&self, learner: LearnerId, lesson: LessonId, completed_at: DateTime<Utc>);
}
