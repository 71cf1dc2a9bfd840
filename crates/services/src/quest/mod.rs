mod listener;
mod progress;
mod reset;
mod session;
mod workflow;

// Public API of the quest subsystem.
pub use crate::error::QuestError;
pub use listener::LessonCompletionListener;
pub use progress::{QuestProgress, StepOutcome};
pub use session::QuestSession;
pub use workflow::QuestService;
