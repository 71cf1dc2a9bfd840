mod block;
pub mod content;
mod ids;
mod patch;
mod progress;

pub use block::{blocks_from_catalog_json, step_blocks, Block, BlockKind};
pub use content::{
    BlockContentError, FormContent, FormStep, QuizOption, QuizQuestion, RoleQuizContent,
    VideoContent, DEFAULT_VIDEO_THRESHOLD_PERCENT,
};
pub use ids::{BlockId, LearnerId, LessonId, ParseIdError};
pub use patch::ProgressPatch;
pub use progress::{FormState, ProgressError, ProgressParts, ProgressState, TableRow, TableState};
