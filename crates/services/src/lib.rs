#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod quest;

pub use quest_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, QuestError};
pub use quest::{
    LessonCompletionListener, QuestProgress, QuestService, QuestSession, StepOutcome,
};
