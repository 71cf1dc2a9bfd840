use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::ids::BlockId;

/// Default share of an unskippable video that must be watched, in percent.
pub const DEFAULT_VIDEO_THRESHOLD_PERCENT: u8 = 95;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BlockContentError {
    #[error("block {block_id} has malformed content: {message}")]
    Malformed { block_id: BlockId, message: String },

    #[error("block {block_id} has threshold {value}%, expected 0..=100")]
    InvalidThreshold { block_id: BlockId, value: u8 },

    #[error("quiz block {block_id} has no questions")]
    EmptyQuiz { block_id: BlockId },
}

fn parse<T: DeserializeOwned + Default>(block_id: BlockId, value: &Value) -> Result<T, BlockContentError> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value.clone()).map_err(|e| BlockContentError::Malformed {
        block_id,
        message: e.to_string(),
    })
}

//
// ─── VIDEO ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoContent {
    #[serde(alias = "video_url", alias = "url")]
    pub source: String,
    pub threshold_percent: u8,
    /// Lets an administrator open the gate of a video that has no source yet.
    pub admin_bypass: bool,
}

impl Default for VideoContent {
    fn default() -> Self {
        Self {
            source: String::new(),
            threshold_percent: DEFAULT_VIDEO_THRESHOLD_PERCENT,
            admin_bypass: false,
        }
    }
}

impl VideoContent {
    pub(crate) fn from_value(block_id: BlockId, value: &Value) -> Result<Self, BlockContentError> {
        let content: Self = parse(block_id, value)?;
        if content.threshold_percent > 100 {
            return Err(BlockContentError::InvalidThreshold {
                block_id,
                value: content.threshold_percent,
            });
        }
        Ok(content)
    }

    #[must_use]
    pub fn has_source(&self) -> bool {
        !self.source.trim().is_empty()
    }
}

//
// ─── ROLE QUIZ ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RoleQuizContent {
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: String,
    #[serde(default)]
    pub prompt: String,
    pub options: Vec<QuizOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
    pub id: String,
    #[serde(default)]
    pub label: String,
    /// Role this option votes for.
    pub role: String,
}

impl RoleQuizContent {
    pub(crate) fn from_value(block_id: BlockId, value: &Value) -> Result<Self, BlockContentError> {
        let content: Self = parse(block_id, value)?;
        if content.questions.is_empty() {
            return Err(BlockContentError::EmptyQuiz { block_id });
        }
        Ok(content)
    }
}

//
// ─── SEQUENTIAL FORM ───────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FormContent {
    pub steps: Vec<FormStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormStep {
    pub id: String,
    #[serde(default)]
    pub prompt: String,
}

impl FormContent {
    pub(crate) fn from_value(block_id: BlockId, value: &Value) -> Result<Self, BlockContentError> {
        parse(block_id, value)
    }

    #[must_use]
    pub fn has_step(&self, step_id: &str) -> bool {
        self.steps.iter().any(|s| s.id == step_id)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
