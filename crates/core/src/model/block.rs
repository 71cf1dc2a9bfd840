use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::model::content::{BlockContentError, FormContent, RoleQuizContent, VideoContent};
use crate::model::ids::BlockId;

//
// ─── BLOCK KIND ────────────────────────────────────────────────────────────────
//

/// Type tag of an authored block.
///
/// Unknown tags are preserved in `Other` so that a catalog written by a newer
/// authoring tool still loads; they behave like plain pass-through steps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BlockKind {
    Heading,
    Divider,
    Image,
    Text,
    Callout,
    Accordion,
    Tabs,
    StepList,
    Timeline,
    RoleSelectionQuiz,
    RoleDescription,
    UnskippableVideo,
    SkippableVideo,
    DiagnosticTable,
    SequentialForm,
    Other(String),
}

impl BlockKind {
    /// Parses a storage tag. Never fails.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "heading" => Self::Heading,
            "divider" => Self::Divider,
            "image" => Self::Image,
            "text" => Self::Text,
            "callout" => Self::Callout,
            "accordion" => Self::Accordion,
            "tabs" => Self::Tabs,
            "step_list" => Self::StepList,
            "timeline" => Self::Timeline,
            "role_selection_quiz" => Self::RoleSelectionQuiz,
            "role_description" => Self::RoleDescription,
            "unskippable_video" => Self::UnskippableVideo,
            "skippable_video" => Self::SkippableVideo,
            "diagnostic_table" => Self::DiagnosticTable,
            "sequential_form" => Self::SequentialForm,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Storage tag for this kind.
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Heading => "heading",
            Self::Divider => "divider",
            Self::Image => "image",
            Self::Text => "text",
            Self::Callout => "callout",
            Self::Accordion => "accordion",
            Self::Tabs => "tabs",
            Self::StepList => "step_list",
            Self::Timeline => "timeline",
            Self::RoleSelectionQuiz => "role_selection_quiz",
            Self::RoleDescription => "role_description",
            Self::UnskippableVideo => "unskippable_video",
            Self::SkippableVideo => "skippable_video",
            Self::DiagnosticTable => "diagnostic_table",
            Self::SequentialForm => "sequential_form",
            Self::Other(tag) => tag,
        }
    }

    /// Purely decorative kinds are not steps: they are never gated and do not
    /// count toward progress.
    #[must_use]
    pub fn is_decorative(&self) -> bool {
        matches!(self, Self::Heading | Self::Divider | Self::Image)
    }

    #[must_use]
    pub fn is_step(&self) -> bool {
        !self.is_decorative()
    }

    #[must_use]
    pub fn is_video(&self) -> bool {
        matches!(self, Self::UnskippableVideo | Self::SkippableVideo)
    }
}

impl From<String> for BlockKind {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<BlockKind> for String {
    fn from(kind: BlockKind) -> Self {
        kind.tag().to_owned()
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

//
// ─── BLOCK ─────────────────────────────────────────────────────────────────────
//

/// Authored content unit, immutable from the progression engine's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    id: BlockId,
    #[serde(rename = "type", alias = "kind")]
    kind: BlockKind,
    #[serde(default)]
    content: Value,
    #[serde(default)]
    position: u32,
}

impl Block {
    #[must_use]
    pub fn new(id: BlockId, kind: BlockKind, content: Value, position: u32) -> Self {
        Self {
            id,
            kind,
            content,
            position,
        }
    }

    #[must_use]
    pub fn id(&self) -> BlockId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> &BlockKind {
        &self.kind
    }

    /// Raw type-specific payload.
    #[must_use]
    pub fn content(&self) -> &Value {
        &self.content
    }

    #[must_use]
    pub fn position(&self) -> u32 {
        self.position
    }

    #[must_use]
    pub fn is_step(&self) -> bool {
        self.kind.is_step()
    }

    /// Video settings. Missing fields fall back to their defaults, so this only
    /// fails on a payload of the wrong shape.
    ///
    /// # Errors
    ///
    /// Returns `BlockContentError` if the payload cannot be read as video content.
    pub fn video(&self) -> Result<VideoContent, BlockContentError> {
        VideoContent::from_value(self.id, &self.content)
    }

    /// Quiz questions and the role each option votes for.
    ///
    /// # Errors
    ///
    /// Returns `BlockContentError` if the payload cannot be read as a quiz.
    pub fn role_quiz(&self) -> Result<RoleQuizContent, BlockContentError> {
        RoleQuizContent::from_value(self.id, &self.content)
    }

    /// Ordered form steps.
    ///
    /// # Errors
    ///
    /// Returns `BlockContentError` if the payload cannot be read as a form.
    pub fn form(&self) -> Result<FormContent, BlockContentError> {
        FormContent::from_value(self.id, &self.content)
    }
}

/// Filters an authored sequence down to step blocks, preserving lesson order.
///
/// Input order is normalised by `position` first; ties keep their catalog order.
#[must_use]
pub fn step_blocks(blocks: &[Block]) -> Vec<Block> {
    let mut ordered: Vec<&Block> = blocks.iter().collect();
    ordered.sort_by_key(|b| b.position());
    ordered
        .into_iter()
        .filter(|b| b.is_step())
        .cloned()
        .collect()
}

/// One entry of an exported catalog file. `position` may be left out.
#[derive(Deserialize)]
struct CatalogEntry {
    id: BlockId,
    #[serde(rename = "type", alias = "kind")]
    kind: BlockKind,
    #[serde(default)]
    content: Value,
    position: Option<u32>,
}

/// Parses a JSON array of `{id, type, content}` blocks. Entries without an
/// explicit `position` take their index in the array.
///
/// # Errors
///
/// Returns `serde_json::Error` if the text is not such an array.
pub fn blocks_from_catalog_json(raw: &str) -> Result<Vec<Block>, serde_json::Error> {
    let entries: Vec<CatalogEntry> = serde_json::from_str(raw)?;
    Ok(entries
        .into_iter()
        .zip(0_u32..)
        .map(|(entry, index)| {
            Block::new(
                entry.id,
                entry.kind,
                entry.content,
                entry.position.unwrap_or(index),
            )
        })
        .collect())
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
