use std::fmt;

use quest_core::model::{Block, BlockId, BlockKind, LessonId};
use serde_json::{Value, json};
use storage::repository::Storage;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    lesson_id: LessonId,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidLessonId { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidLessonId { raw } => write!(f, "invalid --lesson value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

/// Lesson id used when neither `--lesson` nor `QUEST_LESSON_ID` is given.
const DEMO_LESSON: Uuid = Uuid::from_u128(0x6d2f_1c0e_4a1b_4b7e_9f3d_0000_0000_0001);

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("QUEST_DB_URL").unwrap_or_else(|_| "sqlite:quest.sqlite3".into());
        let mut lesson_id = std::env::var("QUEST_LESSON_ID")
            .ok()
            .and_then(|value| value.parse::<LessonId>().ok())
            .unwrap_or_else(|| LessonId::new(DEMO_LESSON));

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--lesson" => {
                    let value = require_value(&mut args, "--lesson")?;
                    lesson_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidLessonId { raw: value.clone() })?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self { db_url, lesson_id })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:quest.sqlite3)");
    eprintln!("  --lesson <uuid>           Lesson id to (re)write");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  QUEST_DB_URL, QUEST_LESSON_ID");
}

// Stable per-position ids so reseeding overwrites instead of duplicating.
fn block_id(lesson: LessonId, position: u32) -> BlockId {
    BlockId::new(Uuid::from_u128(
        lesson.value().as_u128() ^ (u128::from(position) + 1),
    ))
}

fn demo_blocks(lesson: LessonId) -> Vec<Block> {
    let layout: Vec<(BlockKind, Value)> = vec![
        (BlockKind::Heading, json!({ "text": "Find your role" })),
        (
            BlockKind::RoleSelectionQuiz,
            json!({
                "questions": [
                    {
                        "id": "q1",
                        "prompt": "When a project starts, you usually...",
                        "options": [
                            { "id": "a", "label": "sketch the plan", "role": "architect" },
                            { "id": "b", "label": "start building", "role": "builder" }
                        ]
                    },
                    {
                        "id": "q2",
                        "prompt": "A deadline slips. You...",
                        "options": [
                            { "id": "a", "label": "re-plan the scope", "role": "architect" },
                            { "id": "b", "label": "work late to ship", "role": "builder" }
                        ]
                    }
                ]
            }),
        ),
        (BlockKind::RoleDescription, json!({ "text": "What your role means" })),
        (BlockKind::Text, json!({ "text": "Before the video, a short note." })),
        (
            BlockKind::UnskippableVideo,
            json!({ "source": "https://videos.example.com/intro.mp4", "threshold_percent": 90 }),
        ),
        (BlockKind::Divider, Value::Null),
        (BlockKind::DiagnosticTable, json!({ "columns": ["area", "score"] })),
        (
            BlockKind::SequentialForm,
            json!({
                "steps": [
                    { "id": "goal", "prompt": "Where do you want to be in a year?" },
                    { "id": "obstacle", "prompt": "What is in the way?" }
                ]
            }),
        ),
        (
            BlockKind::SkippableVideo,
            json!({ "source": "https://videos.example.com/outro.mp4" }),
        ),
    ];

    layout
        .into_iter()
        .zip(0_u32..)
        .map(|((kind, content), position)| {
            Block::new(block_id(lesson, position), kind, content, position)
        })
        .collect()
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;

    let blocks = demo_blocks(args.lesson_id);
    for block in &blocks {
        storage.catalog.upsert_block(args.lesson_id, block).await?;
    }

    let steps = blocks.iter().filter(|b| b.is_step()).count();
    println!(
        "Seeded lesson {} with {} blocks ({} steps) into {}",
        args.lesson_id,
        blocks.len(),
        steps,
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
