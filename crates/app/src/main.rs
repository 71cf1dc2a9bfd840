use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use quest_core::model::{BlockId, LearnerId, LessonId, TableRow, blocks_from_catalog_json};
use quest_core::quiz::QuizAnswers;
use services::{AppServices, Clock, LessonCompletionListener, QuestService, QuestSession};
use storage::repository::BlockCatalog;
use tracing_subscriber::EnvFilter;

mod render;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingId { flag: &'static str, env: &'static str },
    MissingCommandArg { command: &'static str, what: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    InvalidNumber { raw: String },
    InvalidPair { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingId { flag, env } => write!(f, "{flag} (or {env}) is required"),
            ArgsError::MissingCommandArg { command, what } => {
                write!(f, "{command} requires {what}")
            }
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNumber { raw } => write!(f, "invalid number: {raw}"),
            ArgsError::InvalidPair { raw } => write!(f, "expected key=value, got: {raw}"),
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- [options] <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  status                      Show visible steps (default)");
    eprintln!("  next | back | goto <n>      Move between steps (n is 1-based)");
    eprintln!("  finish                      Finish the lesson from the last step");
    eprintln!("  quiz <question=option>...   Submit the role quiz");
    eprintln!("  ack                         Confirm the role description");
    eprintln!("  watch <percent>             Report video progress");
    eprintln!("  watched                     Report the end of the video");
    eprintln!("  row <column=value>...       Add a diagnostic table row");
    eprintln!("  save-table                  Save the diagnostic table");
    eprintln!("  answer <step_id> <text>     Answer one form question");
    eprintln!("  submit-form [summary]       Submit the form");
    eprintln!("  reset <block_id>            Clear one block's data");
    eprintln!("  import <file.json>          Write a JSON array of blocks to the lesson");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>           SQLite URL (default: sqlite://quest.sqlite3)");
    eprintln!("  --lesson <uuid>             Lesson id");
    eprintln!("  --learner <uuid>            Learner id");
    eprintln!("  -h, --help                  Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUEST_DB_URL, QUEST_LESSON_ID, QUEST_LEARNER_ID, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Status,
    Next,
    Back,
    GoTo(usize),
    Finish,
    Quiz(QuizAnswers),
    Acknowledge,
    Watch(u8),
    Watched,
    Row(Vec<(String, String)>),
    SaveTable,
    Answer { step_id: String, text: String },
    SubmitForm(Option<String>),
    Reset(BlockId),
    Import(String),
}

fn split_pairs(raw: Vec<String>) -> Result<Vec<(String, String)>, ArgsError> {
    raw.into_iter()
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_owned(), v.trim().to_owned())),
            _ => Err(ArgsError::InvalidPair { raw: pair }),
        })
        .collect()
}

impl Command {
    fn parse(name: &str, rest: Vec<String>) -> Result<Self, ArgsError> {
        let mut rest_iter = rest.clone().into_iter();
        let cmd = match name {
            "status" => Self::Status,
            "next" => Self::Next,
            "back" => Self::Back,
            "goto" => {
                let raw = rest_iter.next().ok_or(ArgsError::MissingCommandArg {
                    command: "goto",
                    what: "a step number",
                })?;
                let step: usize = raw
                    .parse()
                    .ok()
                    .filter(|n| *n >= 1)
                    .ok_or(ArgsError::InvalidNumber { raw })?;
                Self::GoTo(step - 1)
            }
            "finish" => Self::Finish,
            "quiz" => Self::Quiz(split_pairs(rest)?.into_iter().collect()),
            "ack" => Self::Acknowledge,
            "watch" => {
                let raw = rest_iter.next().ok_or(ArgsError::MissingCommandArg {
                    command: "watch",
                    what: "a percentage",
                })?;
                let percent: u8 = raw
                    .parse()
                    .ok()
                    .filter(|p| *p <= 100)
                    .ok_or(ArgsError::InvalidNumber { raw })?;
                Self::Watch(percent)
            }
            "watched" => Self::Watched,
            "row" => {
                if rest.is_empty() {
                    return Err(ArgsError::MissingCommandArg {
                        command: "row",
                        what: "at least one column=value",
                    });
                }
                Self::Row(split_pairs(rest)?)
            }
            "save-table" => Self::SaveTable,
            "answer" => {
                let step_id = rest_iter.next().ok_or(ArgsError::MissingCommandArg {
                    command: "answer",
                    what: "a step id",
                })?;
                let text: Vec<String> = rest_iter.collect();
                Self::Answer {
                    step_id,
                    text: text.join(" "),
                }
            }
            "submit-form" => {
                let summary = rest.join(" ");
                Self::SubmitForm((!summary.trim().is_empty()).then_some(summary))
            }
            "reset" => {
                let raw = rest_iter.next().ok_or(ArgsError::MissingCommandArg {
                    command: "reset",
                    what: "a block id",
                })?;
                let id = raw.parse().map_err(|_| ArgsError::InvalidId {
                    flag: "reset",
                    raw: raw.clone(),
                })?;
                Self::Reset(id)
            }
            "import" => Self::Import(rest_iter.next().ok_or(ArgsError::MissingCommandArg {
                command: "import",
                what: "a file path",
            })?),
            other => return Err(ArgsError::UnknownCommand(other.to_owned())),
        };
        Ok(cmd)
    }
}

struct Args {
    db_url: String,
    lesson: LessonId,
    learner: Option<LearnerId>,
    command: Command,
}

fn parse_id<T: std::str::FromStr>(flag: &'static str, raw: String) -> Result<T, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidId { flag, raw })
}

impl Args {
    fn parse(args: impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("QUEST_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://quest.sqlite3".into(), normalize_sqlite_url);
        let mut lesson = std::env::var("QUEST_LESSON_ID")
            .ok()
            .and_then(|value| value.parse::<LessonId>().ok());
        let mut learner = std::env::var("QUEST_LEARNER_ID")
            .ok()
            .and_then(|value| value.parse::<LearnerId>().ok());

        let mut positional = Vec::new();
        let mut args = args;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--lesson" => {
                    lesson = Some(parse_id("--lesson", require_value(&mut args, "--lesson")?)?);
                }
                "--learner" => {
                    learner = Some(parse_id("--learner", require_value(&mut args, "--learner")?)?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ if arg.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        let command = match positional.next() {
            None => Command::Status,
            Some(name) => Command::parse(&name, positional.collect())?,
        };
        let lesson = lesson.ok_or(ArgsError::MissingId {
            flag: "--lesson",
            env: "QUEST_LESSON_ID",
        })?;
        if learner.is_none() && !matches!(command, Command::Import(_)) {
            return Err(ArgsError::MissingId {
                flag: "--learner",
                env: "QUEST_LEARNER_ID",
            });
        }

        Ok(Self {
            db_url,
            lesson,
            learner,
            command,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim();
    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = std::path::Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

struct PrintCompletion;

impl LessonCompletionListener for PrintCompletion {
    fn lesson_completed(
        &self,
        learner: LearnerId,
        lesson: LessonId,
        completed_at: DateTime<Utc>,
    ) {
        println!("Congratulations, learner {learner} completed lesson {lesson} at {completed_at}.");
    }
}

async fn import_blocks(
    catalog: &dyn BlockCatalog,
    lesson: LessonId,
    path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let blocks = blocks_from_catalog_json(&raw)?;
    for block in &blocks {
        catalog.upsert_block(lesson, block).await?;
    }
    println!("Imported {} blocks into lesson {lesson}.", blocks.len());
    Ok(())
}

async fn apply(
    quest: &QuestService,
    session: &mut QuestSession,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    let current = session.current_block().id();
    let outcome = match command {
        Command::Status | Command::Import(_) => return Ok(()),
        Command::Next => quest.next(session).await?,
        Command::Back => quest.back(session).await?,
        Command::GoTo(index) => quest.go_to(session, index).await?,
        Command::Finish => quest.finish(session).await?,
        Command::Quiz(answers) => quest.submit_role_quiz(session, current, &answers).await?,
        Command::Acknowledge => quest.acknowledge_role_description(session, current).await?,
        Command::Watch(percent) => quest.report_video_progress(session, current, percent).await?,
        Command::Watched => quest.complete_video(session, current).await?,
        Command::Row(cells) => quest.add_table_row(session, current, TableRow::new(cells)).await?,
        Command::SaveTable => quest.complete_table(session, current).await?,
        Command::Answer { step_id, text } => {
            quest
                .answer_form_step(session, current, &step_id, &text)
                .await?
        }
        Command::SubmitForm(summary) => quest.complete_form(session, current, summary).await?,
        Command::Reset(block_id) => quest.reset_block(session, block_id).await?,
    };
    render::outcome(&outcome);
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    tracing::debug!(db_url = %args.db_url, lesson = %args.lesson, command = ?args.command, "starting");

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&args.db_url)?;
    let services = AppServices::new_sqlite(&args.db_url, Clock::system())
        .await?
        .with_completion_listener(Arc::new(PrintCompletion));

    if let Command::Import(path) = &args.command {
        return import_blocks(services.catalog().as_ref(), args.lesson, path).await;
    }
    let learner = args.learner.ok_or(ArgsError::MissingId {
        flag: "--learner",
        env: "QUEST_LEARNER_ID",
    })?;

    let quest = services.quest();
    let mut session = quest.open_lesson(learner, args.lesson).await?;
    apply(&quest, &mut session, args.command).await?;
    render::status(&session);
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
