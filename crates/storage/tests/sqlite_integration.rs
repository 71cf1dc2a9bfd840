use quest_core::ResetScope;
use quest_core::model::{
    Block, BlockId, BlockKind, LearnerId, LessonId, ProgressPatch, ProgressState, TableRow,
};
use quest_core::quiz::QuizAnswers;
use quest_core::time::fixed_now;
use serde_json::json;
use storage::repository::{BlockCatalog, ProgressStore, Storage, StorageError};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn commit(before: &ProgressState, after: &ProgressState) -> ProgressPatch {
    ProgressPatch::between(before, after)
}

#[tokio::test]
async fn sqlite_creates_missing_database_file() {
    let path = std::env::temp_dir().join(format!("quest-{}.sqlite3", uuid::Uuid::new_v4()));
    assert!(!path.exists());

    let storage = Storage::sqlite(&format!("sqlite:{}", path.display()))
        .await
        .expect("open fresh database");
    assert!(path.exists());

    let lesson = LessonId::random();
    let block = Block::new(BlockId::random(), BlockKind::Text, json!({}), 0);
    storage.catalog.upsert_block(lesson, &block).await.unwrap();
    assert_eq!(storage.catalog.lesson_blocks(lesson).await.unwrap(), vec![block]);

    drop(storage);
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
}

#[tokio::test]
async fn sqlite_roundtrip_persists_every_progress_field() {
    let repo = connect("memdb_progress_roundtrip").await;
    let learner = LearnerId::random();
    let lesson = LessonId::random();
    let quiz = BlockId::random();
    let video = BlockId::random();

    assert!(repo.load(learner, lesson).await.unwrap().is_none());

    let mut state = ProgressState::new();
    state.set_revision(1);
    state.set_current_step_index(3);
    state.mark_completed(quiz);
    state.set_role(Some("builder".into()));
    state.record_video_progress(video, 72);
    state.push_table_row(TableRow::new([("area", "health"), ("score", "7")]));
    state.set_table_completed(true);
    state.set_form_answer("goal", "ship it");
    state.complete_form(Some("a summary".into()));
    state.set_completed_at(fixed_now());

    repo.merge(learner, lesson, &commit(&ProgressState::new(), &state))
        .await
        .unwrap();

    let stored = repo.load(learner, lesson).await.unwrap().unwrap();
    assert_eq!(stored, state);
}

#[tokio::test]
async fn sqlite_merge_rejects_stale_revision_and_keeps_newer_index() {
    let repo = connect("memdb_progress_stale").await;
    let learner = LearnerId::random();
    let lesson = LessonId::random();

    let newer = ProgressPatch {
        revision: 2,
        current_step_index: Some(4),
        ..ProgressPatch::default()
    };
    let older = ProgressPatch {
        revision: 1,
        current_step_index: Some(2),
        ..ProgressPatch::default()
    };

    repo.merge(learner, lesson, &newer).await.unwrap();
    let err = repo.merge(learner, lesson, &older).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict { stored: 2, incoming: 1 }));

    let stored = repo.load(learner, lesson).await.unwrap().unwrap();
    assert_eq!(stored.current_step_index(), 4);
}

#[tokio::test]
async fn sqlite_video_progress_merges_with_max() {
    let repo = connect("memdb_progress_video").await;
    let learner = LearnerId::random();
    let lesson = LessonId::random();
    let video = BlockId::random();

    let mut first = ProgressState::new();
    first.set_revision(1);
    first.record_video_progress(video, 80);
    repo.merge(learner, lesson, &commit(&ProgressState::new(), &first))
        .await
        .unwrap();

    // A patch built from a lagging local copy must not pull the value down.
    let patch = ProgressPatch {
        revision: 2,
        video_progress: Some([(video, 30)].into_iter().collect()),
        ..ProgressPatch::default()
    };
    repo.merge(learner, lesson, &patch).await.unwrap();

    let stored = repo.load(learner, lesson).await.unwrap().unwrap();
    assert_eq!(stored.video_progress(video), Some(80));
}

#[tokio::test]
async fn sqlite_role_reset_clears_answers_and_leaves_table() {
    let repo = connect("memdb_role_reset").await;
    let learner = LearnerId::random();
    let lesson = LessonId::random();
    let quiz = BlockId::random();
    let table = BlockId::random();

    let mut state = ProgressState::new();
    state.set_revision(1);
    state.set_current_step_index(2);
    state.set_role(Some("architect".into()));
    state.mark_completed(quiz);
    state.mark_completed(table);
    state.push_table_row(TableRow::new([("area", "sleep")]));
    state.set_table_completed(true);
    repo.merge(learner, lesson, &commit(&ProgressState::new(), &state))
        .await
        .unwrap();

    let answers: QuizAnswers = [("q1".to_owned(), "a".to_owned())].into_iter().collect();
    repo.record_quiz_answers(learner, lesson, quiz, &answers)
        .await
        .unwrap();
    assert_eq!(
        repo.quiz_answers(learner, lesson, quiz).await.unwrap(),
        Some(answers)
    );

    repo.reset_block(learner, lesson, quiz, ResetScope::RoleQuiz)
        .await
        .unwrap();

    let stored = repo.load(learner, lesson).await.unwrap().unwrap();
    assert_eq!(stored.role(), None);
    assert!(!stored.is_completed(quiz));
    assert!(stored.is_completed(table));
    assert!(stored.table().completed);
    assert_eq!(stored.current_step_index(), 2);
    assert_eq!(stored.revision(), 2);
    assert!(
        repo.quiz_answers(learner, lesson, quiz)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn sqlite_catalog_orders_and_removes_blocks() {
    let repo = connect("memdb_catalog").await;
    let lesson = LessonId::random();
    let other_lesson = LessonId::random();

    let video = Block::new(
        BlockId::random(),
        BlockKind::UnskippableVideo,
        json!({ "source": "v.mp4", "threshold_percent": 80 }),
        2,
    );
    let heading = Block::new(
        BlockId::random(),
        BlockKind::Heading,
        json!({ "text": "Intro" }),
        0,
    );
    let custom = Block::new(
        BlockId::random(),
        BlockKind::from_tag("poll"),
        serde_json::Value::Null,
        1,
    );
    for block in [&video, &heading, &custom] {
        repo.upsert_block(lesson, block).await.unwrap();
    }
    repo.upsert_block(
        other_lesson,
        &Block::new(BlockId::random(), BlockKind::Text, serde_json::Value::Null, 0),
    )
    .await
    .unwrap();

    let blocks = repo.lesson_blocks(lesson).await.unwrap();
    let ids: Vec<BlockId> = blocks.iter().map(Block::id).collect();
    assert_eq!(ids, vec![heading.id(), custom.id(), video.id()]);
    assert_eq!(blocks[1].kind(), &BlockKind::Other("poll".into()));
    assert_eq!(blocks[2].video().unwrap().threshold_percent, 80);

    repo.remove_block(lesson, custom.id()).await.unwrap();
    assert_eq!(repo.lesson_blocks(lesson).await.unwrap().len(), 2);

    let err = repo.remove_block(lesson, custom.id()).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}
