use std::sync::Arc;

use storage::repository::{BlockCatalog, Storage};

use crate::Clock;
use crate::error::AppServicesError;
use crate::quest::{LessonCompletionListener, QuestService};

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    catalog: Arc<dyn BlockCatalog>,
    quest: Arc<QuestService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock, None))
    }

    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::from_storage(&Storage::in_memory(), clock, None)
    }

    #[must_use]
    pub fn from_storage(
        storage: &Storage,
        clock: Clock,
        listener: Option<Arc<dyn LessonCompletionListener>>,
    ) -> Self {
        let mut quest = QuestService::new(
            clock,
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.progress),
        );
        if let Some(listener) = listener {
            quest = quest.with_listener(listener);
        }

        Self {
            catalog: Arc::clone(&storage.catalog),
            quest: Arc::new(quest),
        }
    }

    /// Replace the quest service with one that reports lesson completion.
    #[must_use]
    pub fn with_completion_listener(mut self, listener: Arc<dyn LessonCompletionListener>) -> Self {
        let quest = (*self.quest).clone().with_listener(listener);
        self.quest = Arc::new(quest);
        self
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<dyn BlockCatalog> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn quest(&self) -> Arc<QuestService> {
        Arc::clone(&self.quest)
    }
}
