use std::sync::Arc;
use std::time::Duration;

use quiz_core::model::AppSettings;
use storage::repository::Storage;

use crate::Clock;
use crate::config::MirrorConfig;
use crate::error::AppServicesError;
use crate::history::ResultHistoryService;
use crate::progress::LevelProgressService;
use crate::remote::{HttpResultMirror, ResultMirror};
use crate::sessions::QuizLoopService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    settings: AppSettings,
    quiz_loop: Arc<QuizLoopService>,
    progress: Arc<LevelProgressService>,
    history: Arc<ResultHistoryService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails or the
    /// mirror client cannot be built.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        settings: AppSettings,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::from_storage(&storage, clock, settings)
    }

    /// Build services over fresh in-memory storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the mirror client cannot be built.
    pub fn in_memory(clock: Clock, settings: AppSettings) -> Result<Self, AppServicesError> {
        Self::from_storage(&Storage::in_memory(), clock, settings)
    }

    /// # Errors
    ///
    /// Returns `AppServicesError::Mirror` if the mirror client cannot be built.
    pub fn from_storage(
        storage: &Storage,
        clock: Clock,
        settings: AppSettings,
    ) -> Result<Self, AppServicesError> {
        let progress = Arc::new(LevelProgressService::new(Arc::clone(&storage.levels)));
        let history = Arc::new(ResultHistoryService::new(Arc::clone(&storage.results)));

        let mut quiz_loop = QuizLoopService::new(
            clock,
            Arc::clone(&storage.quizzes),
            Arc::clone(&storage.results),
            Arc::clone(&progress),
        )
        .with_shuffle_questions(settings.shuffle_questions());

        if let Some(config) = MirrorConfig::from_settings(&settings) {
            let mirror: Arc<dyn ResultMirror> = Arc::new(HttpResultMirror::new(&config)?);
            tracing::info!(base_url = %config.base_url, "result mirroring enabled");
            quiz_loop = quiz_loop.with_mirror(mirror);
        }

        Ok(Self {
            settings,
            quiz_loop: Arc::new(quiz_loop),
            progress,
            history,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    #[must_use]
    pub fn quiz_loop(&self) -> Arc<QuizLoopService> {
        Arc::clone(&self.quiz_loop)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<LevelProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn history(&self) -> Arc<ResultHistoryService> {
        Arc::clone(&self.history)
    }

    /// Wait for background mirror submissions before the runtime shuts down.
    ///
    /// The wait is bounded by the mirror timeout plus one second, so the HTTP
    /// client gives up first. Returns `false` if some submissions were cut off.
    pub async fn shutdown(&self) -> bool {
        let limit = Duration::from_secs(u64::from(self.settings.mirror_timeout_secs()) + 1);
        self.quiz_loop.mirror_tasks().drain(limit).await
    }
}
