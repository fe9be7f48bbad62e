use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use thiserror::Error;

use crate::repository::{LevelProgressRepository, QuizRepository, ResultRepository, Storage};

mod level_repo;
mod mapping;
mod migrate;
mod quiz_repo;
mod result_repo;

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl SqliteRepository {
    /// Connect to `SQLite` using the given URL.
    ///
    /// The file is created when missing. Connections enforce foreign keys and
    /// run in WAL mode with `synchronous = NORMAL`. A private `sqlite::memory:`
    /// database exists per connection, so its pool holds exactly one.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the URL is malformed or the connection
    /// cannot be established.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let max_connections = if is_private_memory(database_url) { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;
        tracing::debug!(database_url, max_connections, "sqlite pool connected");
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Build a `Storage` backed by `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url).await?;
        repo.migrate().await?;
        let quizzes: Arc<dyn QuizRepository> = Arc::new(repo.clone());
        let results: Arc<dyn ResultRepository> = Arc::new(repo.clone());
        let levels: Arc<dyn LevelProgressRepository> = Arc::new(repo);
        Ok(Self {
            quizzes,
            results,
            levels,
        })
    }
}

/// `sqlite::memory:` and bare `:memory:` URLs open a database per connection.
fn is_private_memory(database_url: &str) -> bool {
    let rest = database_url
        .strip_prefix("sqlite:")
        .unwrap_or(database_url)
        .trim_start_matches("//");
    rest.split('?').next() == Some(":memory:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_private_memory_urls_are_capped() {
        assert!(is_private_memory("sqlite::memory:"));
        assert!(is_private_memory("sqlite://:memory:"));
        assert!(is_private_memory(":memory:"));
        assert!(!is_private_memory("sqlite:file:shared?mode=memory&cache=shared"));
        assert!(!is_private_memory("sqlite:///tmp/quiz.sqlite3"));
    }

    #[test]
    fn repository_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SqliteRepository>();
    }
}
