use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::model::{Level, Quiz, QuizId, QuizKind, QuizResult, UserId};
use quiz_core::time::elapsed_secs;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A stored result together with its row id and owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub id: i64,
    pub user_id: UserId,
    pub level_achieved: Option<Level>,
    pub result: QuizResult,
}

impl ResultRow {
    #[must_use]
    pub fn new(id: i64, user_id: UserId, level_achieved: Option<Level>, result: QuizResult) -> Self {
        Self {
            id,
            user_id,
            level_achieved,
            result,
        }
    }
}

/// Header of a stored result, without the per-question breakdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSummary {
    pub id: i64,
    pub user_id: UserId,
    pub attempt_id: Uuid,
    pub quiz_id: QuizId,
    pub quiz_kind: QuizKind,
    pub total: u32,
    pub correct: u32,
    pub percentage: u32,
    pub level_achieved: Option<Level>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ResultSummary {
    #[must_use]
    pub fn from_row(row: &ResultRow) -> Self {
        let result = &row.result;
        Self {
            id: row.id,
            user_id: row.user_id,
            attempt_id: result.attempt_id(),
            quiz_id: result.quiz_id(),
            quiz_kind: result.quiz_kind().clone(),
            total: result.total_questions(),
            correct: result.correct_answers(),
            percentage: result.percentage(),
            level_achieved: row.level_achieved,
            started_at: result.started_at(),
            completed_at: result.completed_at(),
        }
    }

    /// Time spent, rounded to the nearest second.
    #[must_use]
    pub fn elapsed_secs(&self) -> u64 {
        elapsed_secs(self.started_at, self.completed_at)
    }
}

/// Catalog of quizzes available to start.
#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Persist or replace a quiz and its questions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the quiz cannot be stored.
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError>;

    /// Fetch a quiz by ID. Returns `Ok(None)` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn get_quiz(&self, id: QuizId) -> Result<Option<Quiz>, StorageError>;

    /// List quizzes ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn list_quizzes(&self, limit: u32) -> Result<Vec<Quiz>, StorageError>;
}

/// Append-only store of finished quiz results.
#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// Append a finished result and return its row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a result with the same attempt id
    /// is already stored, or other storage errors.
    async fn append_result(
        &self,
        user_id: UserId,
        result: &QuizResult,
        level_achieved: Option<Level>,
    ) -> Result<i64, StorageError>;

    /// Fetch a stored result by row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_result(&self, id: i64) -> Result<ResultRow, StorageError>;

    /// Results for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn list_results(&self, user_id: UserId, limit: u32)
    -> Result<Vec<ResultRow>, StorageError>;

    /// Result headers for a user, newest first, in the same order as
    /// `list_results`. Backends that store the breakdown separately should
    /// override this to skip loading it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn list_result_summaries(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<ResultSummary>, StorageError> {
        let rows = self.list_results(user_id, limit).await?;
        Ok(rows.iter().map(ResultSummary::from_row).collect())
    }
}

/// Per-profile level state: the highest level reached and the raw label
/// carried over from older profiles.
#[async_trait]
pub trait LevelProgressRepository: Send + Sync {
    /// Raw stored highest-level label, if any. May be outside the taxonomy.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn load_highest_level(&self, user_id: UserId) -> Result<Option<String>, StorageError>;

    /// Overwrite the stored highest level.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be stored.
    async fn save_highest_level(&self, user_id: UserId, level: Level) -> Result<(), StorageError>;

    /// Raw legacy label recorded for the profile, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn load_legacy_label(&self, user_id: UserId) -> Result<Option<String>, StorageError>;

    /// Record a legacy label, e.g. when importing older profiles.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be stored.
    async fn save_legacy_label(&self, user_id: UserId, label: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Default)]
struct ProfileLevels {
    highest: Option<String>,
    legacy: Option<String>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    quizzes: Arc<Mutex<HashMap<QuizId, Quiz>>>,
    results: Arc<Mutex<Vec<ResultRow>>>,
    profiles: Arc<Mutex<HashMap<UserId, ProfileLevels>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw highest-level label, bypassing the taxonomy.
    ///
    /// Lets tests reproduce profiles holding labels written by older builds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn set_raw_highest_level(&self, user_id: UserId, raw: &str) -> Result<(), StorageError> {
        let mut guard = lock(&self.profiles)?;
        guard.entry(user_id).or_default().highest = Some(raw.to_string());
        Ok(())
    }
}

fn lock<T>(m: &Arc<Mutex<T>>) -> Result<std::sync::MutexGuard<'_, T>, StorageError> {
    m.lock().map_err(|e| StorageError::Connection(e.to_string()))
}

#[async_trait]
impl QuizRepository for InMemoryRepository {
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        let mut guard = lock(&self.quizzes)?;
        guard.insert(quiz.id(), quiz.clone());
        Ok(())
    }

    async fn get_quiz(&self, id: QuizId) -> Result<Option<Quiz>, StorageError> {
        let guard = lock(&self.quizzes)?;
        Ok(guard.get(&id).cloned())
    }

    async fn list_quizzes(&self, limit: u32) -> Result<Vec<Quiz>, StorageError> {
        let guard = lock(&self.quizzes)?;
        let mut quizzes: Vec<Quiz> = guard.values().cloned().collect();
        quizzes.sort_by_key(Quiz::id);
        quizzes.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(quizzes)
    }
}

#[async_trait]
impl ResultRepository for InMemoryRepository {
    async fn append_result(
        &self,
        user_id: UserId,
        result: &QuizResult,
        level_achieved: Option<Level>,
    ) -> Result<i64, StorageError> {
        let mut guard = lock(&self.results)?;
        if guard
            .iter()
            .any(|row| row.result.attempt_id() == result.attempt_id())
        {
            return Err(StorageError::Conflict);
        }
        let id = i64::try_from(guard.len())
            .map_err(|_| StorageError::Serialization("result id overflow".into()))?
            + 1;
        guard.push(ResultRow::new(id, user_id, level_achieved, result.clone()));
        Ok(id)
    }

    async fn get_result(&self, id: i64) -> Result<ResultRow, StorageError> {
        let guard = lock(&self.results)?;
        guard
            .iter()
            .find(|row| row.id == id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn list_results(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<ResultRow>, StorageError> {
        let guard = lock(&self.results)?;
        let mut rows: Vec<ResultRow> = guard
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.result
                .completed_at()
                .cmp(&a.result.completed_at())
                .then(b.id.cmp(&a.id))
        });
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }
}

#[async_trait]
impl LevelProgressRepository for InMemoryRepository {
    async fn load_highest_level(&self, user_id: UserId) -> Result<Option<String>, StorageError> {
        let guard = lock(&self.profiles)?;
        Ok(guard.get(&user_id).and_then(|p| p.highest.clone()))
    }

    async fn save_highest_level(&self, user_id: UserId, level: Level) -> Result<(), StorageError> {
        let mut guard = lock(&self.profiles)?;
        guard.entry(user_id).or_default().highest = Some(level.label().to_string());
        Ok(())
    }

    async fn load_legacy_label(&self, user_id: UserId) -> Result<Option<String>, StorageError> {
        let guard = lock(&self.profiles)?;
        Ok(guard.get(&user_id).and_then(|p| p.legacy.clone()))
    }

    async fn save_legacy_label(&self, user_id: UserId, label: &str) -> Result<(), StorageError> {
        let mut guard = lock(&self.profiles)?;
        guard.entry(user_id).or_default().legacy = Some(label.to_string());
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub quizzes: Arc<dyn QuizRepository>,
    pub results: Arc<dyn ResultRepository>,
    pub levels: Arc<dyn LevelProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_in_memory(InMemoryRepository::new())
    }

    /// Wrap an existing in-memory repository, keeping a handle for inspection.
    #[must_use]
    pub fn from_in_memory(repo: InMemoryRepository) -> Self {
        let quizzes: Arc<dyn QuizRepository> = Arc::new(repo.clone());
        let results: Arc<dyn ResultRepository> = Arc::new(repo.clone());
        let levels: Arc<dyn LevelProgressRepository> = Arc::new(repo);
        Self {
            quizzes,
            results,
            levels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use quiz_core::model::{Question, QuizKind};
    use quiz_core::time::fixed_now;
    use uuid::Uuid;

    fn build_quiz(id: u64) -> Quiz {
        let question = Question::new(
            "Choose the article: ___ apple",
            vec!["a".into(), "an".into()],
            1,
            "vowel sound",
        )
        .unwrap();
        Quiz::new(QuizId::new(id), format!("Quiz {id}"), QuizKind::Practice, vec![question])
            .unwrap()
    }

    fn build_result(quiz: &Quiz, answer: Option<usize>, minutes: i64) -> QuizResult {
        let start = fixed_now() + Duration::minutes(minutes);
        QuizResult::score(quiz, &[answer], Uuid::new_v4(), start, start)
    }

    #[tokio::test]
    async fn quizzes_list_in_id_order() {
        let repo = InMemoryRepository::new();
        repo.upsert_quiz(&build_quiz(3)).await.unwrap();
        repo.upsert_quiz(&build_quiz(1)).await.unwrap();
        repo.upsert_quiz(&build_quiz(2)).await.unwrap();

        let ids: Vec<u64> = repo
            .list_quizzes(2)
            .await
            .unwrap()
            .iter()
            .map(|q| q.id().value())
            .collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(repo.get_quiz(QuizId::new(9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn results_are_listed_newest_first_per_user() {
        let repo = InMemoryRepository::new();
        let quiz = build_quiz(1);
        let me = UserId::new(1);
        let other = UserId::new(2);

        let older = repo
            .append_result(me, &build_result(&quiz, Some(1), 0), None)
            .await
            .unwrap();
        let newer = repo
            .append_result(me, &build_result(&quiz, Some(0), 5), Some(Level::Elementary))
            .await
            .unwrap();
        repo.append_result(other, &build_result(&quiz, None, 10), None)
            .await
            .unwrap();

        let rows = repo.list_results(me, 10).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![newer, older]);
        assert_eq!(rows[0].level_achieved, Some(Level::Elementary));
    }

    #[tokio::test]
    async fn summaries_follow_result_order() {
        let repo = InMemoryRepository::new();
        let quiz = build_quiz(1);
        let me = UserId::new(1);
        let first = build_result(&quiz, Some(1), 0);
        repo.append_result(me, &first, None).await.unwrap();
        repo.append_result(me, &build_result(&quiz, None, 5), None)
            .await
            .unwrap();

        let summaries = repo.list_result_summaries(me, 10).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].correct, 0);
        assert_eq!(summaries[1].attempt_id, first.attempt_id());
        assert_eq!(summaries[1].percentage, 100);
        assert_eq!(summaries[1].elapsed_secs(), 0);
    }

    #[tokio::test]
    async fn duplicate_attempts_conflict() {
        let repo = InMemoryRepository::new();
        let quiz = build_quiz(1);
        let result = build_result(&quiz, Some(1), 0);
        repo.append_result(UserId::new(1), &result, None).await.unwrap();

        let err = repo
            .append_result(UserId::new(1), &result, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn levels_store_labels_per_user() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(4);
        assert_eq!(repo.load_highest_level(user).await.unwrap(), None);

        repo.save_legacy_label(user, "B+").await.unwrap();
        repo.save_highest_level(user, Level::Intermediate).await.unwrap();

        assert_eq!(
            repo.load_highest_level(user).await.unwrap().as_deref(),
            Some("Intermediate")
        );
        assert_eq!(repo.load_legacy_label(user).await.unwrap().as_deref(), Some("B+"));
    }
}
