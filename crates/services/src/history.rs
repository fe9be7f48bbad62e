use chrono::{DateTime, Utc};
use std::sync::Arc;

use quiz_core::model::{Level, QuizId, QuizKind};
use quiz_core::time::format_elapsed;
use storage::repository::{ResultRepository, ResultRow, ResultSummary};

use crate::error::HistoryError;

/// Presentation-agnostic list item for a stored result.
///
/// Timestamps are left raw; `score_label` and `elapsed_label` give the two
/// short forms the results view shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultListItem {
    pub id: i64,
    pub quiz_id: QuizId,
    pub quiz_kind: QuizKind,
    pub correct: u32,
    pub total: u32,
    pub percentage: u32,
    pub elapsed_secs: u64,
    pub completed_at: DateTime<Utc>,
    pub level_achieved: Option<Level>,
}

impl ResultListItem {
    #[must_use]
    pub fn from_summary(summary: &ResultSummary) -> Self {
        Self {
            id: summary.id,
            quiz_id: summary.quiz_id,
            quiz_kind: summary.quiz_kind.clone(),
            correct: summary.correct,
            total: summary.total,
            percentage: summary.percentage,
            elapsed_secs: summary.elapsed_secs(),
            completed_at: summary.completed_at,
            level_achieved: summary.level_achieved,
        }
    }

    /// `correct/total`, e.g. `3/4`.
    #[must_use]
    pub fn score_label(&self) -> String {
        format!("{}/{}", self.correct, self.total)
    }

    /// Elapsed time as `m:ss`.
    #[must_use]
    pub fn elapsed_label(&self) -> String {
        format_elapsed(self.elapsed_secs)
    }
}

#[derive(Clone)]
pub struct ResultHistoryService {
    results: Arc<dyn ResultRepository>,
}

impl ResultHistoryService {
    #[must_use]
    pub fn new(results: Arc<dyn ResultRepository>) -> Self {
        Self { results }
    }

    /// Most recent results for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Storage` on storage failures.
    pub async fn list_recent(
        &self,
        user_id: quiz_core::model::UserId,
        limit: u32,
    ) -> Result<Vec<ResultListItem>, HistoryError> {
        let summaries = self.results.list_result_summaries(user_id, limit).await?;
        Ok(summaries.iter().map(ResultListItem::from_summary).collect())
    }

    /// Full stored result, including the per-question breakdown.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Storage` (`NotFound` when missing).
    pub async fn get(&self, id: i64) -> Result<ResultRow, HistoryError> {
        Ok(self.results.get_result(id).await?)
    }
}
