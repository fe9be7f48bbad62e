use async_trait::async_trait;
use quiz_core::model::{Level, QuizKind, QuizResult, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    conn, id_i64, map_answer_row, options_to_json, parse_attempt_id, parse_level,
    quiz_id_from_i64, ser, u32_from_i64, user_id_from_i64, usize_to_i64, write_err,
};
use crate::repository::{ResultRepository, ResultRow, ResultSummary, StorageError};

const RESULT_COLUMNS: &str = r"
    id, attempt_id, user_id, quiz_id, quiz_type, total, correct, percentage,
    level_achieved, started_at, completed_at
";

fn map_summary_row(row: &sqlx::sqlite::SqliteRow) -> Result<ResultSummary, StorageError> {
    Ok(ResultSummary {
        id: row.try_get("id").map_err(ser)?,
        user_id: user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        attempt_id: parse_attempt_id(&row.try_get::<String, _>("attempt_id").map_err(ser)?)?,
        quiz_id: quiz_id_from_i64(row.try_get::<i64, _>("quiz_id").map_err(ser)?)?,
        quiz_kind: QuizKind::parse(&row.try_get::<String, _>("quiz_type").map_err(ser)?),
        total: u32_from_i64("total", row.try_get::<i64, _>("total").map_err(ser)?)?,
        correct: u32_from_i64("correct", row.try_get::<i64, _>("correct").map_err(ser)?)?,
        percentage: u32_from_i64("percentage", row.try_get::<i64, _>("percentage").map_err(ser)?)?,
        level_achieved: parse_level(row.try_get("level_achieved").map_err(ser)?)?,
        started_at: row.try_get("started_at").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
    })
}

impl SqliteRepository {
    /// Result header rows for a user, newest first.
    async fn user_result_rows(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<sqlx::sqlite::SqliteRow>, StorageError> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM quiz_results
             WHERE user_id = ?1
             ORDER BY completed_at DESC, id DESC
             LIMIT ?2"
        );
        sqlx::query(&sql)
            .bind(id_i64("user_id", user_id.value())?)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)
    }

    async fn map_result_row(&self, row: &sqlx::sqlite::SqliteRow) -> Result<ResultRow, StorageError> {
        let summary = map_summary_row(row)?;

        let answers = sqlx::query(
            r"
                SELECT position, question, options, given, correct, is_correct, explanation
                FROM result_answers
                WHERE result_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(summary.id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut questions = Vec::with_capacity(answers.len());
        for answer in &answers {
            questions.push(map_answer_row(answer)?);
        }

        let result = QuizResult::from_persisted(
            summary.attempt_id,
            summary.quiz_id,
            summary.quiz_kind,
            summary.total,
            summary.correct,
            summary.percentage,
            questions,
            summary.started_at,
            summary.completed_at,
        )
        .map_err(ser)?;

        Ok(ResultRow::new(
            summary.id,
            summary.user_id,
            summary.level_achieved,
            result,
        ))
    }
}

#[async_trait]
impl ResultRepository for SqliteRepository {
    async fn append_result(
        &self,
        user_id: UserId,
        result: &QuizResult,
        level_achieved: Option<Level>,
    ) -> Result<i64, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let res = sqlx::query(
            r"
                INSERT INTO quiz_results (
                    attempt_id, user_id, quiz_id, quiz_type, total, correct, percentage,
                    level_achieved, started_at, completed_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
        )
        .bind(result.attempt_id().to_string())
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("quiz_id", result.quiz_id().value())?)
        .bind(result.quiz_kind().as_str())
        .bind(i64::from(result.total_questions()))
        .bind(i64::from(result.correct_answers()))
        .bind(i64::from(result.percentage()))
        .bind(level_achieved.map(Level::label))
        .bind(result.started_at())
        .bind(result.completed_at())
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;

        let result_id = res.last_insert_rowid();

        for (position, outcome) in result.questions().iter().enumerate() {
            sqlx::query(
                r"
                    INSERT INTO result_answers (
                        result_id, position, question, options, given, correct,
                        is_correct, explanation
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ",
            )
            .bind(result_id)
            .bind(usize_to_i64("position", position)?)
            .bind(&outcome.question)
            .bind(options_to_json(&outcome.options)?)
            .bind(
                outcome
                    .given
                    .map(|g| usize_to_i64("given", g))
                    .transpose()?,
            )
            .bind(usize_to_i64("correct", outcome.correct)?)
            .bind(i64::from(outcome.is_correct))
            .bind(&outcome.explanation)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(result_id)
    }

    async fn get_result(&self, id: i64) -> Result<ResultRow, StorageError> {
        let sql = format!("SELECT {RESULT_COLUMNS} FROM quiz_results WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        self.map_result_row(&row).await
    }

    async fn list_results(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<ResultRow>, StorageError> {
        let rows = self.user_result_rows(user_id, limit).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(self.map_result_row(row).await?);
        }
        Ok(out)
    }

    async fn list_result_summaries(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<ResultSummary>, StorageError> {
        let rows = self.user_result_rows(user_id, limit).await?;

        rows.iter().map(map_summary_row).collect()
    }
}
