use async_trait::async_trait;
use quiz_core::model::{Quiz, QuizId, QuizKind};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    conn, id_i64, options_from_json, options_to_json, quiz_id_from_i64, ser, usize_from_i64,
    usize_to_i64,
};
use crate::repository::{QuizRepository, StorageError};

impl SqliteRepository {
    async fn load_quiz(
        &self,
        id: i64,
        title: String,
        kind: String,
    ) -> Result<Quiz, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT position, text, options, correct, explanation
                FROM questions
                WHERE quiz_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut parts = Vec::with_capacity(rows.len());
        for row in rows {
            let text: String = row.try_get("text").map_err(ser)?;
            let options = options_from_json(&row.try_get::<String, _>("options").map_err(ser)?)?;
            let correct = usize_from_i64("correct", row.try_get::<i64, _>("correct").map_err(ser)?)?;
            let explanation: String = row.try_get("explanation").map_err(ser)?;
            parts.push((text, options, correct, explanation));
        }

        Quiz::from_parts(quiz_id_from_i64(id)?, title, QuizKind::parse(&kind), parts).map_err(ser)
    }
}

#[async_trait]
impl QuizRepository for SqliteRepository {
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        let quiz_id = id_i64("quiz_id", quiz.id().value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
                INSERT INTO quizzes (id, title, kind)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    kind = excluded.kind
            ",
        )
        .bind(quiz_id)
        .bind(quiz.title())
        .bind(quiz.kind().as_str())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM questions WHERE quiz_id = ?1")
            .bind(quiz_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, question) in quiz.questions().iter().enumerate() {
            sqlx::query(
                r"
                    INSERT INTO questions (quiz_id, position, text, options, correct, explanation)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
            )
            .bind(quiz_id)
            .bind(usize_to_i64("position", position)?)
            .bind(question.text())
            .bind(options_to_json(question.options())?)
            .bind(usize_to_i64("correct", question.correct())?)
            .bind(question.explanation())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        tracing::debug!(quiz_id, questions = quiz.len(), "quiz upserted");
        Ok(())
    }

    async fn get_quiz(&self, id: QuizId) -> Result<Option<Quiz>, StorageError> {
        let quiz_id = id_i64("quiz_id", id.value())?;
        let row = sqlx::query("SELECT id, title, kind FROM quizzes WHERE id = ?1")
            .bind(quiz_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let title: String = row.try_get("title").map_err(ser)?;
        let kind: String = row.try_get("kind").map_err(ser)?;
        self.load_quiz(quiz_id, title, kind).await.map(Some)
    }

    async fn list_quizzes(&self, limit: u32) -> Result<Vec<Quiz>, StorageError> {
        let rows = sqlx::query("SELECT id, title, kind FROM quizzes ORDER BY id ASC LIMIT ?1")
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id").map_err(ser)?;
            let title: String = row.try_get("title").map_err(ser)?;
            let kind: String = row.try_get("kind").map_err(ser)?;
            out.push(self.load_quiz(id, title, kind).await?);
        }
        Ok(out)
    }
}
