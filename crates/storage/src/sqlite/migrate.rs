use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS quizzes (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            kind TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS questions (
            quiz_id INTEGER NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0),
            text TEXT NOT NULL,
            options TEXT NOT NULL,
            correct INTEGER NOT NULL CHECK (correct >= 0),
            explanation TEXT NOT NULL,
            PRIMARY KEY (quiz_id, position),
            FOREIGN KEY (quiz_id) REFERENCES quizzes(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS profiles (
            user_id INTEGER PRIMARY KEY,
            highest_level TEXT,
            legacy_level TEXT
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS quiz_results (
            id INTEGER PRIMARY KEY,
            attempt_id TEXT NOT NULL UNIQUE,
            user_id INTEGER NOT NULL,
            quiz_id INTEGER NOT NULL,
            quiz_type TEXT NOT NULL,
            total INTEGER NOT NULL CHECK (total > 0),
            correct INTEGER NOT NULL CHECK (correct >= 0),
            percentage INTEGER NOT NULL CHECK (percentage BETWEEN 0 AND 100),
            level_achieved TEXT,
            started_at TEXT NOT NULL,
            completed_at TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS result_answers (
            result_id INTEGER NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0),
            question TEXT NOT NULL,
            options TEXT NOT NULL,
            given INTEGER,
            correct INTEGER NOT NULL CHECK (correct >= 0),
            is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
            explanation TEXT NOT NULL,
            PRIMARY KEY (result_id, position),
            FOREIGN KEY (result_id) REFERENCES quiz_results(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_quiz_results_user_completed
            ON quiz_results (user_id, completed_at);
    ",
];

/// Runs versioned migrations, each inside its own transaction.
///
/// Safe to call repeatedly; applied versions are recorded in `schema_migrations`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: quizzes, profiles, results with per-question breakdown.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1 {
            sqlx::query(*statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied schema migration");
    }

    Ok(())
}
