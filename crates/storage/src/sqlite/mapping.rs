use quiz_core::model::{Level, QuestionOutcome, QuizId, UserId};
use sqlx::Row;
use uuid::Uuid;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// Maps unique-constraint violations to `Conflict`, everything else to `Connection`.
pub(crate) fn write_err(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        _ => conn(e),
    }
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn quiz_id_from_i64(v: i64) -> Result<QuizId, StorageError> {
    Ok(QuizId::new(i64_to_u64("quiz_id", v)?))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn usize_from_i64(field: &'static str, v: i64) -> Result<usize, StorageError> {
    usize::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn usize_to_i64(field: &'static str, v: usize) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn options_to_json(options: &[String]) -> Result<String, StorageError> {
    serde_json::to_string(options).map_err(ser)
}

pub(crate) fn options_from_json(raw: &str) -> Result<Vec<String>, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

pub(crate) fn parse_attempt_id(raw: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(raw).map_err(|e| StorageError::Serialization(format!("invalid attempt_id: {e}")))
}

/// Stored level labels are written from `Level::label`, so anything else is corruption.
pub(crate) fn parse_level(raw: Option<String>) -> Result<Option<Level>, StorageError> {
    raw.map(|label| Level::parse(&label).map_err(ser)).transpose()
}

/// Rebuild one breakdown line. Option texts are derived from the stored options.
pub(crate) fn map_answer_row(row: &sqlx::sqlite::SqliteRow) -> Result<QuestionOutcome, StorageError> {
    let options = options_from_json(&row.try_get::<String, _>("options").map_err(ser)?)?;
    let given = row
        .try_get::<Option<i64>, _>("given")
        .map_err(ser)?
        .map(|v| usize_from_i64("given", v))
        .transpose()?;
    let correct = usize_from_i64("correct", row.try_get::<i64, _>("correct").map_err(ser)?)?;
    let correct_text = options
        .get(correct)
        .cloned()
        .ok_or_else(|| StorageError::Serialization(format!("correct option {correct} missing")))?;
    let given_text = given.and_then(|idx| options.get(idx).cloned());
    let is_correct: bool = row.try_get::<i64, _>("is_correct").map_err(ser)? != 0;

    Ok(QuestionOutcome {
        question: row.try_get("question").map_err(ser)?,
        options,
        given,
        given_text,
        correct,
        correct_text,
        is_correct,
        explanation: row.try_get("explanation").map_err(ser)?,
    })
}
