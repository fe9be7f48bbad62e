//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{AppSettingsError, SessionError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the quiz loop.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizLoopError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Progress(#[from] LevelProgressError),
}

/// Errors emitted by `LevelProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LevelProgressError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ResultHistoryService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HistoryError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by a `ResultMirror`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MirrorError {
    #[error("remote mirror returned status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{var} is not a number: {raw}")]
    NotANumber { var: &'static str, raw: String },
    #[error(transparent)]
    Settings(#[from] AppSettingsError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Mirror(#[from] MirrorError),
}
