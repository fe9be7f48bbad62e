#![forbid(unsafe_code)]

pub mod app_services;
pub mod config;
pub mod error;
pub mod history;
pub mod progress;
pub mod remote;
pub mod sessions;

pub use quiz_core::Clock;

pub use app_services::AppServices;
pub use config::{MirrorConfig, settings_from_env};
pub use error::{
    AppServicesError, ConfigError, HistoryError, LevelProgressError, MirrorError, QuizLoopError,
};
pub use history::{ResultHistoryService, ResultListItem};
pub use progress::{LevelProgressService, LevelStanding, LevelUpdate};
pub use remote::{HttpResultMirror, MirrorPayload, MirrorTasks, ResultMirror, spawn_mirror};
pub use sessions::{AdvanceResult, QuizLoopService, QuizRun};
