mod app_settings;
mod ids;
pub mod legacy;
pub mod level;
mod quiz;
mod result;
mod session;

pub use ids::{ParseIdError, QuizId, UserId};

pub use app_settings::{AppSettings, AppSettingsDraft, AppSettingsError, DEFAULT_MIRROR_TIMEOUT_SECS};
pub use legacy::{LEGACY_LEVELS, lookup_legacy_label, migrate_legacy_label};
pub use level::{Level, LevelError, TAXONOMY, UNKNOWN_INDEX, progress_percent, ratchet, taxonomy_index};
pub use quiz::{Question, QuestionError, Quiz, QuizError, QuizKind};
pub use result::{QuestionOutcome, QuizResult, ResultError, percentage};
pub use session::{QuizSession, SessionError, SessionPhase, SessionProgress, Step};
