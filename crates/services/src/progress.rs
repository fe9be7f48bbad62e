use std::sync::Arc;

use quiz_core::model::{Level, UserId, migrate_legacy_label, progress_percent, ratchet};
use storage::repository::LevelProgressRepository;

use crate::error::LevelProgressError;

/// A user's highest level as stored, with its place on the taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelStanding {
    /// Stored label, kept verbatim even when it is not a known level.
    pub label: String,
    pub level: Option<Level>,
    pub progress_percent: u8,
    /// The value was produced by the legacy migration during this read.
    pub migrated: bool,
}

impl LevelStanding {
    fn from_label(label: String, migrated: bool) -> Self {
        let level = Level::parse(&label).ok();
        Self {
            progress_percent: progress_percent(&label),
            level,
            label,
            migrated,
        }
    }
}

/// Result of offering a new level to the ratchet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelUpdate {
    pub previous: String,
    pub highest: String,
    pub changed: bool,
}

/// Reads and ratchets per-user highest levels.
#[derive(Clone)]
pub struct LevelProgressService {
    levels: Arc<dyn LevelProgressRepository>,
}

impl LevelProgressService {
    #[must_use]
    pub fn new(levels: Arc<dyn LevelProgressRepository>) -> Self {
        Self { levels }
    }

    /// Current highest level for `user_id`.
    ///
    /// The first read of a profile with nothing stored maps its legacy label
    /// (or none) through the migration table and persists the outcome.
    /// Labels outside the taxonomy come back with `level: None` and progress 0.
    ///
    /// # Errors
    ///
    /// Returns `LevelProgressError::Storage` on storage failures.
    pub async fn highest_level(&self, user_id: UserId) -> Result<LevelStanding, LevelProgressError> {
        if let Some(label) = self.levels.load_highest_level(user_id).await? {
            let standing = LevelStanding::from_label(label, false);
            if standing.level.is_none() {
                tracing::warn!(%user_id, label = %standing.label, "stored level is not in the taxonomy");
            }
            return Ok(standing);
        }

        let legacy = self.levels.load_legacy_label(user_id).await?;
        let migrated = legacy
            .as_deref()
            .map_or(Level::Beginner, migrate_legacy_label);
        self.levels.save_highest_level(user_id, migrated).await?;
        tracing::info!(
            %user_id,
            legacy = legacy.as_deref().unwrap_or("<none>"),
            level = %migrated,
            "migrated legacy level"
        );

        Ok(LevelStanding::from_label(migrated.label().to_string(), true))
    }

    /// Offer `new_label` to the user's highest level.
    ///
    /// Writes only when the level moves up. Unknown labels never move it.
    ///
    /// # Errors
    ///
    /// Returns `LevelProgressError::Storage` on storage failures.
    pub async fn record_level(
        &self,
        user_id: UserId,
        new_label: &str,
    ) -> Result<LevelUpdate, LevelProgressError> {
        let current = self.highest_level(user_id).await?;
        let highest = ratchet(new_label, &current.label);

        // A label only wins the ratchet when it is in the taxonomy.
        let moved = match Level::parse(highest) {
            Ok(level) if highest != current.label => Some(level),
            _ => None,
        };

        if let Some(level) = moved {
            self.levels.save_highest_level(user_id, level).await?;
            tracing::info!(%user_id, from = %current.label, to = %level, "highest level raised");
        }

        Ok(LevelUpdate {
            highest: moved.map_or_else(|| current.label.clone(), |level| level.label().to_string()),
            changed: moved.is_some(),
            previous: current.label,
        })
    }

    /// Typed form of `record_level`.
    ///
    /// # Errors
    ///
    /// Returns `LevelProgressError::Storage` on storage failures.
    pub async fn record(
        &self,
        user_id: UserId,
        level: Level,
    ) -> Result<LevelUpdate, LevelProgressError> {
        self.record_level(user_id, level.label()).await
    }
}
