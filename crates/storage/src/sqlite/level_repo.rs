use async_trait::async_trait;
use quiz_core::model::{Level, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, ser};
use crate::repository::{LevelProgressRepository, StorageError};

impl SqliteRepository {
    async fn profile_column(
        &self,
        user_id: UserId,
        column: &'static str,
    ) -> Result<Option<String>, StorageError> {
        let sql = format!("SELECT {column} FROM profiles WHERE user_id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("user_id", user_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        match row {
            Some(row) => row.try_get::<Option<String>, _>(column).map_err(ser),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl LevelProgressRepository for SqliteRepository {
    async fn load_highest_level(&self, user_id: UserId) -> Result<Option<String>, StorageError> {
        self.profile_column(user_id, "highest_level").await
    }

    async fn save_highest_level(&self, user_id: UserId, level: Level) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO profiles (user_id, highest_level)
                VALUES (?1, ?2)
                ON CONFLICT(user_id) DO UPDATE SET
                    highest_level = excluded.highest_level
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(level.label())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn load_legacy_label(&self, user_id: UserId) -> Result<Option<String>, StorageError> {
        self.profile_column(user_id, "legacy_level").await
    }

    async fn save_legacy_label(&self, user_id: UserId, label: &str) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO profiles (user_id, legacy_level)
                VALUES (?1, ?2)
                ON CONFLICT(user_id) DO UPDATE SET
                    legacy_level = excluded.legacy_level
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(label)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}
