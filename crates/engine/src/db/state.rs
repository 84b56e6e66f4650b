//! Settings and sync state in `PostgreSQL`.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use woosync_core::StateKey;

use crate::settings::{ConfigStore, SettingKey, SettingsError};
use crate::sync_state::{StateError, StateStore};

/// Postgres-backed [`ConfigStore`] and [`StateStore`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Remove a setting.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete_setting(&self, key: SettingKey) -> Result<(), SettingsError> {
        sqlx::query("DELETE FROM woosync.settings WHERE key = $1")
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for PgStore {
    async fn get(&self, key: SettingKey) -> Result<Option<String>, SettingsError> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM woosync.settings WHERE key = $1")
                .bind(key.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.filter(|v| !v.trim().is_empty()))
    }

    async fn set(&self, key: SettingKey, value: &str) -> Result<bool, SettingsError> {
        sqlx::query(
            r"
            INSERT INTO woosync.settings (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = $2, updated_at = NOW()
            ",
        )
        .bind(key.as_str())
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(true)
    }
}

#[async_trait]
impl StateStore for PgStore {
    async fn get(&self, key: StateKey) -> Result<Option<JsonValue>, StateError> {
        let value: Option<JsonValue> =
            sqlx::query_scalar("SELECT value FROM woosync.sync_state WHERE key = $1")
                .bind(key.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn set(&self, key: StateKey, value: Option<JsonValue>) -> Result<(), StateError> {
        match value {
            Some(value) => {
                sqlx::query(
                    r"
                    INSERT INTO woosync.sync_state (key, value)
                    VALUES ($1, $2)
                    ON CONFLICT (key) DO UPDATE SET value = $2, updated_at = NOW()
                    ",
                )
                .bind(key.as_str())
                .bind(value)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM woosync.sync_state WHERE key = $1")
                    .bind(key.as_str())
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: StateKey,
        expected: Option<&JsonValue>,
        new: Option<JsonValue>,
    ) -> Result<bool, StateError> {
        let result = match (expected, new) {
            (None, Some(new)) => {
                sqlx::query(
                    r"
                    INSERT INTO woosync.sync_state (key, value)
                    VALUES ($1, $2)
                    ON CONFLICT (key) DO NOTHING
                    ",
                )
                .bind(key.as_str())
                .bind(new)
                .execute(&self.pool)
                .await?
            }
            (Some(expected), Some(new)) => {
                sqlx::query(
                    r"
                    UPDATE woosync.sync_state
                    SET value = $2, updated_at = NOW()
                    WHERE key = $1 AND value = $3
                    ",
                )
                .bind(key.as_str())
                .bind(new)
                .bind(expected)
                .execute(&self.pool)
                .await?
            }
            (Some(expected), None) => {
                sqlx::query("DELETE FROM woosync.sync_state WHERE key = $1 AND value = $2")
                    .bind(key.as_str())
                    .bind(expected)
                    .execute(&self.pool)
                    .await?
            }
            (None, None) => {
                let exists: Option<i32> =
                    sqlx::query_scalar("SELECT 1 FROM woosync.sync_state WHERE key = $1")
                        .bind(key.as_str())
                        .fetch_optional(&self.pool)
                        .await?;
                return Ok(exists.is_none());
            }
        };
        Ok(result.rows_affected() == 1)
    }

    async fn ping(&self) -> Result<(), StateError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
