//! Pipeline flag repository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::warn;

use crate::Result;
use crate::database::models::FlagDbModel;
use crate::database::retry::is_unique_violation;

/// Flag repository trait.
#[async_trait]
pub trait FlagRepository: Send + Sync {
    async fn get_flag(&self, key: &str) -> Result<Option<FlagDbModel>>;
    async fn list_flags(&self) -> Result<Vec<FlagDbModel>>;
    async fn set_flag(&self, key: &str, value: &str) -> Result<()>;
    async fn clear_flags(&self) -> Result<u64>;
}

/// SQLx implementation of FlagRepository.
pub struct SqlxFlagRepository {
    pool: SqlitePool,
}

impl SqlxFlagRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn update_flag(&self, key: &str, value: &str, now: &str) -> Result<u64> {
        let result =
            sqlx::query("UPDATE pipeline_flag SET value = ?, updated_at = ? WHERE key = ?")
                .bind(value)
                .bind(now)
                .bind(key)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn insert_flag(&self, key: &str, value: &str, now: &str) -> Result<()> {
        sqlx::query("INSERT INTO pipeline_flag (key, value, updated_at) VALUES (?, ?, ?)")
            .bind(key)
            .bind(value)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl FlagRepository for SqlxFlagRepository {
    async fn get_flag(&self, key: &str) -> Result<Option<FlagDbModel>> {
        let flag = sqlx::query_as::<_, FlagDbModel>("SELECT * FROM pipeline_flag WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(flag)
    }

    async fn list_flags(&self) -> Result<Vec<FlagDbModel>> {
        let flags = sqlx::query_as::<_, FlagDbModel>("SELECT * FROM pipeline_flag ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(flags)
    }

    /// Update-then-insert. A concurrent insert of the same key surfaces as a
    /// unique violation, which is retried once as an update.
    async fn set_flag(&self, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        if self.update_flag(key, value, &now).await? > 0 {
            return Ok(());
        }

        match self.insert_flag(key, value, &now).await {
            Ok(()) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                if self.update_flag(key, value, &now).await? == 0 {
                    warn!(key = %key, "Flag vanished during duplicate-key retry; value not stored");
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn clear_flags(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM pipeline_flag")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
