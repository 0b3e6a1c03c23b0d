use crate::error::Result;
use crate::storage::DbPool;
use crate::storage::records::{timestamp_from_millis, timestamp_to_millis};
use time::OffsetDateTime;
use uuid::Uuid;

/// Minimal user directory. Account provisioning lives in the external
/// auth service; this table carries what delivery needs (usernames for
/// system messages, presence timestamps).
#[derive(Clone, Debug)]
pub struct UserRepository {
    pool: DbPool,
}

impl UserRepository {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, id: Uuid, username: &str) -> Result<()> {
        sqlx::query("INSERT INTO users (id, username) VALUES ($1, $2)")
            .bind(id.to_string())
            .bind(username)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn username(&self, id: Uuid) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT username FROM users WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(username,)| username))
    }

    pub async fn set_last_online(&self, id: Uuid, last_online: OffsetDateTime) -> Result<u64> {
        let result = sqlx::query("UPDATE users SET last_online = $1 WHERE id = $2")
            .bind(timestamp_to_millis(last_online))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn last_online(&self, id: Uuid) -> Result<Option<OffsetDateTime>> {
        let row: Option<(Option<i64>,)> = sqlx::query_as("SELECT last_online FROM users WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.and_then(|(millis,)| millis).map(timestamp_from_millis).transpose()
    }
}
