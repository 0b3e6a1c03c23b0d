use crate::api::schemas::WireMessage;
use crate::error::Result;
use crate::storage::DbPool;
use crate::storage::records::message::MessageRecord;
use crate::storage::records::{encode_uuid_list, timestamp_to_millis};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct MessageRepository {
    pool: DbPool,
}

impl MessageRepository {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts a message, ignoring the write when a row with the same
    /// temporary id already exists (server-side send dedup). Returns
    /// whether a row was actually written.
    pub async fn create(&self, message: &WireMessage) -> Result<bool> {
        let result = sqlx::query(
            r"
            INSERT OR IGNORE INTO messages
                (id, conversation_id, sender, temp_id, text, image, video,
                 voice_message, duration, read_by, is_system, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ",
        )
        .bind(message.id.to_string())
        .bind(message.conversation_id.to_string())
        .bind(message.sender.map(|id| id.to_string()))
        .bind(message.temp_id.map(|id| id.to_string()))
        .bind(&message.text)
        .bind(&message.image)
        .bind(&message.video)
        .bind(&message.voice_message)
        .bind(message.duration)
        .bind(encode_uuid_list(&message.read_by))
        .bind(message.is_system_message)
        .bind(timestamp_to_millis(message.created_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn find_by_temp_id(&self, temp_id: Uuid) -> Result<Option<WireMessage>> {
        let record = sqlx::query_as::<_, MessageRecord>("SELECT * FROM messages WHERE temp_id = $1")
            .bind(temp_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        record.map(MessageRecord::into_wire).transpose()
    }

    /// Messages the user has not read and did not send, across every
    /// conversation they participate in, oldest first.
    pub async fn fetch_unread(&self, user_id: Uuid) -> Result<Vec<WireMessage>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r"
            SELECT m.* FROM messages m
            JOIN conversations c ON c.id = m.conversation_id
            WHERE EXISTS (SELECT 1 FROM json_each(c.participants) WHERE json_each.value = $1)
              AND (m.sender IS NULL OR m.sender <> $1)
              AND NOT EXISTS (SELECT 1 FROM json_each(m.read_by) WHERE json_each.value = $1)
            ORDER BY m.created_at ASC, m.rowid ASC
            ",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(MessageRecord::into_wire).collect()
    }

    /// Adds the user to `read_by` of every message in the conversation
    /// they did not send. Additive and idempotent.
    pub async fn mark_read(&self, user_id: Uuid, conversation_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE messages
            SET read_by = json_insert(read_by, '$[#]', $1)
            WHERE conversation_id = $2
              AND (sender IS NULL OR sender <> $1)
              AND NOT EXISTS (SELECT 1 FROM json_each(messages.read_by) WHERE json_each.value = $1)
            ",
        )
        .bind(user_id.to_string())
        .bind(conversation_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Marks every existing message read by the user, sender included.
    /// Used when a participant joins so the backlog never counts as
    /// unread for them.
    pub async fn mark_all_read_by(&self, user_id: Uuid, conversation_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE messages
            SET read_by = json_insert(read_by, '$[#]', $1)
            WHERE conversation_id = $2
              AND NOT EXISTS (SELECT 1 FROM json_each(messages.read_by) WHERE json_each.value = $1)
            ",
        )
        .bind(user_id.to_string())
        .bind(conversation_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// One page of history, newest first.
    pub async fn fetch_page(&self, conversation_id: Uuid, limit: i64, offset: i64) -> Result<Vec<WireMessage>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r"
            SELECT * FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at DESC, rowid DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(conversation_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(MessageRecord::into_wire).collect()
    }

    /// The full history of a conversation in chronological order.
    pub async fn fetch_all(&self, conversation_id: Uuid) -> Result<Vec<WireMessage>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            "SELECT * FROM messages WHERE conversation_id = $1 ORDER BY created_at ASC, rowid ASC",
        )
        .bind(conversation_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(MessageRecord::into_wire).collect()
    }
}
