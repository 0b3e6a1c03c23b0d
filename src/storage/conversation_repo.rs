use crate::domain::{Conversation, participants_key};
use crate::error::Result;
use crate::storage::DbPool;
use crate::storage::records::conversation::ConversationRecord;
use crate::storage::records::{encode_uuid_list, timestamp_to_millis};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct ConversationRepository {
    pool: DbPool,
}

impl ConversationRepository {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts the conversation unless one with the same canonical
    /// participant key already exists. Returns whether a row was written;
    /// on conflict the caller re-selects by key.
    pub async fn create(&self, conversation: &Conversation) -> Result<bool> {
        let result = sqlx::query(
            r"
            INSERT OR IGNORE INTO conversations
                (id, creator, chat_name, participants, participants_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(conversation.id.to_string())
        .bind(conversation.creator.to_string())
        .bind(&conversation.chat_name)
        .bind(encode_uuid_list(&conversation.participants))
        .bind(participants_key(&conversation.participants))
        .bind(timestamp_to_millis(conversation.created_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Conversation>> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            "SELECT id, creator, chat_name, participants, created_at FROM conversations WHERE id = $1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        record.map(ConversationRecord::into_domain).transpose()
    }

    pub async fn find_by_participants(&self, participants: &[Uuid]) -> Result<Option<Conversation>> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            "SELECT id, creator, chat_name, participants, created_at FROM conversations WHERE participants_key = $1",
        )
        .bind(participants_key(participants))
        .fetch_optional(&self.pool)
        .await?;

        record.map(ConversationRecord::into_domain).transpose()
    }

    /// Every conversation the user participates in.
    pub async fn for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let records = sqlx::query_as::<_, ConversationRecord>(
            r"
            SELECT id, creator, chat_name, participants, created_at FROM conversations
            WHERE EXISTS (SELECT 1 FROM json_each(participants) WHERE json_each.value = $1)
            ORDER BY created_at ASC
            ",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(ConversationRecord::into_domain).collect()
    }

    /// Rewrites the participant set after a membership change. The
    /// canonical key moves with it so the set identity check keeps
    /// matching the current membership.
    pub async fn set_participants(&self, id: Uuid, participants: &[Uuid]) -> Result<()> {
        sqlx::query("UPDATE conversations SET participants = $1, participants_key = $2 WHERE id = $3")
            .bind(encode_uuid_list(participants))
            .bind(participants_key(participants))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn set_chat_name(&self, id: Uuid, chat_name: &str) -> Result<()> {
        sqlx::query("UPDATE conversations SET chat_name = $1 WHERE id = $2")
            .bind(chat_name)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
