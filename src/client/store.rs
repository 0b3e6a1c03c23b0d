use crate::client::{Result, SyncError};
use crate::domain::{DeliveryStatus, Message, MessageBody};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, Pool, Sqlite};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Durable local cache of messages and conversations, surviving app
/// restarts. A narrow table, not a general database: `read_by` is a
/// serialized JSON list, ordering comes from the integer millisecond
/// timestamp. A single connection serializes all writes, which satisfies
/// the single-writer discipline the synchronizer relies on.
#[derive(Clone, Debug)]
pub struct MessageStore {
    pool: Pool<Sqlite>,
}

impl MessageStore {
    /// Opens (and creates if missing) the cache at the given sqlite URL.
    pub async fn open(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                temp_id TEXT,
                conversation_id TEXT NOT NULL,
                sender TEXT,
                text TEXT,
                image TEXT,
                video TEXT,
                voice_message TEXT,
                duration INTEGER,
                read_by TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                status TEXT NOT NULL,
                is_system INTEGER NOT NULL DEFAULT 0,
                local_attachment TEXT
            )
            ",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation_created ON messages (conversation_id, created_at)",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                creator TEXT NOT NULL,
                chat_name TEXT,
                participants TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            ",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Three-way upsert mirroring reconciliation. Matches on `id` first;
    /// failing that, a row keyed by the message's temporary id is
    /// re-keyed to the real id; otherwise a new row is inserted.
    pub async fn upsert(&self, message: &Message) -> Result<()> {
        if self.update_keyed_by(message, message.id).await? {
            return Ok(());
        }

        if let Some(temp_id) = message.temp_id
            && temp_id != message.id
            && self.update_keyed_by(message, temp_id).await?
        {
            return Ok(());
        }

        sqlx::query(
            r"
            INSERT INTO messages
                (id, temp_id, conversation_id, sender, text, image, video, voice_message,
                 duration, read_by, created_at, status, is_system, local_attachment)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ",
        )
        .bind(message.id.to_string())
        .bind(message.temp_id.map(|t| t.to_string()))
        .bind(message.conversation_id.to_string())
        .bind(message.sender.map(|s| s.to_string()))
        .bind(body_column(&message.body, Column::Text))
        .bind(body_column(&message.body, Column::Image))
        .bind(body_column(&message.body, Column::Video))
        .bind(body_column(&message.body, Column::Voice))
        .bind(body_duration(&message.body))
        .bind(encode_read_by(&message.read_by))
        .bind(to_millis(message.created_at))
        .bind(message.status.as_str())
        .bind(message.is_system)
        .bind(&message.local_attachment)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Rewrites every column of the row currently keyed by `key`,
    /// including the primary key itself. Returns whether a row matched.
    async fn update_keyed_by(&self, message: &Message, key: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE messages SET
                id = $1, temp_id = $2, conversation_id = $3, sender = $4, text = $5,
                image = $6, video = $7, voice_message = $8, duration = $9, read_by = $10,
                created_at = $11, status = $12, is_system = $13, local_attachment = $14
            WHERE id = $15
            ",
        )
        .bind(message.id.to_string())
        .bind(message.temp_id.map(|t| t.to_string()))
        .bind(message.conversation_id.to_string())
        .bind(message.sender.map(|s| s.to_string()))
        .bind(body_column(&message.body, Column::Text))
        .bind(body_column(&message.body, Column::Image))
        .bind(body_column(&message.body, Column::Video))
        .bind(body_column(&message.body, Column::Voice))
        .bind(body_duration(&message.body))
        .bind(encode_read_by(&message.read_by))
        .bind(to_millis(message.created_at))
        .bind(message.status.as_str())
        .bind(message.is_system)
        .bind(&message.local_attachment)
        .bind(key.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(MessageRow::into_message).transpose()
    }

    /// One page of a conversation, newest first.
    pub async fn page(&self, conversation_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r"
            SELECT * FROM messages WHERE conversation_id = $1
            ORDER BY created_at DESC, rowid DESC LIMIT $2 OFFSET $3
            ",
        )
        .bind(conversation_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MessageRow::into_message).collect()
    }

    pub async fn conversation_ids(&self) -> Result<Vec<Uuid>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT conversation_id FROM messages")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|(id,)| parse_uuid(id)).collect()
    }

    /// Adds the user to `read_by` of every cached message in the
    /// conversation they did not send, including rows on pages never
    /// loaded into memory. Additive and idempotent. Returns the number
    /// of rows changed.
    pub async fn mark_read(&self, conversation_id: Uuid, user_id: Uuid) -> Result<u64> {
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

    /// Removes a single row. Used when a failed record is re-keyed for
    /// a resend attempt.
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM messages WHERE id = $1").bind(id.to_string()).execute(&self.pool).await?;
        Ok(())
    }

    /// User-initiated clear history.
    pub async fn delete_conversation(&self, conversation_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM messages WHERE conversation_id = $1")
            .bind(conversation_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn upsert_conversation(&self, conversation: &crate::domain::Conversation) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO conversations (id, creator, chat_name, participants, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                chat_name = excluded.chat_name, participants = excluded.participants
            ",
        )
        .bind(conversation.id.to_string())
        .bind(conversation.creator.to_string())
        .bind(&conversation.chat_name)
        .bind(encode_read_by(&conversation.participants))
        .bind(to_millis(conversation.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn conversations(&self) -> Result<Vec<crate::domain::Conversation>> {
        let rows = sqlx::query_as::<_, ConversationRow>("SELECT * FROM conversations ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(ConversationRow::into_conversation).collect()
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: String,
    temp_id: Option<String>,
    conversation_id: String,
    sender: Option<String>,
    text: Option<String>,
    image: Option<String>,
    video: Option<String>,
    voice_message: Option<String>,
    duration: Option<i64>,
    read_by: String,
    created_at: i64,
    status: String,
    is_system: bool,
    local_attachment: Option<String>,
}

impl MessageRow {
    fn into_message(self) -> Result<Message> {
        let body = decode_body(
            self.text.as_deref(),
            self.image.as_deref(),
            self.video.as_deref(),
            self.voice_message.as_deref(),
            self.duration,
        )
        .ok_or_else(|| SyncError::Corrupt(format!("message {} has no payload", self.id)))?;

        Ok(Message {
            id: parse_uuid(&self.id)?,
            temp_id: self.temp_id.as_deref().map(parse_uuid).transpose()?,
            conversation_id: parse_uuid(&self.conversation_id)?,
            sender: self.sender.as_deref().map(parse_uuid).transpose()?,
            body,
            read_by: decode_read_by(&self.read_by)?,
            created_at: from_millis(self.created_at)?,
            status: DeliveryStatus::parse(&self.status)
                .ok_or_else(|| SyncError::Corrupt(format!("unknown status {:?}", self.status)))?,
            is_system: self.is_system,
            local_attachment: self.local_attachment,
        })
    }
}

#[derive(Debug, FromRow)]
struct ConversationRow {
    id: String,
    creator: String,
    chat_name: Option<String>,
    participants: String,
    created_at: i64,
}

impl ConversationRow {
    fn into_conversation(self) -> Result<crate::domain::Conversation> {
        Ok(crate::domain::Conversation {
            id: parse_uuid(&self.id)?,
            creator: parse_uuid(&self.creator)?,
            participants: decode_read_by(&self.participants)?,
            chat_name: self.chat_name,
            created_at: from_millis(self.created_at)?,
        })
    }
}

enum Column {
    Text,
    Image,
    Video,
    Voice,
}

fn body_column(body: &MessageBody, column: Column) -> Option<String> {
    match (body, column) {
        (MessageBody::Text(text), Column::Text) => Some(text.clone()),
        (MessageBody::Image { url }, Column::Image)
        | (MessageBody::Video { url }, Column::Video)
        | (MessageBody::Voice { url, .. }, Column::Voice) => Some(url.clone()),
        _ => None,
    }
}

const fn body_duration(body: &MessageBody) -> Option<i64> {
    match body {
        MessageBody::Voice { duration_secs, .. } => Some(*duration_secs),
        _ => None,
    }
}

fn decode_body(
    text: Option<&str>,
    image: Option<&str>,
    video: Option<&str>,
    voice: Option<&str>,
    duration: Option<i64>,
) -> Option<MessageBody> {
    if let Some(text) = text {
        Some(MessageBody::Text(text.to_string()))
    } else if let Some(video) = video {
        Some(MessageBody::Video { url: video.to_string() })
    } else if let Some(image) = image {
        Some(MessageBody::Image { url: image.to_string() })
    } else {
        voice.map(|v| MessageBody::Voice { url: v.to_string(), duration_secs: duration.unwrap_or_default() })
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| SyncError::Corrupt(format!("bad uuid {value:?}: {e}")))
}

fn encode_read_by(ids: &[Uuid]) -> String {
    serde_json::to_string(ids).unwrap_or_else(|_| "[]".to_string())
}

fn decode_read_by(json: &str) -> Result<Vec<Uuid>> {
    serde_json::from_str(json).map_err(|e| SyncError::Corrupt(format!("bad uuid list: {e}")))
}

fn from_millis(millis: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|e| SyncError::Corrupt(format!("bad timestamp {millis}: {e}")))
}

#[allow(clippy::cast_possible_truncation)]
fn to_millis(ts: OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000_000) as i64
}
