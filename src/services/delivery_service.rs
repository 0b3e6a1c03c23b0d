use crate::api::schemas::{OutgoingMessage, ServerEvent, WireMessage};
use crate::domain::Conversation;
use crate::error::{AppError, Result};
use crate::services::push::PushNotifier;
use crate::services::rooms::RoomRegistry;
use crate::storage::conversation_repo::ConversationRepository;
use crate::storage::message_repo::MessageRepository;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    created_total: Counter<u64>,
    fetch_batch_size: Histogram<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("driftchat");
        Self {
            created_total: meter
                .u64_counter("driftchat_messages_created_total")
                .with_description("Total messages accepted for delivery")
                .build(),
            fetch_batch_size: meter
                .u64_histogram("driftchat_message_fetch_batch_size")
                .with_description("Number of messages returned by a single fetch")
                .build(),
        }
    }
}

/// Server-side counterpart of the client synchronizer: persists sends,
/// fans them out to every participant's room (the sender's echo
/// included) and hands unread/history/read-receipt queries to the repo.
#[derive(Clone, Debug)]
pub struct DeliveryService {
    messages: MessageRepository,
    conversations: ConversationRepository,
    rooms: Arc<RoomRegistry>,
    push: Arc<dyn PushNotifier>,
    metrics: Metrics,
}

impl DeliveryService {
    #[must_use]
    pub fn new(
        messages: MessageRepository,
        conversations: ConversationRepository,
        rooms: Arc<RoomRegistry>,
        push: Arc<dyn PushNotifier>,
    ) -> Self {
        Self { messages, conversations, rooms, push, metrics: Metrics::new() }
    }

    /// Validates and persists a client-submitted send, assigning the
    /// server id and timestamp. Redelivery of a temporary id the server
    /// has already stored returns the existing record instead of a
    /// duplicate, so a client retry can never double-send.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the conversation does not exist,
    /// `AppError::AuthError` if the sender is not a participant and
    /// `AppError::BadRequest` for an invalid payload.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, outgoing),
        fields(conversation_id = %outgoing.conversation_id, temp_id = %outgoing.temp_id)
    )]
    pub async fn create_message(&self, sender: Uuid, outgoing: &OutgoingMessage) -> Result<(Conversation, WireMessage)> {
        let conversation =
            self.conversations.find_by_id(outgoing.conversation_id).await?.ok_or(AppError::NotFound)?;

        if !conversation.is_participant(sender) {
            return Err(AppError::AuthError);
        }

        validate_payload(outgoing)?;

        let message = WireMessage {
            id: Uuid::new_v4(),
            conversation_id: outgoing.conversation_id,
            sender: Some(sender),
            temp_id: Some(outgoing.temp_id),
            text: outgoing.text.clone(),
            image: outgoing.image.clone(),
            video: outgoing.video.clone(),
            voice_message: outgoing.voice_message.clone(),
            duration: outgoing.duration,
            read_by: vec![sender],
            created_at: OffsetDateTime::now_utc(),
            is_system_message: false,
        };

        if self.messages.create(&message).await? {
            self.metrics.created_total.add(1, &[KeyValue::new("kind", "user")]);
            tracing::debug!(message_id = %message.id, "Message stored for delivery");
            return Ok((conversation, message));
        }

        // The temporary id has been seen before; hand back what was
        // stored the first time.
        let existing = self.messages.find_by_temp_id(outgoing.temp_id).await?.ok_or(AppError::Internal)?;
        tracing::debug!(message_id = %existing.id, "Duplicate temp id, returning stored message");
        self.metrics.created_total.add(1, &[KeyValue::new("kind", "duplicate")]);
        Ok((conversation, existing))
    }

    /// Persists a server-originated system message for the conversation.
    pub async fn create_system_message(&self, conversation_id: Uuid, text: String) -> Result<WireMessage> {
        let message = WireMessage {
            id: Uuid::new_v4(),
            conversation_id,
            sender: None,
            temp_id: None,
            text: Some(text),
            image: None,
            video: None,
            voice_message: None,
            duration: None,
            read_by: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
            is_system_message: true,
        };

        self.messages.create(&message).await?;
        self.metrics.created_total.add(1, &[KeyValue::new("kind", "system")]);
        Ok(message)
    }

    /// Fans the message out to every participant's room and the push
    /// collaborator. A failure for one participant is logged and never
    /// aborts delivery to the rest.
    pub async fn broadcast(&self, conversation: &Conversation, message: &WireMessage) {
        let event = ServerEvent::Message(message.clone());
        for &participant in &conversation.participants {
            self.rooms.publish(participant, &event);
            if let Err(e) = self.push.notify(participant, message).await {
                tracing::warn!(error = %e, %participant, "Push notification failed");
            }
        }
    }

    pub async fn fetch_unread(&self, user_id: Uuid) -> Result<Vec<WireMessage>> {
        let messages = self.messages.fetch_unread(user_id).await?;
        self.metrics.fetch_batch_size.record(messages.len() as u64, &[]);
        Ok(messages)
    }

    /// Bulk read receipt: adds the user to `read_by` of every message in
    /// the conversation they did not send.
    pub async fn mark_read(&self, user_id: Uuid, conversation_id: Uuid) -> Result<()> {
        self.messages.mark_read(user_id, conversation_id).await?;
        Ok(())
    }

    /// The full history of a conversation, also marking every message
    /// read by the requester so the download settles their unread state.
    pub async fn download_history(&self, user_id: Uuid, conversation_id: Uuid) -> Result<Vec<WireMessage>> {
        self.require_participant(user_id, conversation_id).await?;
        self.messages.mark_all_read_by(user_id, conversation_id).await?;
        let messages = self.messages.fetch_all(conversation_id).await?;
        self.metrics.fetch_batch_size.record(messages.len() as u64, &[]);
        Ok(messages)
    }

    /// One page of history, newest first. Pages are 1-based.
    pub async fn fetch_history(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<Vec<WireMessage>> {
        if page < 1 || limit < 1 {
            return Err(AppError::BadRequest("Page and limit must be positive".to_string()));
        }
        self.require_participant(user_id, conversation_id).await?;
        let messages = self.messages.fetch_page(conversation_id, limit, (page - 1) * limit).await?;
        self.metrics.fetch_batch_size.record(messages.len() as u64, &[]);
        Ok(messages)
    }

    async fn require_participant(&self, user_id: Uuid, conversation_id: Uuid) -> Result<Conversation> {
        let conversation = self.conversations.find_by_id(conversation_id).await?.ok_or(AppError::NotFound)?;
        if !conversation.is_participant(user_id) {
            return Err(AppError::AuthError);
        }
        Ok(conversation)
    }
}

/// A send must carry exactly one payload variant; voice additionally
/// requires a positive duration.
fn validate_payload(outgoing: &OutgoingMessage) -> Result<()> {
    let populated = [
        outgoing.text.as_deref(),
        outgoing.image.as_deref(),
        outgoing.video.as_deref(),
        outgoing.voice_message.as_deref(),
    ]
    .iter()
    .filter(|field| field.is_some_and(|value| !value.is_empty()))
    .count();

    if populated != 1 {
        return Err(AppError::BadRequest("Message must carry exactly one payload".to_string()));
    }
    if outgoing.voice_message.as_deref().is_some_and(|v| !v.is_empty()) && outgoing.duration.unwrap_or_default() <= 0 {
        return Err(AppError::BadRequest("Voice message requires a positive duration".to_string()));
    }
    Ok(())
}
