use crate::domain::{Conversation, MAX_CHAT_NAME_LEN};
use crate::error::{AppError, Result};
use crate::services::delivery_service::DeliveryService;
use crate::storage::conversation_repo::ConversationRepository;
use crate::storage::message_repo::MessageRepository;
use crate::storage::user_repo::UserRepository;
use time::OffsetDateTime;
use uuid::Uuid;

/// Conversation lifecycle: resolve-or-create by participant set,
/// membership growth and renames. Membership changes emit system
/// messages through the delivery service so every client sees them on
/// the same channel as user messages.
#[derive(Clone, Debug)]
pub struct ConversationService {
    conversations: ConversationRepository,
    messages: MessageRepository,
    users: UserRepository,
    delivery: DeliveryService,
}

impl ConversationService {
    #[must_use]
    pub fn new(
        conversations: ConversationRepository,
        messages: MessageRepository,
        users: UserRepository,
        delivery: DeliveryService,
    ) -> Self {
        Self { conversations, messages, users, delivery }
    }

    /// Returns the conversation for this exact participant set, creating
    /// it when none exists. The boolean is true when this call created
    /// it. Two racing first contacts converge on a single conversation
    /// through the unique participant key.
    #[tracing::instrument(err(level = "warn"), skip(self, participants))]
    pub async fn resolve_or_create(&self, creator: Uuid, participants: Vec<Uuid>) -> Result<(Conversation, bool)> {
        if participants.is_empty() {
            return Err(AppError::BadRequest("Participants must not be empty".to_string()));
        }
        if !participants.contains(&creator) {
            return Err(AppError::BadRequest("Creator must be a participant".to_string()));
        }

        if let Some(existing) = self.conversations.find_by_participants(&participants).await? {
            return Ok((existing, false));
        }

        let conversation = Conversation {
            id: Uuid::new_v4(),
            creator,
            participants,
            chat_name: None,
            created_at: OffsetDateTime::now_utc(),
        };

        if self.conversations.create(&conversation).await? {
            tracing::info!(conversation_id = %conversation.id, "Conversation created");
            return Ok((conversation, true));
        }

        // Lost the race; the winner's row carries the same key.
        let existing =
            self.conversations.find_by_participants(&conversation.participants).await?.ok_or(AppError::Internal)?;
        Ok((existing, false))
    }

    /// Adds users to a group chat. Each new member has the existing
    /// history marked read for them (it predates their membership) and a
    /// join announcement is broadcast to the whole conversation. An
    /// unknown user id is skipped, not fatal.
    #[tracing::instrument(err(level = "warn"), skip(self, user_ids), fields(%conversation_id))]
    pub async fn add_participants(
        &self,
        requester: Uuid,
        conversation_id: Uuid,
        user_ids: Vec<Uuid>,
    ) -> Result<Conversation> {
        let conversation = self.conversations.find_by_id(conversation_id).await?.ok_or(AppError::NotFound)?;
        if !conversation.is_participant(requester) {
            return Err(AppError::AuthError);
        }

        let mut joined = Vec::new();
        for user_id in user_ids {
            if conversation.is_participant(user_id) || joined.iter().any(|(id, _)| *id == user_id) {
                continue;
            }
            match self.users.username(user_id).await? {
                Some(username) => joined.push((user_id, username)),
                None => tracing::warn!(%user_id, "Skipping unknown user in addUsers"),
            }
        }

        if joined.is_empty() {
            return Ok(conversation);
        }

        let mut participants = conversation.participants.clone();
        participants.extend(joined.iter().map(|(id, _)| *id));
        self.conversations.set_participants(conversation_id, &participants).await?;

        let updated = Conversation { participants, ..conversation };

        let mut announcements = Vec::with_capacity(joined.len());
        for (_, username) in &joined {
            let announcement = self
                .delivery
                .create_system_message(conversation_id, format!("{username} joined the group chat"))
                .await?;
            announcements.push(announcement);
        }

        // Everything up to and including the join announcements counts
        // as read for the newcomers, so they start at zero unread.
        for (user_id, _) in &joined {
            self.messages.mark_all_read_by(*user_id, conversation_id).await?;
        }

        for announcement in &announcements {
            self.delivery.broadcast(&updated, announcement).await;
        }

        tracing::info!(%conversation_id, participant_count = updated.participants.len(), "Participants added");
        Ok(updated)
    }

    /// Renames a group chat. Only the creator may rename, and the name is
    /// capped at `MAX_CHAT_NAME_LEN` characters.
    #[tracing::instrument(err(level = "warn"), skip(self, new_name), fields(%conversation_id))]
    pub async fn rename(&self, requester: Uuid, conversation_id: Uuid, new_name: &str) -> Result<Conversation> {
        if new_name.is_empty() || new_name.chars().count() > MAX_CHAT_NAME_LEN {
            return Err(AppError::BadRequest(format!(
                "Chat name must be 1 to {MAX_CHAT_NAME_LEN} characters"
            )));
        }

        let conversation = self.conversations.find_by_id(conversation_id).await?.ok_or(AppError::NotFound)?;
        if conversation.creator != requester {
            return Err(AppError::AuthError);
        }

        self.conversations.set_chat_name(conversation_id, new_name).await?;
        Ok(Conversation { chat_name: Some(new_name.to_string()), ..conversation })
    }

    pub async fn conversations_for(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        self.conversations.for_user(user_id).await
    }
}
