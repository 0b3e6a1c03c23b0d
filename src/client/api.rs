use crate::api::schemas::{
    AddUsersRequest, MarkReadRequest, RenameChatRequest, ResolveConversationRequest, WireConversation, WireMessage,
};
use crate::client::{Result, Session, SyncError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use uuid::Uuid;

/// The delivery server's HTTP surface as the client consumes it.
#[async_trait]
pub trait DeliveryApi: Send + Sync + Debug {
    async fn fetch_unread(&self) -> Result<Vec<WireMessage>>;
    async fn mark_read(&self, conversation_id: Uuid) -> Result<()>;
    async fn download_chat_history(&self, conversation_id: Uuid) -> Result<Vec<WireMessage>>;
    async fn fetch_history(&self, conversation_id: Uuid, page: i64, limit: i64) -> Result<Vec<WireMessage>>;
    async fn resolve_conversation(&self, participants: Vec<Uuid>) -> Result<WireConversation>;
    async fn fetch_conversations(&self) -> Result<Vec<WireConversation>>;
    async fn add_users(&self, conversation_id: Uuid, user_ids: Vec<Uuid>) -> Result<WireConversation>;
    async fn rename_group_chat(&self, conversation_id: Uuid, new_name: String) -> Result<WireConversation>;
}

#[derive(Clone, Debug)]
pub struct HttpDeliveryApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpDeliveryApi {
    #[must_use]
    pub fn new(session: &Session) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: session.base_url.trim_end_matches('/').to_string(),
            token: session.auth_token.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.http.get(self.url(path)).bearer_auth(&self.token).send().await?;
        parse(response).await
    }

    async fn post_json<B: serde::Serialize + Sync, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let response = self.http.post(self.url(path)).bearer_auth(&self.token).json(body).send().await?;
        parse(response).await
    }
}

/// Reads the body as `T` on success; otherwise surfaces the server's
/// structured `{"error": ...}` body.
async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: String,
    }

    let message = response
        .json::<ErrorBody>()
        .await
        .map_or_else(|_| status.canonical_reason().unwrap_or("unknown error").to_string(), |body| body.error);

    Err(SyncError::Api { status: status.as_u16(), message })
}

#[async_trait]
impl DeliveryApi for HttpDeliveryApi {
    async fn fetch_unread(&self) -> Result<Vec<WireMessage>> {
        self.get_json("/message/fetchUnread").await
    }

    async fn mark_read(&self, conversation_id: Uuid) -> Result<()> {
        let response = self
            .http
            .post(self.url("/message/markRead"))
            .bearer_auth(&self.token)
            .json(&MarkReadRequest { conversation_id })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(SyncError::Api { status: status.as_u16(), message: "markRead failed".to_string() })
    }

    async fn download_chat_history(&self, conversation_id: Uuid) -> Result<Vec<WireMessage>> {
        self.get_json(&format!("/message/downloadChatHistory/{conversation_id}")).await
    }

    async fn fetch_history(&self, conversation_id: Uuid, page: i64, limit: i64) -> Result<Vec<WireMessage>> {
        self.get_json(&format!("/message/history/{conversation_id}?page={page}&limit={limit}")).await
    }

    async fn resolve_conversation(&self, participants: Vec<Uuid>) -> Result<WireConversation> {
        self.post_json("/conversation/fetchId", &ResolveConversationRequest { participants }).await
    }

    async fn fetch_conversations(&self) -> Result<Vec<WireConversation>> {
        self.get_json("/conversation/fetchAll").await
    }

    async fn add_users(&self, conversation_id: Uuid, user_ids: Vec<Uuid>) -> Result<WireConversation> {
        self.post_json("/conversation/addUsers", &AddUsersRequest { conversation_id, user_ids }).await
    }

    async fn rename_group_chat(&self, conversation_id: Uuid, new_name: String) -> Result<WireConversation> {
        self.post_json("/conversation/changeGroupChatName", &RenameChatRequest { conversation_id, new_name }).await
    }
}
