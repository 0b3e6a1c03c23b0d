use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::api::schemas::{AddUsersRequest, RenameChatRequest, ResolveConversationRequest, WireConversation};
use crate::error::Result;
use axum::{Json, extract::State, http::StatusCode};

/// Resolve-or-create for a participant set. Replies 201 when this call
/// created the conversation and 200 when it already existed, so a client
/// can tell first contact from a lookup.
pub async fn fetch_id(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<ResolveConversationRequest>,
) -> Result<(StatusCode, Json<WireConversation>)> {
    let (conversation, created) =
        state.conversation_service.resolve_or_create(auth.user_id, request.participants).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(WireConversation::from(&conversation))))
}

pub async fn fetch_all(auth: AuthUser, State(state): State<AppState>) -> Result<Json<Vec<WireConversation>>> {
    let conversations = state.conversation_service.conversations_for(auth.user_id).await?;
    Ok(Json(conversations.iter().map(WireConversation::from).collect()))
}

pub async fn add_users(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<AddUsersRequest>,
) -> Result<Json<WireConversation>> {
    let conversation = state
        .conversation_service
        .add_participants(auth.user_id, request.conversation_id, request.user_ids)
        .await?;
    Ok(Json(WireConversation::from(&conversation)))
}

pub async fn change_group_chat_name(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<RenameChatRequest>,
) -> Result<Json<WireConversation>> {
    let conversation =
        state.conversation_service.rename(auth.user_id, request.conversation_id, &request.new_name).await?;
    Ok(Json(WireConversation::from(&conversation)))
}
