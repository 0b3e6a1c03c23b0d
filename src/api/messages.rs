use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::api::schemas::{MarkReadRequest, WireMessage};
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

/// Every unread message across the caller's conversations, oldest first.
/// Clients call this on connect to catch up on what arrived offline.
pub async fn fetch_unread(auth: AuthUser, State(state): State<AppState>) -> Result<Json<Vec<WireMessage>>> {
    let messages = state.delivery_service.fetch_unread(auth.user_id).await?;
    Ok(Json(messages))
}

pub async fn mark_read(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<MarkReadRequest>,
) -> Result<StatusCode> {
    state.delivery_service.mark_read(auth.user_id, request.conversation_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn download_chat_history(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Vec<WireMessage>>> {
    let messages = state.delivery_service.download_history(auth.user_id, conversation_id).await?;
    Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// One page of a conversation's history, newest first. `page` is
/// 1-based; `limit` defaults to the configured page size and is capped
/// at the configured maximum.
pub async fn history(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<WireMessage>>> {
    let page = params.page.unwrap_or(1);
    let limit = params
        .limit
        .unwrap_or(state.config.messaging.history_page_size)
        .min(state.config.messaging.history_page_limit);
    let messages = state.delivery_service.fetch_history(auth.user_id, conversation_id, page, limit).await?;
    Ok(Json(messages))
}
