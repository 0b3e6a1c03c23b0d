use crate::config::Config;
use crate::services::conversation_service::ConversationService;
use crate::services::delivery_service::DeliveryService;
use crate::services::presence_service::PresenceService;
use crate::services::rooms::RoomRegistry;
use axum::body::Body;
use axum::http::Request;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod conversations;
pub mod gateway;
pub mod messages;
pub mod middleware;
pub mod schemas;

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Config,
    pub delivery_service: DeliveryService,
    pub conversation_service: ConversationService,
    pub presence_service: PresenceService,
    pub rooms: Arc<RoomRegistry>,
    pub shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

#[derive(Clone, Debug)]
pub struct ServiceContainer {
    pub delivery_service: DeliveryService,
    pub conversation_service: ConversationService,
    pub presence_service: PresenceService,
    pub rooms: Arc<RoomRegistry>,
}

/// Configures and returns the primary application router.
pub fn app_router(
    config: Config,
    services: ServiceContainer,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> Router {
    let state = AppState {
        config,
        delivery_service: services.delivery_service,
        conversation_service: services.conversation_service,
        presence_service: services.presence_service,
        rooms: services.rooms,
        shutdown_rx,
    };

    let message_routes = Router::new()
        .route("/fetchUnread", get(messages::fetch_unread))
        .route("/markRead", post(messages::mark_read))
        .route("/downloadChatHistory/{conversationId}", get(messages::download_chat_history))
        .route("/history/{conversationId}", get(messages::history));

    let conversation_routes = Router::new()
        .route("/fetchId", post(conversations::fetch_id))
        .route("/fetchAll", get(conversations::fetch_all))
        .route("/addUsers", post(conversations::add_users))
        .route("/changeGroupChatName", post(conversations::change_group_chat_name));

    Router::new()
        .nest("/message", message_routes)
        .nest("/conversation", conversation_routes)
        .route("/gateway", get(gateway::websocket_handler))
        .layer(PropagateRequestIdLayer::new(axum::http::HeaderName::from_static("x-request-id")))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(move |request: &Request<Body>| {
                    let request_id = request
                        .extensions()
                        .get::<tower_http::request_id::RequestId>()
                        .map(|id| id.header_value().to_str().unwrap_or_default())
                        .unwrap_or_default()
                        .to_string();

                    tracing::info_span!(
                        "request",
                        "request_id" = %request_id,
                        "http.request.method" = %request.method(),
                        "url.path" = %request.uri().path(),
                        "http.response.status_code" = tracing::field::Empty,
                        "otel.kind" = "server",
                        "user_id" = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                        let status = response.status();
                        tracing::Span::current().record("http.response.status_code", status.as_u16());

                        tracing::info!(
                            latency_ms = %latency.as_millis(),
                            status = %status.as_u16(),
                            "request completed"
                        );
                    },
                )
                .on_failure(|error, _latency, _span: &tracing::Span| {
                    tracing::error!(error = %error, "request failed");
                }),
        )
        .layer(SetRequestIdLayer::new(
            axum::http::HeaderName::from_static("x-request-id"),
            middleware::MakeRequestUuidOrHeader,
        ))
        .with_state(state)
}
