use crate::api::AppState;
use crate::api::schemas::{AckBody, ClientEvent, ClientFrame, ServerEvent, ServerFrame};
use crate::services::auth::verify_jwt;
use axum::{
    extract::{
        Query, State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    http::Extensions,
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use opentelemetry::global;
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tower_http::request_id::RequestId;
use tracing::{Instrument, warn};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct WsParams {
    token: String,
}

/// Realtime channel handshake. Browsers cannot set headers on a
/// WebSocket upgrade, so the token rides a query parameter.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    extensions: Extensions,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let request_id = extensions
        .get::<RequestId>()
        .map(|id| id.header_value().to_str().unwrap_or_default().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match verify_jwt(&params.token, &state.config.auth.jwt_secret) {
        Ok(claims) => ws.on_upgrade(move |socket| handle_socket(socket, state, claims.sub, request_id)),
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket handshake failed: invalid token");
            axum::http::StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid, request_id: String) {
    let span = tracing::info_span!(
        "websocket_session",
        request_id = %request_id,
        user_id = %user_id,
        otel.kind = "server",
        ws.session_id = %Uuid::new_v4()
    );

    async move {
        let meter = global::meter("driftchat");
        let active_connections = meter
            .i64_up_down_counter("driftchat_websocket_active_connections")
            .with_description("Number of active WebSocket connections")
            .build();
        active_connections.add(1, &[]);

        tracing::info!("WebSocket connected");
        let mut room_rx = state.rooms.subscribe(user_id);

        let (mut ws_sink, mut ws_stream) = socket.split();
        let mut shutdown_rx = state.shutdown_rx.clone();

        // Writer half. The bounded buffer exerts backpressure on frame
        // production when the client reads slowly.
        let (out_tx, mut out_rx) =
            mpsc::channel::<WsMessage>(state.config.websocket.outbound_buffer_size);
        let writer = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if ws_sink.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = ws_sink.close().await;
        });

        loop {
            if *shutdown_rx.borrow() {
                tracing::info!("Shutdown signal received, closing WebSocket");
                let _ = out_tx
                    .send(WsMessage::Close(Some(axum::extract::ws::CloseFrame {
                        code: axum::extract::ws::close_code::AWAY,
                        reason: "Server shutting down".into(),
                    })))
                    .await;
                break;
            }

            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {}

                msg = ws_stream.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            let reply = handle_frame(&state, user_id, text.as_str()).await;
                            if let Some(frame) = reply
                                && !send_frame(&out_tx, &frame).await
                            {
                                break;
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) => break,
                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            break;
                        }
                        None => break,
                        _ => {}
                    }
                }

                result = room_rx.recv() => {
                    match result {
                        Ok(event) => {
                            let frame = ServerFrame { ack_id: None, event };
                            if !send_frame(&out_tx, &frame).await {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // The client recovers skipped events via the
                            // unread fetch on its next resync.
                            warn!(skipped, "Session lagged behind its room");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }

        drop(out_tx);
        let _ = writer.await;
        drop(room_rx);
        state.rooms.prune(user_id);
        active_connections.add(-1, &[]);
        tracing::info!("WebSocket disconnected");
    }
    .instrument(span)
    .await;
}

/// Dispatches one inbound frame. Returns the reply frame when the event
/// is acknowledged, carrying the client's `ackId` back unchanged.
async fn handle_frame(state: &AppState, user_id: Uuid, text: &str) -> Option<ServerFrame> {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Failed to decode WebSocket frame");
            return None;
        }
    };

    match frame.event {
        ClientEvent::Message(outgoing) => {
            let ack = match state.delivery_service.create_message(user_id, &outgoing).await {
                Ok((conversation, message)) => {
                    state.delivery_service.broadcast(&conversation, &message).await;
                    AckBody::success()
                }
                Err(e) => {
                    warn!(error = %e, "Message delivery failed");
                    AckBody::error()
                }
            };
            Some(ServerFrame { ack_id: frame.ack_id, event: ServerEvent::Ack(ack) })
        }
        ClientEvent::LastOnline(presence) => {
            let ack = match state.presence_service.update_last_online(user_id, presence.last_online).await {
                Ok(()) => AckBody::success(),
                Err(e) => {
                    warn!(error = %e, "Presence update failed");
                    AckBody::error()
                }
            };
            frame.ack_id.map(|ack_id| ServerFrame { ack_id: Some(ack_id), event: ServerEvent::Ack(ack) })
        }
    }
}

/// Encodes and queues one outbound frame. Returns whether the writer
/// half is still alive.
async fn send_frame(out_tx: &mpsc::Sender<WsMessage>, frame: &ServerFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => out_tx.send(WsMessage::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to encode WebSocket frame");
            true
        }
    }
}
