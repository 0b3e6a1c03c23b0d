use crate::api::schemas::{AckBody, ClientEvent, ClientFrame, PresenceUpdate, ServerEvent, ServerFrame};
use crate::client::channel::{ChannelEvent, ChannelState, RealtimeChannel};
use crate::client::{Result, Session, SyncError};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::warn;

type PendingAcks = Arc<Mutex<HashMap<u64, oneshot::Sender<AckBody>>>>;

fn pending_entries(pending: &PendingAcks) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<AckBody>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases a pending ack slot when the waiting send future goes away,
/// acknowledged or not. An abandoned wait (the caller gave up before
/// the ack arrived) must not leave its entry behind until the next
/// reconnect.
struct AckSlot {
    pending: PendingAcks,
    ack_id: u64,
}

impl Drop for AckSlot {
    fn drop(&mut self) {
        pending_entries(&self.pending).remove(&self.ack_id);
    }
}

/// WebSocket implementation of [`RealtimeChannel`]. The connection task
/// reconnects with exponential backoff forever; state transitions are
/// published on both the watch and the event stream. Nothing is queued
/// while disconnected and nothing is replayed on reconnect.
#[derive(Debug)]
pub struct WsChannel {
    state_rx: watch::Receiver<ChannelState>,
    events_tx: broadcast::Sender<ChannelEvent>,
    outbound_tx: mpsc::Sender<ClientFrame>,
    pending: PendingAcks,
    next_ack_id: AtomicU64,
}

impl WsChannel {
    /// Spawns the connection task. The token rides the connect query so
    /// the server can room-join before processing any event.
    #[must_use]
    pub fn connect(session: &Session) -> Self {
        let url = format!("{}/gateway?token={}", session.ws_url.trim_end_matches('/'), session.auth_token);
        let (state_tx, state_rx) = watch::channel(ChannelState::Disconnected);
        let (events_tx, _) = broadcast::channel(64);
        let (outbound_tx, outbound_rx) = mpsc::channel(32);
        let pending: PendingAcks = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(run(url, state_tx, events_tx.clone(), outbound_rx, Arc::clone(&pending)));

        Self { state_rx, events_tx, outbound_tx, pending, next_ack_id: AtomicU64::new(1) }
    }

    /// Number of sends currently awaiting acknowledgment.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        pending_entries(&self.pending).len()
    }
}

#[async_trait]
impl RealtimeChannel for WsChannel {
    fn state(&self) -> ChannelState {
        *self.state_rx.borrow()
    }

    fn state_watch(&self) -> watch::Receiver<ChannelState> {
        self.state_rx.clone()
    }

    async fn send(&self, outgoing: crate::api::schemas::OutgoingMessage) -> Result<AckBody> {
        if self.state() != ChannelState::Connected {
            return Err(SyncError::NotConnected);
        }

        let ack_id = self.next_ack_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        pending_entries(&self.pending).insert(ack_id, tx);
        let _slot = AckSlot { pending: Arc::clone(&self.pending), ack_id };

        let frame = ClientFrame { ack_id: Some(ack_id), event: ClientEvent::Message(outgoing) };
        if self.outbound_tx.send(frame).await.is_err() {
            return Err(SyncError::Channel("channel task has stopped".to_string()));
        }

        rx.await.map_err(|_| SyncError::Channel("connection lost before acknowledgment".to_string()))
    }

    async fn send_presence(&self, last_online: OffsetDateTime) -> Result<()> {
        if self.state() != ChannelState::Connected {
            return Err(SyncError::NotConnected);
        }

        let frame = ClientFrame { ack_id: None, event: ClientEvent::LastOnline(PresenceUpdate { last_online }) };
        self.outbound_tx
            .send(frame)
            .await
            .map_err(|_| SyncError::Channel("channel task has stopped".to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events_tx.subscribe()
    }
}

async fn run(
    url: String,
    state_tx: watch::Sender<ChannelState>,
    events_tx: broadcast::Sender<ChannelEvent>,
    mut outbound_rx: mpsc::Receiver<ClientFrame>,
    pending: PendingAcks,
) {
    loop {
        set_state(&state_tx, &events_tx, ChannelState::Reconnecting);

        let connect = || async { connect_async(url.as_str()).await };
        let connected = connect
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(250))
                    .with_max_delay(Duration::from_secs(30))
                    .without_max_times(),
            )
            .notify(|err, dur| warn!(error = %err, retry_in = ?dur, "WebSocket connect failed"))
            .await;

        let Ok((stream, _)) = connected else {
            set_state(&state_tx, &events_tx, ChannelState::Error);
            return;
        };

        set_state(&state_tx, &events_tx, ChannelState::Connected);
        let (mut sink, mut source) = stream.split();

        loop {
            tokio::select! {
                frame = outbound_rx.recv() => {
                    let Some(frame) = frame else {
                        // Channel handle dropped; shut the task down.
                        let _ = sink.close().await;
                        set_state(&state_tx, &events_tx, ChannelState::Disconnected);
                        return;
                    };
                    match serde_json::to_string(&frame) {
                        Ok(json) => {
                            if sink.send(WsMessage::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "Failed to encode outbound frame"),
                    }
                }

                msg = source.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            handle_inbound(text.as_str(), &events_tx, &pending).await;
                        }
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket read error");
                            break;
                        }
                    }
                }
            }
        }

        // In-flight sends can never be acknowledged on a new connection.
        pending_entries(&pending).clear();
    }
}

async fn handle_inbound(text: &str, events_tx: &broadcast::Sender<ChannelEvent>, pending: &PendingAcks) {
    let frame: ServerFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Failed to decode inbound frame");
            return;
        }
    };

    match frame.event {
        ServerEvent::Ack(body) => {
            if let Some(ack_id) = frame.ack_id
                && let Some(tx) = pending_entries(pending).remove(&ack_id)
            {
                let _ = tx.send(body);
            }
        }
        ServerEvent::Message(message) => {
            let _ = events_tx.send(ChannelEvent::Message(message));
        }
        ServerEvent::LastOnlineUpdate(update) => {
            let _ = events_tx.send(ChannelEvent::LastOnlineUpdate(update));
        }
    }
}

fn set_state(state_tx: &watch::Sender<ChannelState>, events_tx: &broadcast::Sender<ChannelEvent>, state: ChannelState) {
    if *state_tx.borrow() != state {
        let _ = state_tx.send(state);
        let _ = events_tx.send(ChannelEvent::StateChanged(state));
    }
}
