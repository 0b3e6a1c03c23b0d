use crate::api::schemas::{OutgoingMessage, WireMessage};
use crate::client::api::DeliveryApi;
use crate::client::channel::{ChannelEvent, ChannelState, RealtimeChannel};
use crate::client::store::MessageStore;
use crate::client::{Result, Session, SyncError};
use crate::domain::{DeliveryStatus, Message, MessageBody};
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{Mutex, broadcast};
use uuid::Uuid;

/// Per-conversation pagination cursor. `Next` holds the 1-based page the
/// next `load_page` call will read; `Exhausted` makes further calls
/// no-ops until history is cleared or re-downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageCursor {
    Next(i64),
    Exhausted,
}

#[derive(Debug, Default)]
struct SyncState {
    /// Per conversation, ordered by `created_at` ascending.
    messages: HashMap<Uuid, Vec<Message>>,
    cursors: HashMap<Uuid, PageCursor>,
    /// Conversations with a page load in flight. Concurrent loads for
    /// the same conversation are dropped, not queued.
    fetching: HashSet<Uuid>,
    presence: HashMap<Uuid, OffsetDateTime>,
    /// Broadcasts for this conversation are marked read on arrival.
    active_conversation: Option<Uuid>,
}

#[derive(Clone, Debug)]
struct Metrics {
    reconciled_total: Counter<u64>,
    sends_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("driftchat");
        Self {
            reconciled_total: meter
                .u64_counter("driftchat_client_reconciled_total")
                .with_description("Broadcasts absorbed, by reconciliation outcome")
                .build(),
            sends_total: meter
                .u64_counter("driftchat_client_sends_total")
                .with_description("Outgoing sends, by outcome")
                .build(),
        }
    }
}

/// Owns the in-memory ordered view of messages across conversations and
/// mediates every state transition a message undergoes. All state sits
/// behind one mutex, so event callbacks and API calls are serialized the
/// way a single-threaded UI loop would serialize them. The lock is never
/// held across store or network I/O.
#[derive(Debug)]
pub struct Synchronizer {
    session: Session,
    store: MessageStore,
    channel: Arc<dyn RealtimeChannel>,
    api: Arc<dyn DeliveryApi>,
    state: Mutex<SyncState>,
    metrics: Metrics,
}

impl Synchronizer {
    #[must_use]
    pub fn new(
        session: Session,
        store: MessageStore,
        channel: Arc<dyn RealtimeChannel>,
        api: Arc<dyn DeliveryApi>,
    ) -> Self {
        Self { session, store, channel, api, state: Mutex::new(SyncState::default()), metrics: Metrics::new() }
    }

    /// Creates a provisional record (fresh temp id, status `Sending`,
    /// read by self) visible locally before any I/O, then transmits it
    /// with a bounded ack wait. Timeout, channel error, disconnection or
    /// a non-success ack all mark the same record `Failed` by its temp
    /// id. Never creates a second record. Returns the temp id.
    ///
    /// `local_attachment` is a client-only reference (a picked photo
    /// awaiting upload); reconciliation carries it over to the
    /// authoritative record.
    pub async fn compose_and_send(
        &self,
        conversation_id: Uuid,
        body: MessageBody,
        local_attachment: Option<String>,
    ) -> Result<Uuid> {
        let mut message = Message::provisional(conversation_id, self.session.user_id, body);
        message.local_attachment = local_attachment;

        {
            let mut state = self.state.lock().await;
            insert_ordered(state.messages.entry(conversation_id).or_default(), message.clone());
        }
        self.store.upsert(&message).await?;

        self.transmit(message).await
    }

    /// Retries a `Failed` record as a fresh send attempt: same content,
    /// new temp id (one temp id per attempt, so the server-side dedup
    /// never conflates attempts). The record is re-keyed, never copied.
    pub async fn resend(&self, conversation_id: Uuid, message_id: Uuid) -> Result<Uuid> {
        let new_temp = Uuid::new_v4();
        let message = {
            let mut state = self.state.lock().await;
            let list =
                state.messages.get_mut(&conversation_id).ok_or(SyncError::MissingRecord(message_id))?;
            let pos = list
                .iter()
                .position(|m| m.id == message_id && m.status == DeliveryStatus::Failed)
                .ok_or(SyncError::MissingRecord(message_id))?;

            // The fresh timestamp moves the record to the end of the
            // collection, so it is re-inserted rather than mutated in
            // place.
            let mut record = list.remove(pos);
            record.id = new_temp;
            record.temp_id = Some(new_temp);
            record.status = DeliveryStatus::Sending;
            record.created_at = OffsetDateTime::now_utc();
            insert_ordered(list, record.clone());
            record
        };

        self.store.remove(message_id).await?;
        self.store.upsert(&message).await?;
        self.transmit(message).await
    }

    async fn transmit(&self, message: Message) -> Result<Uuid> {
        let conversation_id = message.conversation_id;
        let temp_id = message.id;

        if self.channel.state() != ChannelState::Connected {
            tracing::warn!(%temp_id, "Channel not connected, send failed fast");
            self.metrics.sends_total.add(1, &[KeyValue::new("outcome", "not_connected")]);
            self.mark_failed(conversation_id, temp_id).await?;
            return Err(SyncError::NotConnected);
        }

        let outgoing = OutgoingMessage::new(conversation_id, self.session.user_id, temp_id, &message.body);
        let outcome = tokio::time::timeout(self.session.ack_timeout, self.channel.send(outgoing)).await;

        match outcome {
            Ok(Ok(ack)) if ack.is_success() => {
                self.metrics.sends_total.add(1, &[KeyValue::new("outcome", "acked")]);
                Ok(temp_id)
            }
            Ok(Ok(_)) => {
                tracing::warn!(%temp_id, "Send rejected by server");
                self.metrics.sends_total.add(1, &[KeyValue::new("outcome", "rejected")]);
                self.mark_failed(conversation_id, temp_id).await?;
                Err(SyncError::SendRejected)
            }
            Ok(Err(e)) => {
                tracing::warn!(%temp_id, error = %e, "Send failed");
                self.metrics.sends_total.add(1, &[KeyValue::new("outcome", "error")]);
                self.mark_failed(conversation_id, temp_id).await?;
                Err(e)
            }
            Err(_) => {
                tracing::warn!(%temp_id, "Acknowledgment timed out");
                self.metrics.sends_total.add(1, &[KeyValue::new("outcome", "timeout")]);
                self.mark_failed(conversation_id, temp_id).await?;
                Err(SyncError::AckTimeout)
            }
        }
    }

    /// Marks the provisional record `Failed`, unless the broadcast echo
    /// already reconciled it to `Sent` (a late ack loss; the record is
    /// authoritative and stays).
    async fn mark_failed(&self, conversation_id: Uuid, temp_id: Uuid) -> Result<()> {
        let updated = {
            let mut state = self.state.lock().await;
            state.messages.get_mut(&conversation_id).and_then(|list| {
                list.iter_mut()
                    .find(|m| m.temp_id == Some(temp_id) && m.status == DeliveryStatus::Sending)
                    .map(|m| {
                        m.status = DeliveryStatus::Failed;
                        m.clone()
                    })
            })
        };

        if let Some(message) = updated {
            self.store.upsert(&message).await?;
        }
        Ok(())
    }

    /// Absorbs a broadcast delivery (own echo or another participant's
    /// message). Reconciliation order is load-bearing:
    ///
    /// 1. a record with the same `id` is replaced in place;
    /// 2. a record keyed by the message's temp id is upgraded to the
    ///    authoritative fields, keeping a still-local attachment;
    /// 3. otherwise the message is appended as new.
    ///
    /// Running rule 2 before rule 3 is what keeps a self-sent message
    /// from appearing twice.
    pub async fn receive_broadcast(&self, wire: WireMessage) -> Result<()> {
        let Some(mut incoming) = wire.into_message(DeliveryStatus::Sent) else {
            tracing::warn!("Dropping broadcast with no payload");
            return Ok(());
        };

        let outcome = {
            let mut state = self.state.lock().await;
            let list = state.messages.entry(incoming.conversation_id).or_default();

            if let Some(existing) = list.iter_mut().find(|m| m.id == incoming.id) {
                *existing = incoming.clone();
                "redelivered"
            } else if let Some(pos) =
                incoming.temp_id.and_then(|temp_id| list.iter().position(|m| m.id == temp_id))
            {
                incoming.local_attachment = list[pos].local_attachment.take();
                list[pos] = incoming.clone();
                list.sort_by_key(|m| m.created_at);
                "upgraded"
            } else {
                insert_ordered(list, incoming.clone());
                "appended"
            }
        };
        self.metrics.reconciled_total.add(1, &[KeyValue::new("outcome", outcome)]);

        self.store.upsert(&incoming).await?;
        Ok(())
    }

    /// Cache-first page load, oldest pages last. Reads one batch from the
    /// store at the current cursor and merges it into memory. Fewer rows
    /// than the batch size exhausts the cursor; further calls (and calls
    /// racing a load in flight) are dropped. Returns the merged row
    /// count, zero for dropped or exhausted calls.
    pub async fn load_page(&self, conversation_id: Uuid, batch: i64) -> Result<usize> {
        let page = {
            let mut state = self.state.lock().await;
            if state.fetching.contains(&conversation_id) {
                return Ok(0);
            }
            match state.cursors.get(&conversation_id).copied().unwrap_or(PageCursor::Next(1)) {
                PageCursor::Exhausted => return Ok(0),
                PageCursor::Next(page) => {
                    state.fetching.insert(conversation_id);
                    page
                }
            }
        };

        let fetched = self.store.page(conversation_id, batch, (page - 1) * batch).await;

        let mut state = self.state.lock().await;
        state.fetching.remove(&conversation_id);
        let rows = fetched?;

        let cursor =
            if (rows.len() as i64) < batch { PageCursor::Exhausted } else { PageCursor::Next(page + 1) };
        state.cursors.insert(conversation_id, cursor);

        let list = state.messages.entry(conversation_id).or_default();
        let mut merged = 0;
        for message in rows.into_iter().rev() {
            if !list.iter().any(|m| m.id == message.id) {
                insert_ordered(list, message);
                merged += 1;
            }
        }
        Ok(merged)
    }

    /// Adds self to `read_by` of every unread message in the
    /// conversation, persists immediately, then notifies the server.
    /// The cache update is a single bulk statement, so rows on pages
    /// never loaded into memory are covered too and cannot resurrect as
    /// unread after a restart. Local-first: a failed round trip is
    /// logged and never rolls the local read state back.
    pub async fn mark_conversation_read(&self, conversation_id: Uuid) -> Result<()> {
        let updated = {
            let mut state = self.state.lock().await;
            let mut count = 0;
            if let Some(list) = state.messages.get_mut(&conversation_id) {
                for message in list.iter_mut().filter(|m| m.is_unread_for(self.session.user_id)) {
                    message.read_by.push(self.session.user_id);
                    count += 1;
                }
            }
            count
        };

        let persisted = self.store.mark_read(conversation_id, self.session.user_id).await?;

        if (updated > 0 || persisted > 0)
            && let Err(e) = self.api.mark_read(conversation_id).await
        {
            tracing::warn!(error = %e, %conversation_id, "Server markRead failed, local state kept");
        }
        Ok(())
    }

    /// Messages with another sender that self has not read. Pure query.
    pub async fn unread_count(&self, conversation_id: Uuid) -> usize {
        let state = self.state.lock().await;
        state
            .messages
            .get(&conversation_id)
            .map_or(0, |list| list.iter().filter(|m| m.is_unread_for(self.session.user_id)).count())
    }

    pub async fn total_unread(&self) -> usize {
        let state = self.state.lock().await;
        state
            .messages
            .values()
            .flat_map(|list| list.iter())
            .filter(|m| m.is_unread_for(self.session.user_id))
            .count()
    }

    /// Reconnect resynchronization: fetch everything unread and feed it
    /// through reconciliation. Idempotent against late broadcasts of the
    /// same messages. Returns how many messages the server handed back.
    pub async fn resync(&self) -> Result<usize> {
        let unread = self.api.fetch_unread().await?;
        let count = unread.len();
        for wire in unread {
            self.receive_broadcast(wire).await?;
        }
        tracing::debug!(count, "Resync complete");
        Ok(count)
    }

    /// Full history fetch for one conversation, merged via
    /// reconciliation. The pagination cursor restarts from the first
    /// page since the cache now holds the complete history.
    pub async fn download_chat_history(&self, conversation_id: Uuid) -> Result<usize> {
        let history = self.api.download_chat_history(conversation_id).await?;
        let count = history.len();
        for wire in history {
            self.receive_broadcast(wire).await?;
        }

        let mut state = self.state.lock().await;
        state.cursors.remove(&conversation_id);
        Ok(count)
    }

    /// User-initiated cache clear for one conversation.
    pub async fn clear_history(&self, conversation_id: Uuid) -> Result<()> {
        self.store.delete_conversation(conversation_id).await?;
        let mut state = self.state.lock().await;
        state.messages.remove(&conversation_id);
        state.cursors.remove(&conversation_id);
        Ok(())
    }

    pub async fn messages(&self, conversation_id: Uuid) -> Vec<Message> {
        let state = self.state.lock().await;
        state.messages.get(&conversation_id).cloned().unwrap_or_default()
    }

    pub async fn last_message(&self, conversation_id: Uuid) -> Option<Message> {
        let state = self.state.lock().await;
        state.messages.get(&conversation_id).and_then(|list| list.last().cloned())
    }

    pub async fn last_online(&self, user_id: Uuid) -> Option<OffsetDateTime> {
        let state = self.state.lock().await;
        state.presence.get(&user_id).copied()
    }

    pub async fn set_active_conversation(&self, conversation_id: Option<Uuid>) {
        let mut state = self.state.lock().await;
        state.active_conversation = conversation_id;
    }

    /// Best-effort presence announcement.
    pub async fn publish_presence(&self) {
        if let Err(e) = self.channel.send_presence(OffsetDateTime::now_utc()).await {
            tracing::debug!(error = %e, "Presence update not sent");
        }
    }

    /// Drives the channel event stream until it closes. Broadcast
    /// messages go through reconciliation (and are auto-marked read when
    /// their conversation is the active one); a transition to
    /// `Connected` triggers a resync, as does a lagged event stream.
    ///
    /// An already-connected channel is resynced up front, since its
    /// `Connected` transition predates this subscription.
    pub async fn run(&self, mut events: broadcast::Receiver<ChannelEvent>) {
        if self.channel.state() == ChannelState::Connected
            && let Err(e) = self.resync().await
        {
            tracing::warn!(error = %e, "Initial resync failed");
        }

        loop {
            match events.recv().await {
                Ok(ChannelEvent::Message(wire)) => {
                    let conversation_id = wire.conversation_id;
                    if let Err(e) = self.receive_broadcast(wire).await {
                        tracing::warn!(error = %e, "Failed to absorb broadcast");
                        continue;
                    }
                    let active = self.state.lock().await.active_conversation;
                    if active == Some(conversation_id)
                        && let Err(e) = self.mark_conversation_read(conversation_id).await
                    {
                        tracing::warn!(error = %e, "Failed to mark active conversation read");
                    }
                }
                Ok(ChannelEvent::LastOnlineUpdate(update)) => {
                    let mut state = self.state.lock().await;
                    state.presence.insert(update.user_id, update.last_online);
                }
                Ok(ChannelEvent::StateChanged(ChannelState::Connected)) => {
                    if let Err(e) = self.resync().await {
                        tracing::warn!(error = %e, "Resync after reconnect failed");
                    }
                }
                Ok(ChannelEvent::StateChanged(_)) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event stream lagged, resyncing");
                    if let Err(e) = self.resync().await {
                        tracing::warn!(error = %e, "Resync after lag failed");
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// Inserts keeping `created_at` ascending; ties go after existing
/// entries, preserving arrival order.
fn insert_ordered(list: &mut Vec<Message>, message: Message) {
    let pos = list.partition_point(|m| m.created_at <= message.created_at);
    list.insert(pos, message);
}
