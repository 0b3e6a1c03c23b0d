use crate::api::schemas::{AckBody, LastOnlineUpdate, OutgoingMessage, WireMessage};
use crate::client::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use time::OffsetDateTime;
use tokio::sync::{broadcast, watch};

/// Connectivity of the realtime channel, observable through a `watch`
/// subscription. Dependents treat anything but `Connected` as a
/// precondition failure for sends: fail fast, never queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connected,
    Disconnected,
    Reconnecting,
    Error,
}

/// Events a channel pushes to its subscribers. The channel never replays
/// missed events; resynchronization after `StateChanged(Connected)` is
/// the synchronizer's job via the unread fetch.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Message(WireMessage),
    LastOnlineUpdate(LastOnlineUpdate),
    StateChanged(ChannelState),
}

/// One long-lived connection per signed-in session, joined server-side
/// to the room keyed by the user's id.
#[async_trait]
pub trait RealtimeChannel: Send + Sync + Debug {
    fn state(&self) -> ChannelState;

    fn state_watch(&self) -> watch::Receiver<ChannelState>;

    /// Transmits a send and waits for its acknowledgment frame. The
    /// caller bounds the wait with its own timeout; this future resolves
    /// when the ack arrives or the connection drops.
    async fn send(&self, outgoing: OutgoingMessage) -> Result<AckBody>;

    /// Best-effort presence update, no acknowledgment.
    async fn send_presence(&self, last_online: OffsetDateTime) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent>;
}
