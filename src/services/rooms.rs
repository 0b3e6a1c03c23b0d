use crate::api::schemas::ServerEvent;
use dashmap::DashMap;
use opentelemetry::{
    global,
    metrics::{Counter, UpDownCounter},
};
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    published_total: Counter<u64>,
    open_rooms: UpDownCounter<i64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("driftchat");
        Self {
            published_total: meter
                .u64_counter("driftchat_room_events_published_total")
                .with_description("Total events published to user rooms")
                .build(),
            open_rooms: meter
                .i64_up_down_counter("driftchat_open_rooms")
                .with_description("Number of rooms with at least one subscriber")
                .build(),
        }
    }
}

/// Per-user fan-out: every signed-in session subscribes the room keyed by
/// its user id, and broadcasts target rooms rather than sockets. A room
/// with no subscribers drops events silently; delivery to offline users
/// happens through the unread fetch on reconnect, not replay.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: DashMap<Uuid, broadcast::Sender<ServerEvent>>,
    capacity: usize,
    metrics: Metrics,
}

impl RoomRegistry {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { rooms: DashMap::new(), capacity, metrics: Metrics::new() }
    }

    /// Joins the user's room, creating it on first subscription.
    pub fn subscribe(&self, user_id: Uuid) -> broadcast::Receiver<ServerEvent> {
        let entry = self.rooms.entry(user_id).or_insert_with(|| {
            self.metrics.open_rooms.add(1, &[]);
            broadcast::channel(self.capacity).0
        });
        entry.subscribe()
    }

    /// Publishes an event to the user's room. Returns the number of
    /// sessions that received it; zero when the user is offline.
    pub fn publish(&self, user_id: Uuid, event: &ServerEvent) -> usize {
        let delivered = self
            .rooms
            .get(&user_id)
            .map_or(0, |sender| sender.send(event.clone()).unwrap_or(0));
        self.metrics.published_total.add(1, &[]);
        delivered
    }

    /// Drops rooms nobody listens to anymore. Called when a session ends.
    pub fn prune(&self, user_id: Uuid) {
        let removed = self
            .rooms
            .remove_if(&user_id, |_, sender| sender.receiver_count() == 0)
            .is_some();
        if removed {
            self.metrics.open_rooms.add(-1, &[]);
        }
    }
}
