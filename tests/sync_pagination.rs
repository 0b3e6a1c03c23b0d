#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    missing_debug_implementations,
    clippy::clone_on_ref_ptr,
    clippy::cast_possible_truncation,
    unreachable_pub,
    clippy::similar_names
)]
mod common;

use common::{FakeApi, FakeChannel};
use driftchat::client::{ChannelState, MessageStore, Session, Synchronizer};
use driftchat::domain::{DeliveryStatus, Message, MessageBody};
use std::collections::HashSet;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

async fn sync_over(store: MessageStore, user_id: Uuid) -> Synchronizer {
    common::setup_tracing();
    let session =
        Session::new(user_id, "token".to_string(), "http://unused".to_string(), "ws://unused".to_string());
    Synchronizer::new(
        session,
        store,
        Arc::new(FakeChannel::new(ChannelState::Connected)),
        Arc::new(FakeApi::new()),
    )
}

fn stored_message(conversation_id: Uuid, sender: Uuid, index: i64) -> Message {
    Message {
        id: Uuid::new_v4(),
        temp_id: None,
        conversation_id,
        sender: Some(sender),
        body: MessageBody::Text(format!("message {index}")),
        read_by: vec![sender],
        created_at: OffsetDateTime::now_utc() - Duration::minutes(100 - index),
        status: DeliveryStatus::Sent,
        is_system: false,
        local_attachment: None,
    }
}

#[tokio::test]
async fn pages_terminate_after_ceil_n_over_b_without_overlap() {
    let me = Uuid::new_v4();
    let other = Uuid::new_v4();
    let conversation = Uuid::new_v4();
    let store = MessageStore::open("sqlite::memory:").await.unwrap();

    for i in 0..7 {
        store.upsert(&stored_message(conversation, other, i)).await.unwrap();
    }
    let sync = sync_over(store, me).await;

    // 7 messages, batches of 3: 3 + 3 + 1, then exhausted.
    assert_eq!(sync.load_page(conversation, 3).await.unwrap(), 3);
    assert_eq!(sync.load_page(conversation, 3).await.unwrap(), 3);
    assert_eq!(sync.load_page(conversation, 3).await.unwrap(), 1);
    assert_eq!(sync.load_page(conversation, 3).await.unwrap(), 0, "exhausted cursor must be a no-op");
    assert_eq!(sync.load_page(conversation, 3).await.unwrap(), 0);

    let messages = sync.messages(conversation).await;
    assert_eq!(messages.len(), 7);
    let distinct: HashSet<Uuid> = messages.iter().map(|m| m.id).collect();
    assert_eq!(distinct.len(), 7, "no message may appear in two pages");
}

#[tokio::test]
async fn loaded_pages_are_chronological() {
    let me = Uuid::new_v4();
    let other = Uuid::new_v4();
    let conversation = Uuid::new_v4();
    let store = MessageStore::open("sqlite::memory:").await.unwrap();

    for i in 0..5 {
        store.upsert(&stored_message(conversation, other, i)).await.unwrap();
    }
    let sync = sync_over(store, me).await;

    sync.load_page(conversation, 2).await.unwrap();
    let newest_two = sync.messages(conversation).await;
    assert_eq!(
        newest_two.iter().map(|m| m.body.text().unwrap()).collect::<Vec<_>>(),
        vec!["message 3", "message 4"],
        "first page is the newest batch, in display order"
    );

    sync.load_page(conversation, 2).await.unwrap();
    let four = sync.messages(conversation).await;
    assert_eq!(
        four.iter().map(|m| m.body.text().unwrap()).collect::<Vec<_>>(),
        vec!["message 1", "message 2", "message 3", "message 4"]
    );

    let latest = sync.last_message(conversation).await.unwrap();
    assert_eq!(latest.body.text(), Some("message 4"));
}

#[tokio::test]
async fn exact_multiple_exhausts_on_the_empty_page() {
    let me = Uuid::new_v4();
    let other = Uuid::new_v4();
    let conversation = Uuid::new_v4();
    let store = MessageStore::open("sqlite::memory:").await.unwrap();

    for i in 0..6 {
        store.upsert(&stored_message(conversation, other, i)).await.unwrap();
    }
    let sync = sync_over(store, me).await;

    assert_eq!(sync.load_page(conversation, 3).await.unwrap(), 3);
    assert_eq!(sync.load_page(conversation, 3).await.unwrap(), 3);
    // A full final batch cannot prove exhaustion; the next read does.
    assert_eq!(sync.load_page(conversation, 3).await.unwrap(), 0);
    assert_eq!(sync.load_page(conversation, 3).await.unwrap(), 0);
    assert_eq!(sync.messages(conversation).await.len(), 6);
}

#[tokio::test]
async fn clear_history_resets_cursor_and_cache() {
    let me = Uuid::new_v4();
    let other = Uuid::new_v4();
    let conversation = Uuid::new_v4();
    let store = MessageStore::open("sqlite::memory:").await.unwrap();

    for i in 0..4 {
        store.upsert(&stored_message(conversation, other, i)).await.unwrap();
    }
    let sync = sync_over(store.clone(), me).await;

    while sync.load_page(conversation, 2).await.unwrap() > 0 {}
    assert_eq!(sync.messages(conversation).await.len(), 4);

    sync.clear_history(conversation).await.unwrap();
    assert!(sync.messages(conversation).await.is_empty());
    assert!(store.page(conversation, 10, 0).await.unwrap().is_empty());

    // Cursor restarted; new history pages again from the top.
    store.upsert(&stored_message(conversation, other, 50)).await.unwrap();
    assert_eq!(sync.load_page(conversation, 2).await.unwrap(), 1);
}
