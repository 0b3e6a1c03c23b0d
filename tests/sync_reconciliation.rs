#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    missing_debug_implementations,
    clippy::clone_on_ref_ptr,
    clippy::items_after_statements,
    unreachable_pub,
    clippy::similar_names
)]
mod common;

use common::{AckScript, FakeApi, FakeChannel, wire_text_message};
use driftchat::client::{ChannelState, MessageStore, Session, Synchronizer};
use driftchat::domain::{DeliveryStatus, MessageBody};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

async fn connected_sync(user_id: Uuid) -> (Synchronizer, Arc<FakeChannel>, Arc<FakeApi>, MessageStore) {
    common::setup_tracing();
    let channel = Arc::new(FakeChannel::new(ChannelState::Connected));
    let api = Arc::new(FakeApi::new());
    let store = MessageStore::open("sqlite::memory:").await.unwrap();
    let mut session =
        Session::new(user_id, "token".to_string(), "http://unused".to_string(), "ws://unused".to_string());
    session.ack_timeout = Duration::from_millis(200);
    let sync = Synchronizer::new(session, store.clone(), channel.clone(), api.clone());
    (sync, channel, api, store)
}

#[tokio::test]
async fn echo_after_ack_yields_exactly_one_record() {
    let me = Uuid::new_v4();
    let conversation = Uuid::new_v4();
    let (sync, channel, _, _) = connected_sync(me).await;

    let temp_id = sync.compose_and_send(conversation, MessageBody::Text("hi".to_string()), None).await.unwrap();
    assert_eq!(channel.sent.lock().unwrap().len(), 1);

    let mut echo = wire_text_message(conversation, me, Some(temp_id), "hi");
    echo.read_by = vec![me];
    let server_id = echo.id;
    sync.receive_broadcast(echo).await.unwrap();

    let messages = sync.messages(conversation).await;
    assert_eq!(messages.len(), 1, "echo must upgrade the provisional record, not duplicate it");
    assert_eq!(messages[0].id, server_id);
    assert_eq!(messages[0].status, DeliveryStatus::Sent);
}

#[tokio::test]
async fn echo_rekeys_the_store_row() {
    let me = Uuid::new_v4();
    let conversation = Uuid::new_v4();
    let (sync, _, _, store) = connected_sync(me).await;

    let temp_id = sync.compose_and_send(conversation, MessageBody::Text("hi".to_string()), None).await.unwrap();
    let echo = wire_text_message(conversation, me, Some(temp_id), "hi");
    let server_id = echo.id;
    sync.receive_broadcast(echo).await.unwrap();

    assert!(store.get(server_id).await.unwrap().is_some());
    assert!(store.get(temp_id).await.unwrap().is_none(), "provisional row must be re-keyed, not kept");
}

#[tokio::test]
async fn local_attachment_survives_reconciliation() {
    let me = Uuid::new_v4();
    let conversation = Uuid::new_v4();
    let (sync, _, _, _) = connected_sync(me).await;

    let temp_id = sync
        .compose_and_send(
            conversation,
            MessageBody::Image { url: "pending-upload".to_string() },
            Some("file:///tmp/picked.jpg".to_string()),
        )
        .await
        .unwrap();

    let mut echo = wire_text_message(conversation, me, Some(temp_id), "ignored");
    echo.text = None;
    echo.image = Some("https://cdn.example/abc.jpg".to_string());
    let server_id = echo.id;
    sync.receive_broadcast(echo).await.unwrap();

    let messages = sync.messages(conversation).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, server_id);
    assert_eq!(messages[0].local_attachment.as_deref(), Some("file:///tmp/picked.jpg"));
    assert_eq!(messages[0].body, driftchat::domain::MessageBody::Image { url: "https://cdn.example/abc.jpg".into() });
}

#[tokio::test]
async fn redelivery_of_same_id_is_idempotent() {
    let me = Uuid::new_v4();
    let other = Uuid::new_v4();
    let conversation = Uuid::new_v4();
    let (sync, _, _, _) = connected_sync(me).await;

    let broadcast = wire_text_message(conversation, other, Some(Uuid::new_v4()), "hello");
    sync.receive_broadcast(broadcast.clone()).await.unwrap();
    let once = sync.messages(conversation).await;

    sync.receive_broadcast(broadcast.clone()).await.unwrap();
    sync.receive_broadcast(broadcast).await.unwrap();
    let thrice = sync.messages(conversation).await;

    assert_eq!(once, thrice);
    assert_eq!(thrice.len(), 1);
}

#[tokio::test]
async fn display_order_is_chronological_regardless_of_arrival() {
    let me = Uuid::new_v4();
    let other = Uuid::new_v4();
    let conversation = Uuid::new_v4();
    let (sync, _, _, _) = connected_sync(me).await;

    let mut first = wire_text_message(conversation, other, None, "first");
    let mut second = wire_text_message(conversation, other, None, "second");
    let mut third = wire_text_message(conversation, other, None, "third");
    let base = time::OffsetDateTime::now_utc();
    first.created_at = base - time::Duration::seconds(30);
    second.created_at = base - time::Duration::seconds(20);
    third.created_at = base - time::Duration::seconds(10);

    sync.receive_broadcast(third).await.unwrap();
    sync.receive_broadcast(first).await.unwrap();
    sync.receive_broadcast(second).await.unwrap();

    let texts: Vec<_> = sync
        .messages(conversation)
        .await
        .into_iter()
        .map(|m| m.body.text().unwrap().to_string())
        .collect();
    assert_eq!(texts, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn failed_offline_send_then_online_resend_settles_to_one_sent_record() {
    let me = Uuid::new_v4();
    let conversation = Uuid::new_v4();
    let (sync, channel, _, _) = connected_sync(me).await;
    channel.set_state(ChannelState::Disconnected);

    let err = sync.compose_and_send(conversation, MessageBody::Text("hi".to_string()), None).await;
    assert!(err.is_err());

    let failed = sync.messages(conversation).await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].status, DeliveryStatus::Failed);
    let first_temp = failed[0].id;

    channel.set_state(ChannelState::Connected);
    channel.script_ack(AckScript::Success);
    let second_temp = sync.resend(conversation, first_temp).await.unwrap();
    assert_ne!(second_temp, first_temp, "a resend is a fresh attempt with a fresh temp id");

    let echo = wire_text_message(conversation, me, Some(second_temp), "hi");
    let server_id = echo.id;
    sync.receive_broadcast(echo).await.unwrap();

    let messages = sync.messages(conversation).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, server_id);
    assert_eq!(messages[0].status, DeliveryStatus::Sent);
    assert_eq!(messages[0].body.text(), Some("hi"));
}
