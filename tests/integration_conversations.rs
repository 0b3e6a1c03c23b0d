#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    missing_debug_implementations,
    unreachable_pub,
    clippy::similar_names
)]
mod common;

use common::{TestApp, generate_username};
use driftchat::api::schemas::WireConversation;
use reqwest::StatusCode;
use serde_json::json;
use uuid::Uuid;

async fn fetch_id_response(app: &TestApp, token: &str, participants: &[Uuid]) -> reqwest::Response {
    app.client
        .post(format!("{}/conversation/fetchId", app.server_url))
        .bearer_auth(token)
        .json(&json!({ "participants": participants }))
        .send()
        .await
        .expect("fetchId request failed")
}

#[tokio::test]
async fn fetch_id_creates_once_then_resolves() {
    let app = TestApp::spawn().await;
    let alice = app.seed_user(&generate_username("alice")).await;
    let bob = app.seed_user(&generate_username("bob")).await;

    let first = fetch_id_response(&app, &alice.token, &[alice.id, bob.id]).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let created: WireConversation = first.json().await.expect("body");
    assert_eq!(created.creator, alice.id);

    // Same pair, opposite order, other caller: the same conversation.
    let second = fetch_id_response(&app, &bob.token, &[bob.id, alice.id]).await;
    assert_eq!(second.status(), StatusCode::OK);
    let resolved: WireConversation = second.json().await.expect("body");
    assert_eq!(resolved.id, created.id);
    app.shutdown();
}

#[tokio::test]
async fn concurrent_fetch_id_converges_on_one_conversation() {
    let app = TestApp::spawn().await;
    let alice = app.seed_user(&generate_username("alice")).await;
    let bob = app.seed_user(&generate_username("bob")).await;

    let participants = [alice.id, bob.id];
    let (a, b) = tokio::join!(
        fetch_id_response(&app, &alice.token, &participants),
        fetch_id_response(&app, &bob.token, &participants),
    );

    let statuses = [a.status(), b.status()];
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CREATED).count(), 1, "exactly one request creates");
    assert!(statuses.iter().all(reqwest::StatusCode::is_success));

    let first: WireConversation = a.json().await.expect("body");
    let second: WireConversation = b.json().await.expect("body");
    assert_eq!(first.id, second.id);
    app.shutdown();
}

#[tokio::test]
async fn fetch_id_rejects_callers_outside_the_participant_set() {
    let app = TestApp::spawn().await;
    let alice = app.seed_user(&generate_username("alice")).await;
    let bob = app.seed_user(&generate_username("bob")).await;
    let carol = app.seed_user(&generate_username("carol")).await;

    let excluded = fetch_id_response(&app, &alice.token, &[bob.id, carol.id]).await;
    assert_eq!(excluded.status(), StatusCode::BAD_REQUEST);

    let empty = fetch_id_response(&app, &alice.token, &[]).await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    app.shutdown();
}

#[tokio::test]
async fn fetch_all_lists_only_own_conversations() {
    let app = TestApp::spawn().await;
    let alice = app.seed_user(&generate_username("alice")).await;
    let bob = app.seed_user(&generate_username("bob")).await;
    let carol = app.seed_user(&generate_username("carol")).await;

    let with_bob: WireConversation =
        fetch_id_response(&app, &alice.token, &[alice.id, bob.id]).await.json().await.expect("body");
    fetch_id_response(&app, &bob.token, &[bob.id, carol.id]).await;

    let listed: Vec<WireConversation> = app
        .client
        .get(format!("{}/conversation/fetchAll", app.server_url))
        .bearer_auth(&alice.token)
        .send()
        .await
        .expect("fetchAll request failed")
        .json()
        .await
        .expect("fetchAll body");

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, with_bob.id);
    app.shutdown();
}

#[tokio::test]
async fn added_users_start_with_an_empty_unread_set() {
    let app = TestApp::spawn().await;
    let alice = app.seed_user(&generate_username("alice")).await;
    let bob = app.seed_user(&generate_username("bob")).await;
    let carol = app.seed_user(&generate_username("carol")).await;

    let conversation: WireConversation =
        fetch_id_response(&app, &alice.token, &[alice.id, bob.id]).await.json().await.expect("body");

    // Backlog written before carol existed in the conversation, already
    // read by both original members.
    let messages = driftchat::storage::message_repo::MessageRepository::new(app.pool.clone());
    for text in ["hello", "anyone?"] {
        let mut wire = common::wire_text_message(conversation.id, alice.id, None, text);
        wire.read_by.push(bob.id);
        assert!(messages.create(&wire).await.expect("seed message"));
    }

    let updated: WireConversation = app
        .client
        .post(format!("{}/conversation/addUsers", app.server_url))
        .bearer_auth(&alice.token)
        .json(&json!({ "conversationId": conversation.id, "userIds": [carol.id] }))
        .send()
        .await
        .expect("addUsers request failed")
        .json()
        .await
        .expect("addUsers body");
    assert!(updated.participants.contains(&carol.id));

    // Neither the backlog nor the join announcement counts for carol.
    let unread: Vec<driftchat::api::schemas::WireMessage> = app
        .client
        .get(format!("{}/message/fetchUnread", app.server_url))
        .bearer_auth(&carol.token)
        .send()
        .await
        .expect("fetchUnread request failed")
        .json()
        .await
        .expect("fetchUnread body");
    assert!(unread.is_empty());

    // Existing members see the announcement as a system message.
    let bob_unread: Vec<driftchat::api::schemas::WireMessage> = app
        .client
        .get(format!("{}/message/fetchUnread", app.server_url))
        .bearer_auth(&bob.token)
        .send()
        .await
        .expect("fetchUnread request failed")
        .json()
        .await
        .expect("fetchUnread body");
    assert_eq!(bob_unread.len(), 1);
    assert!(bob_unread[0].is_system_message);
    assert_eq!(bob_unread[0].sender, None);
    assert_eq!(bob_unread[0].text.as_deref(), Some(format!("{} joined the group chat", carol.username).as_str()));
    app.shutdown();
}

#[tokio::test]
async fn add_users_requires_membership() {
    let app = TestApp::spawn().await;
    let alice = app.seed_user(&generate_username("alice")).await;
    let bob = app.seed_user(&generate_username("bob")).await;
    let mallory = app.seed_user(&generate_username("mallory")).await;

    let conversation: WireConversation =
        fetch_id_response(&app, &alice.token, &[alice.id, bob.id]).await.json().await.expect("body");

    let response = app
        .client
        .post(format!("{}/conversation/addUsers", app.server_url))
        .bearer_auth(&mallory.token)
        .json(&json!({ "conversationId": conversation.id, "userIds": [mallory.id] }))
        .send()
        .await
        .expect("addUsers request failed");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    app.shutdown();
}

#[tokio::test]
async fn rename_is_creator_only_and_length_limited() {
    let app = TestApp::spawn().await;
    let alice = app.seed_user(&generate_username("alice")).await;
    let bob = app.seed_user(&generate_username("bob")).await;

    let conversation: WireConversation =
        fetch_id_response(&app, &alice.token, &[alice.id, bob.id]).await.json().await.expect("body");

    let rename = |token: String, conversation_id: Uuid, name: &str| {
        let client = app.client.clone();
        let url = format!("{}/conversation/changeGroupChatName", app.server_url);
        let body = json!({ "conversationId": conversation_id, "newName": name });
        async move { client.post(url).bearer_auth(token).json(&body).send().await.expect("rename request failed") }
    };

    let ok = rename(alice.token.clone(), conversation.id, "book club").await;
    assert_eq!(ok.status(), StatusCode::OK);
    let renamed: WireConversation = ok.json().await.expect("body");
    assert_eq!(renamed.chat_name.as_deref(), Some("book club"));

    let too_long = rename(alice.token.clone(), conversation.id, "fifteen chars!!").await;
    assert_eq!(too_long.status(), StatusCode::BAD_REQUEST);

    let empty = rename(alice.token.clone(), conversation.id, "").await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let not_creator = rename(bob.token.clone(), conversation.id, "bob's chat").await;
    assert_eq!(not_creator.status(), StatusCode::UNAUTHORIZED);

    let missing = rename(alice.token, Uuid::new_v4(), "ghost").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    app.shutdown();
}
