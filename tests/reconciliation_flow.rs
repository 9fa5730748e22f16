//! Reconciliation Flow Integration Tests
//!
//! Purpose: Verify the end-to-end merge behavior of the three input streams
//! (optimistic sends, backend confirmations, realtime push) through a fully
//! wired `ChatClient` with in-memory collaborators.
//!
//! Test Coverage:
//! 1. Optimistic visibility: a send is listed before confirmation returns
//! 2. The echo race: a realtime echo supersedes the provisional, the late
//!    confirmation is a benign no-op, and no duplicate survives
//! 3. Order determinism regardless of arrival order
//! 4. Send failure removes the provisional and restores the draft
//! 5. Unread counting and mark-as-read
//! 6. Stale-conversation drops and idempotent teardown
//!
//! Run: cargo test --test reconciliation_flow

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use chat_client_core::clients::{InMemoryBackend, InMemoryRealtimeService, RecordingArchive};
use chat_client_core::{
    ChatClient, Config, ContentType, ConversationSnapshot, DeliveryStatus, RemoteMessage,
};

fn test_config() -> Config {
    Config {
        echo_match_window: Duration::from_secs(10),
        index_debounce: Duration::from_millis(5),
        refresh_interval: Duration::from_secs(3600), // ticks disabled; tests drive refresh
        max_content_len: 8 * 1024,
    }
}

fn remote_message(conversation_id: Uuid, sender_id: Uuid, content: &str) -> RemoteMessage {
    RemoteMessage {
        id: Uuid::new_v4(),
        conversation_id,
        sender_id,
        content: content.into(),
        content_type: ContentType::Text,
        created_at: Utc::now(),
        edited_at: None,
        is_deleted: false,
        decision: None,
        reactions: vec![],
        reply_to_id: None,
    }
}

struct Harness {
    client: ChatClient,
    backend: InMemoryBackend,
    realtime: InMemoryRealtimeService,
    failed_rx: tokio::sync::mpsc::UnboundedReceiver<chat_client_core::FailedSend>,
    me: Uuid,
    peer: Uuid,
    conversation_id: Uuid,
}

/// Spin up a started client with one registered conversation between the
/// current user and one peer.
async fn harness() -> Harness {
    let me = Uuid::new_v4();
    let peer = Uuid::new_v4();
    let conversation_id = Uuid::new_v4();

    let backend = InMemoryBackend::new();
    backend
        .set_snapshots(vec![ConversationSnapshot {
            id: conversation_id,
            participant_ids: vec![me, peer],
            pinned: false,
            muted: false,
            archived: false,
            recent_messages: vec![],
        }])
        .await;
    let realtime = InMemoryRealtimeService::new();

    let (client, failed_rx) = ChatClient::new(
        test_config(),
        me,
        Arc::new(backend.clone()),
        Arc::new(realtime.clone()),
        Arc::new(RecordingArchive::new()),
    );
    client.start().await.expect("client start");

    Harness {
        client,
        backend,
        realtime,
        failed_rx,
        me,
        peer,
        conversation_id,
    }
}

/// Let spawned completions and the debounced index worker settle.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(80)).await;
}

#[tokio::test]
async fn send_is_visible_immediately_and_confirmed_later() {
    let h = harness().await;

    // Setup: keep the confirmation in flight while we observe the
    // provisional state.
    h.backend.set_send_delay(Duration::from_millis(50)).await;

    // Action: optimistic send.
    let provisional = h.client.send(h.conversation_id, "hello there").await.unwrap();

    // Assert: listed at once, still provisional.
    let listed = h.client.messages(h.conversation_id).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, provisional.id);
    assert_eq!(listed[0].delivery_status, DeliveryStatus::Sending);

    // Assert: after the round-trip the permanent record replaced it.
    settle().await;
    let listed = h.client.messages(h.conversation_id).await;
    assert_eq!(listed.len(), 1);
    assert!(!listed[0].id.is_provisional());
    assert_eq!(listed[0].content, "hello there");
}

#[tokio::test]
async fn realtime_echo_wins_race_against_slow_confirmation() {
    let h = harness().await;

    // Setup: confirmation takes 300ms, the push echo lands at ~50ms.
    h.backend.set_send_delay(Duration::from_millis(300)).await;

    h.client.send(h.conversation_id, "Hi").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Action: the backend's push channel delivers the same logical send.
    let echo = remote_message(h.conversation_id, h.me, "Hi");
    let echo_id = echo.id;
    h.realtime.publish(echo).await;

    // Assert: echo replaced the provisional before the confirmation returned.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let listed = h.client.messages(h.conversation_id).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id.as_confirmed(), Some(echo_id));

    // Assert: the late confirmation is a benign no-op, not a duplicate.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let listed = h.client.messages(h.conversation_id).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id.as_confirmed(), Some(echo_id));
}

#[tokio::test]
async fn listing_is_ordered_by_creation_time_not_arrival() {
    let h = harness().await;

    // Action: deliver three messages out of chronological order.
    let mut first = remote_message(h.conversation_id, h.peer, "first");
    first.created_at = Utc::now() - chrono::Duration::seconds(30);
    let mut second = remote_message(h.conversation_id, h.peer, "second");
    second.created_at = Utc::now() - chrono::Duration::seconds(20);
    let mut third = remote_message(h.conversation_id, h.peer, "third");
    third.created_at = Utc::now() - chrono::Duration::seconds(10);

    h.realtime.publish(third.clone()).await;
    h.realtime.publish(first.clone()).await;
    h.realtime.publish(second.clone()).await;
    settle().await;

    let contents: Vec<String> = h
        .client
        .messages(h.conversation_id)
        .await
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn at_least_once_delivery_never_duplicates() {
    let h = harness().await;

    // Action: the same record arrives via push twice and via refresh once.
    let push = remote_message(h.conversation_id, h.peer, "once only");
    h.realtime.publish(push.clone()).await;
    h.realtime.publish(push.clone()).await;
    h.backend
        .set_snapshots(vec![ConversationSnapshot {
            id: h.conversation_id,
            participant_ids: vec![h.me, h.peer],
            pinned: false,
            muted: false,
            archived: false,
            recent_messages: vec![push],
        }])
        .await;
    settle().await;

    assert_eq!(h.client.messages(h.conversation_id).await.len(), 1);
}

#[tokio::test]
async fn failed_send_restores_draft_and_leaves_no_trace() {
    let mut h = harness().await;
    h.backend.set_fail_sends(true);

    h.client
        .send(h.conversation_id, "words worth keeping")
        .await
        .unwrap();

    let failed = h.failed_rx.recv().await.expect("draft restore");
    assert_eq!(failed.conversation_id, h.conversation_id);
    assert_eq!(failed.content, "words worth keeping");

    assert!(h.client.messages(h.conversation_id).await.is_empty());

    // Resubmitting the identical content afterwards succeeds.
    h.backend.set_fail_sends(false);
    h.client
        .send(h.conversation_id, "words worth keeping")
        .await
        .unwrap();
    settle().await;
    assert_eq!(h.client.messages(h.conversation_id).await.len(), 1);
}

#[tokio::test]
async fn unread_counts_follow_mark_read_and_new_arrivals() {
    let h = harness().await;

    // Setup: five unread messages from the peer.
    for i in 0..5 {
        let mut msg = remote_message(h.conversation_id, h.peer, "ping");
        msg.created_at = Utc::now() - chrono::Duration::seconds(60 - i);
        h.realtime.publish(msg).await;
    }
    settle().await;
    assert_eq!(
        h.client.index().summary(h.conversation_id).await.unwrap().unread_count,
        5
    );

    // Action: open the conversation (marks it read).
    h.client.open_conversation(h.conversation_id).await;
    assert_eq!(
        h.client.index().summary(h.conversation_id).await.unwrap().unread_count,
        0
    );
    assert_eq!(h.backend.read_marks().await, vec![h.conversation_id]);

    // Action: a later message from the peer while the view moved elsewhere.
    h.client.close_conversation().await;
    let mut late = remote_message(h.conversation_id, h.peer, "you there?");
    late.created_at = Utc::now() + chrono::Duration::seconds(1);
    h.realtime.publish(late).await;
    settle().await;

    assert_eq!(
        h.client.index().summary(h.conversation_id).await.unwrap().unread_count,
        1
    );
}

#[tokio::test]
async fn own_sends_never_inflate_unread() {
    let h = harness().await;

    h.client.send(h.conversation_id, "talking to myself").await.unwrap();
    settle().await;

    let summary = h.client.index().summary(h.conversation_id).await.unwrap();
    assert_eq!(summary.unread_count, 0);
    assert_eq!(
        summary.last_message_preview.as_deref(),
        Some("talking to myself")
    );
}

#[tokio::test]
async fn messages_for_removed_conversations_are_dropped() {
    let h = harness().await;

    h.client.remove_conversation(h.conversation_id).await;
    h.realtime
        .publish(remote_message(h.conversation_id, h.peer, "into the void"))
        .await;
    settle().await;

    assert!(h.client.messages(h.conversation_id).await.is_empty());
    assert!(h.client.index().summary(h.conversation_id).await.is_none());
}

#[tokio::test]
async fn shutdown_stops_processing_and_is_idempotent() {
    let h = harness().await;

    h.client.shutdown().await;
    h.client.shutdown().await; // second teardown must be safe

    h.realtime
        .publish(remote_message(h.conversation_id, h.peer, "after teardown"))
        .await;
    settle().await;

    assert!(h.client.messages(h.conversation_id).await.is_empty());
    assert!(!h.client.realtime().is_active().await);
}
