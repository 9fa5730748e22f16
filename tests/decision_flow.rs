//! Decision Flow Integration Tests
//!
//! Purpose: Verify the proposal vote workflow end-to-end through a wired
//! `ChatClient`: vote replacement, threshold crossing, and the exactly-once
//! archival emit.
//!
//! Run: cargo test --test decision_flow

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use chat_client_core::clients::{InMemoryBackend, InMemoryRealtimeService, RecordingArchive};
use chat_client_core::{
    ChatClient, Config, ConversationSnapshot, DecisionStatus, MessageId, VoteChoice,
};

struct Harness {
    client: ChatClient,
    archive: RecordingArchive,
    conversation_id: Uuid,
}

async fn harness() -> Harness {
    let me = Uuid::new_v4();
    let conversation_id = Uuid::new_v4();

    let backend = InMemoryBackend::new();
    backend
        .set_snapshots(vec![ConversationSnapshot {
            id: conversation_id,
            participant_ids: vec![me],
            pinned: false,
            muted: false,
            archived: false,
            recent_messages: vec![],
        }])
        .await;
    let archive = RecordingArchive::new();

    let (client, _failed_rx) = ChatClient::new(
        Config {
            refresh_interval: Duration::from_secs(3600),
            ..Config::default()
        },
        me,
        Arc::new(backend),
        Arc::new(InMemoryRealtimeService::new()),
        Arc::new(archive.clone()),
    );
    client.start().await.expect("client start");

    Harness {
        client,
        archive,
        conversation_id,
    }
}

/// Send a proposal and wait for its confirmed id.
async fn confirmed_proposal(h: &Harness, threshold: u32) -> MessageId {
    h.client
        .send_proposal(h.conversation_id, "archive this thread?", threshold)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    let listed = h.client.messages(h.conversation_id).await;
    assert_eq!(listed.len(), 1);
    assert!(!listed[0].id.is_provisional());
    listed[0].id
}

#[tokio::test]
async fn approvals_cross_threshold_and_archive_once() {
    let h = harness().await;
    let proposal = confirmed_proposal(&h, 2).await;
    let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    assert_eq!(
        h.client.cast_vote(proposal, a, VoteChoice::Approve).await.unwrap(),
        DecisionStatus::Open
    );
    assert_eq!(
        h.client.cast_vote(proposal, b, VoteChoice::Approve).await.unwrap(),
        DecisionStatus::Approved
    );
    assert_eq!(
        h.client.cast_vote(proposal, c, VoteChoice::Approve).await.unwrap(),
        DecisionStatus::Approved
    );

    // Exactly one archival record, emitted at the a -> b transition.
    let records = h.archive.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message_id, proposal);
    assert_eq!(records[0].conversation_id, h.conversation_id);
}

#[tokio::test]
async fn same_voter_casting_twice_is_idempotent() {
    let h = harness().await;
    let proposal = confirmed_proposal(&h, 2).await;
    let voter = Uuid::new_v4();

    h.client.cast_vote(proposal, voter, VoteChoice::Approve).await.unwrap();
    h.client.cast_vote(proposal, voter, VoteChoice::Approve).await.unwrap();

    let listed = h.client.messages(h.conversation_id).await;
    let decision = listed[0].decision.as_ref().unwrap();
    assert_eq!(decision.votes.len(), 1);
    assert_eq!(decision.status, DecisionStatus::Open);
    assert!(h.archive.records().await.is_empty());
}

#[tokio::test]
async fn a_voter_can_change_their_mind_until_approval() {
    let h = harness().await;
    let proposal = confirmed_proposal(&h, 2).await;
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    // A approves, then flips to reject: only B's approval remains.
    h.client.cast_vote(proposal, a, VoteChoice::Approve).await.unwrap();
    h.client.cast_vote(proposal, a, VoteChoice::Reject).await.unwrap();
    assert_eq!(
        h.client.cast_vote(proposal, b, VoteChoice::Approve).await.unwrap(),
        DecisionStatus::Open
    );

    // A flips back: threshold met.
    assert_eq!(
        h.client.cast_vote(proposal, a, VoteChoice::Approve).await.unwrap(),
        DecisionStatus::Approved
    );
    assert_eq!(h.archive.records().await.len(), 1);
}

#[tokio::test]
async fn reject_votes_alone_never_trigger_archival() {
    let h = harness().await;
    let proposal = confirmed_proposal(&h, 1).await;

    for _ in 0..3 {
        let status = h
            .client
            .cast_vote(proposal, Uuid::new_v4(), VoteChoice::Reject)
            .await
            .unwrap();
        assert_eq!(status, DecisionStatus::Open);
    }
    assert!(h.archive.records().await.is_empty());
}
