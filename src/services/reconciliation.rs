//! # Reconciliation Engine
//!
//! The single funnel all three input streams pass through before the message
//! log changes: optimistic confirmations (`apply_confirmation`), realtime
//! push (`apply_remote`), and refresh backfill (`absorb_snapshot`). No other
//! component mutates conversation membership of the store, which is what
//! keeps the de-duplication and ordering guarantees in one place.
//!
//! Merge discipline: insert-or-ignore by permanent id, replace-or-ignore by
//! temporary id. After any effective mutation the conversation's summary
//! recompute is scheduled (debounced), never performed inline.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::clients::SendReceipt;
use crate::error::CoreError;
use crate::models::conversation::ConversationSnapshot;
use crate::models::message::{DeliveryStatus, Message, MessageId, RemoteMessage};
use crate::services::index_service::RecomputeQueue;
use crate::store::{ConversationMeta, MessageStore, ReplaceOutcome, UpsertOutcome};

/// What `apply_remote` did with an incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// The record was recognized as the echo of a local provisional send;
    /// the provisional was dropped in its favor.
    ReplacedProvisional,
    /// New record, inserted.
    Inserted,
    /// Permanent id already present (at-least-once redelivery). No-op.
    Duplicate,
    /// Conversation unknown locally; dropped with a warning.
    DroppedStale,
}

pub struct ReconcileEngine {
    store: MessageStore,
    queue: RecomputeQueue,
    current_user: Uuid,
    echo_match_window: Duration,
}

impl ReconcileEngine {
    pub fn new(
        store: MessageStore,
        queue: RecomputeQueue,
        current_user: Uuid,
        echo_match_window: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            queue,
            current_user,
            echo_match_window,
        })
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Fold a backend confirmation into the log: the provisional entry is
    /// swapped for the confirmed record carrying the permanent id and the
    /// backend's authoritative timestamp.
    ///
    /// Both benign races are absorbed here: the provisional may already have
    /// been superseded by its remote echo (stale replace, no-op), and the
    /// conversation may have been removed concurrently (dropped, warned).
    pub async fn apply_confirmation(
        &self,
        conversation_id: Uuid,
        temp_id: MessageId,
        receipt: SendReceipt,
    ) -> ReplaceOutcome {
        if !self.store.contains_conversation(conversation_id).await {
            tracing::warn!(
                conversation_id = %conversation_id,
                temp_id = %temp_id,
                "confirmation for unknown conversation dropped"
            );
            return ReplaceOutcome::ProvisionalGone;
        }

        let Some(provisional) = self.store.get(temp_id).await else {
            tracing::debug!(temp_id = %temp_id, "confirmation raced remote echo; nothing to replace");
            return ReplaceOutcome::ProvisionalGone;
        };

        let confirmed = Message {
            id: MessageId::Confirmed(receipt.message_id),
            created_at: receipt.created_at,
            delivery_status: DeliveryStatus::Sent,
            ..provisional
        };

        let outcome = self.store.replace(temp_id, confirmed).await;
        self.queue.schedule(conversation_id);
        outcome
    }

    /// Merge a record delivered by the realtime channel or refresh backfill.
    pub async fn apply_remote(&self, remote: RemoteMessage) -> RemoteOutcome {
        let conversation_id = remote.conversation_id;
        if !self.store.contains_conversation(conversation_id).await {
            tracing::warn!(
                conversation_id = %conversation_id,
                message_id = %remote.id,
                "remote message for unknown conversation dropped"
            );
            return RemoteOutcome::DroppedStale;
        }

        // Step 1: is this the echo of one of our own in-flight sends? If a
        // provisional from the same sender with matching normalized content
        // sits within the recent window, the remote record is authoritative
        // and the provisional is dropped.
        if let Some(temp_id) = self.find_provisional_echo(&remote).await {
            let outcome = self.store.replace(temp_id, remote.clone().into()).await;
            self.queue.schedule(conversation_id);
            match outcome {
                ReplaceOutcome::Replaced | ReplaceOutcome::AlreadyConfirmed => {
                    tracing::debug!(
                        temp_id = %temp_id,
                        message_id = %remote.id,
                        "remote echo superseded provisional"
                    );
                    return RemoteOutcome::ReplacedProvisional;
                }
                // Candidate vanished between lookup and replace; fall through
                // to the idempotent upsert.
                ReplaceOutcome::ProvisionalGone => {}
            }
        }

        // Step 2: insert-or-ignore by permanent id.
        match self.store.upsert_from_remote(remote.into()).await {
            Ok(UpsertOutcome::Inserted) => {
                self.queue.schedule(conversation_id);
                RemoteOutcome::Inserted
            }
            Ok(UpsertOutcome::Ignored) => RemoteOutcome::Duplicate,
            Err(CoreError::StaleConversation(id)) => {
                tracing::warn!(conversation_id = %id, "conversation removed mid-merge; record dropped");
                RemoteOutcome::DroppedStale
            }
            Err(e) => {
                tracing::warn!(error = %e, "remote merge failed; record dropped");
                RemoteOutcome::DroppedStale
            }
        }
    }

    /// Fold a refresh snapshot in: conversation metadata is registered and
    /// every carried message goes through `apply_remote`, so the poll path
    /// cannot introduce duplicates the push path would have rejected.
    pub async fn absorb_snapshot(&self, snapshot: ConversationSnapshot) {
        self.store
            .register_conversation(
                snapshot.id,
                ConversationMeta {
                    participant_ids: snapshot.participant_ids,
                    pinned: snapshot.pinned,
                    muted: snapshot.muted,
                    archived: snapshot.archived,
                },
            )
            .await;
        self.queue.schedule(snapshot.id);

        for message in snapshot.recent_messages {
            self.apply_remote(message).await;
        }
    }

    /// Drop a conversation locally; pending reconciliation against it will
    /// be discarded with warnings rather than errors.
    pub async fn remove_conversation(&self, conversation_id: Uuid) {
        self.store.remove_conversation(conversation_id).await;
        self.queue.schedule(conversation_id);
    }

    async fn find_provisional_echo(&self, remote: &RemoteMessage) -> Option<MessageId> {
        if remote.sender_id != self.current_user {
            return None;
        }

        let window = chrono::Duration::from_std(self.echo_match_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(10));
        let normalized = normalize_content(&remote.content);

        self.store
            .list(remote.conversation_id)
            .await
            .into_iter()
            .find(|m| {
                m.id.is_provisional()
                    && m.sender_id == remote.sender_id
                    && (remote.created_at - m.created_at).abs() <= window
                    && normalize_content(&m.content) == normalized
            })
            .map(|m| m.id)
    }
}

/// Whitespace-insensitive content comparison for echo matching. The backend
/// may trim or re-wrap content; byte equality would miss those echoes.
fn normalize_content(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}
