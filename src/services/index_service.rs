//! # Conversation Index
//!
//! Read model over the message log. Summaries are never mutated in place:
//! every change to a conversation's messages schedules a recompute, and the
//! recompute derives preview, recency, and unread count from the store plus
//! the last-read marker. Bursts of updates (a provisional insert immediately
//! followed by its confirmation) coalesce into a single recompute per
//! conversation per debounce tick.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::clients::ChatBackend;
use crate::models::conversation::ConversationSummary;
use crate::store::MessageStore;

/// Debounce queue feeding the recompute worker. `schedule` is synchronous and
/// cheap so the reconciliation path can call it without awaiting.
#[derive(Clone, Default)]
pub struct RecomputeQueue {
    pending: Arc<StdMutex<HashSet<Uuid>>>,
    notify: Arc<Notify>,
}

impl RecomputeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, conversation_id: Uuid) {
        self.pending
            .lock()
            .expect("recompute queue lock poisoned")
            .insert(conversation_id);
        self.notify.notify_one();
    }

    fn drain(&self) -> Vec<Uuid> {
        let mut guard = self.pending.lock().expect("recompute queue lock poisoned");
        guard.drain().collect()
    }

    async fn wait(&self) {
        self.notify.notified().await;
    }
}

#[derive(Clone)]
pub struct ConversationIndex {
    store: MessageStore,
    backend: Arc<dyn ChatBackend>,
    current_user: Uuid,
    summaries: Arc<RwLock<HashMap<Uuid, ConversationSummary>>>,
    read_markers: Arc<RwLock<HashMap<Uuid, DateTime<Utc>>>>,
    active_conversation: Arc<RwLock<Option<Uuid>>>,
    queue: RecomputeQueue,
}

impl ConversationIndex {
    pub fn new(store: MessageStore, backend: Arc<dyn ChatBackend>, current_user: Uuid) -> Self {
        Self {
            store,
            backend,
            current_user,
            summaries: Arc::new(RwLock::new(HashMap::new())),
            read_markers: Arc::new(RwLock::new(HashMap::new())),
            active_conversation: Arc::new(RwLock::new(None)),
            queue: RecomputeQueue::new(),
        }
    }

    pub fn queue(&self) -> RecomputeQueue {
        self.queue.clone()
    }

    /// Spawn the debounced recompute worker. The returned handle is aborted
    /// on shutdown.
    pub fn start(&self, debounce: Duration) -> JoinHandle<()> {
        let index = self.clone();
        tokio::spawn(async move {
            loop {
                index.queue.wait().await;
                // Let the burst settle so rapid successive mutations of the
                // same conversation cost one recompute.
                tokio::time::sleep(debounce).await;
                for conversation_id in index.queue.drain() {
                    index.recompute(conversation_id).await;
                }
            }
        })
    }

    /// Derive a conversation's summary from the store. Removes the summary
    /// when the conversation is gone.
    pub async fn recompute(&self, conversation_id: Uuid) {
        let Some(meta) = self.store.conversation_meta(conversation_id).await else {
            self.summaries.write().await.remove(&conversation_id);
            tracing::debug!(conversation_id = %conversation_id, "recompute: conversation gone, summary dropped");
            return;
        };

        let messages = self.store.list_visible(conversation_id).await;
        let marker = self
            .read_markers
            .read()
            .await
            .get(&conversation_id)
            .copied();

        let last = messages.last();
        let unread_count = messages
            .iter()
            .filter(|m| m.sender_id != self.current_user)
            .filter(|m| marker.map_or(true, |read_at| m.created_at > read_at))
            .count() as u32;

        let summary = ConversationSummary {
            id: conversation_id,
            participant_ids: meta.participant_ids,
            last_message_preview: last.map(|m| m.content.clone()),
            last_message_at: last.map(|m| m.created_at),
            unread_count,
            pinned: meta.pinned,
            muted: meta.muted,
            archived: meta.archived,
        };

        self.summaries
            .write()
            .await
            .insert(conversation_id, summary);
    }

    /// Advance the last-read marker to now, zero the unread count, and notify
    /// the mark-as-read collaborator. Collaborator failures are logged, not
    /// surfaced: the local marker is authoritative for this session's view.
    pub async fn mark_read(&self, conversation_id: Uuid) {
        self.read_markers
            .write()
            .await
            .insert(conversation_id, Utc::now());
        self.recompute(conversation_id).await;

        if let Err(e) = self.backend.mark_read(conversation_id).await {
            tracing::warn!(
                conversation_id = %conversation_id,
                error = %e,
                "mark-as-read collaborator failed"
            );
        }
    }

    /// Make a conversation the active view (marking it read), or clear the
    /// active view with `None`. Messages arriving for a non-active
    /// conversation flip it back to unread via the normal recompute path.
    pub async fn set_active(&self, conversation_id: Option<Uuid>) {
        *self.active_conversation.write().await = conversation_id;
        if let Some(id) = conversation_id {
            self.mark_read(id).await;
        }
    }

    pub async fn active_conversation(&self) -> Option<Uuid> {
        *self.active_conversation.read().await
    }

    pub async fn summary(&self, conversation_id: Uuid) -> Option<ConversationSummary> {
        self.summaries.read().await.get(&conversation_id).cloned()
    }

    /// All summaries in presentation order: pinned first, then most recent
    /// activity.
    pub async fn summaries(&self) -> Vec<ConversationSummary> {
        let mut all: Vec<_> = self.summaries.read().await.values().cloned().collect();
        all.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then(b.last_message_at.cmp(&a.last_message_at))
        });
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::InMemoryBackend;
    use crate::models::message::{ContentType, DeliveryStatus, Message, MessageId};
    use crate::store::ConversationMeta;
    use chrono::Duration as ChronoDuration;

    fn remote(conversation_id: Uuid, sender_id: Uuid, content: &str, offset_ms: i64) -> Message {
        Message {
            id: MessageId::Confirmed(Uuid::new_v4()),
            conversation_id,
            sender_id,
            content: content.into(),
            content_type: ContentType::Text,
            created_at: Utc::now() + ChronoDuration::milliseconds(offset_ms),
            edited_at: None,
            is_deleted: false,
            decision: None,
            reactions: vec![],
            reply_to_id: None,
            delivery_status: DeliveryStatus::Sent,
        }
    }

    async fn fixture() -> (ConversationIndex, MessageStore, Uuid, Uuid) {
        let store = MessageStore::new();
        let me = Uuid::new_v4();
        let conversation_id = Uuid::new_v4();
        store
            .register_conversation(conversation_id, ConversationMeta::default())
            .await;
        let index =
            ConversationIndex::new(store.clone(), Arc::new(InMemoryBackend::new()), me);
        (index, store, conversation_id, me)
    }

    #[tokio::test]
    async fn preview_tracks_last_visible_message() {
        let (index, store, conversation_id, _) = fixture().await;
        let other = Uuid::new_v4();

        store
            .upsert_from_remote(remote(conversation_id, other, "first", 0))
            .await
            .unwrap();
        let last = remote(conversation_id, other, "second", 100);
        store.upsert_from_remote(last.clone()).await.unwrap();
        index.recompute(conversation_id).await;

        let summary = index.summary(conversation_id).await.unwrap();
        assert_eq!(summary.last_message_preview.as_deref(), Some("second"));
        assert_eq!(summary.unread_count, 2);

        // Deleting the newest message moves the preview back.
        store.soft_delete(last.id).await.unwrap();
        index.recompute(conversation_id).await;
        let summary = index.summary(conversation_id).await.unwrap();
        assert_eq!(summary.last_message_preview.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn own_messages_do_not_count_as_unread() {
        let (index, store, conversation_id, me) = fixture().await;

        store
            .upsert_from_remote(remote(conversation_id, me, "mine", 0))
            .await
            .unwrap();
        index.recompute(conversation_id).await;

        assert_eq!(index.summary(conversation_id).await.unwrap().unread_count, 0);
    }

    #[tokio::test]
    async fn mark_read_zeroes_then_new_arrival_sets_one() {
        let (index, store, conversation_id, _) = fixture().await;
        let other = Uuid::new_v4();

        for i in 0..5 {
            store
                .upsert_from_remote(remote(conversation_id, other, "msg", -1000 + i))
                .await
                .unwrap();
        }
        index.recompute(conversation_id).await;
        assert_eq!(index.summary(conversation_id).await.unwrap().unread_count, 5);

        index.mark_read(conversation_id).await;
        assert_eq!(index.summary(conversation_id).await.unwrap().unread_count, 0);

        store
            .upsert_from_remote(remote(conversation_id, other, "new", 60_000))
            .await
            .unwrap();
        index.recompute(conversation_id).await;
        assert_eq!(index.summary(conversation_id).await.unwrap().unread_count, 1);
    }

    #[tokio::test]
    async fn recompute_for_removed_conversation_drops_summary() {
        let (index, store, conversation_id, _) = fixture().await;
        index.recompute(conversation_id).await;
        assert!(index.summary(conversation_id).await.is_some());

        store.remove_conversation(conversation_id).await;
        index.recompute(conversation_id).await;
        assert!(index.summary(conversation_id).await.is_none());
    }

    #[tokio::test]
    async fn debounced_worker_coalesces_bursts() {
        let (index, store, conversation_id, _) = fixture().await;
        let worker = index.start(Duration::from_millis(10));
        let other = Uuid::new_v4();

        for i in 0..10 {
            store
                .upsert_from_remote(remote(conversation_id, other, "burst", i))
                .await
                .unwrap();
            index.queue().schedule(conversation_id);
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        let summary = index.summary(conversation_id).await.unwrap();
        assert_eq!(summary.unread_count, 10);

        worker.abort();
    }
}
