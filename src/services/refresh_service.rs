//! # Refresh Scheduler
//!
//! Low-frequency poll of the conversation summary fetch. This is the
//! reconciling safety net behind the realtime channel, not the primary
//! delivery path: everything it pulls is merged through the same funnel, so
//! overlap with push delivery is harmless. It keeps running regardless of
//! subscription health, and it can be woken early after a successful send or
//! receive as a consistency backstop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::clients::ChatBackend;
use crate::services::reconciliation::ReconcileEngine;

/// Wake-up handle for the scheduler loop. Cheap to clone and callable from
/// synchronous contexts.
#[derive(Clone, Default)]
pub struct RefreshHandle {
    notify: Arc<Notify>,
}

impl RefreshHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an immediate refresh on top of the periodic cadence.
    pub fn request_now(&self) {
        self.notify.notify_one();
    }

    async fn wait(&self) {
        self.notify.notified().await;
    }
}

pub struct RefreshScheduler {
    engine: Arc<ReconcileEngine>,
    backend: Arc<dyn ChatBackend>,
    interval: Duration,
    handle: RefreshHandle,
}

impl RefreshScheduler {
    pub fn new(
        engine: Arc<ReconcileEngine>,
        backend: Arc<dyn ChatBackend>,
        interval: Duration,
        handle: RefreshHandle,
    ) -> Self {
        Self {
            engine,
            backend,
            interval,
            handle,
        }
    }

    pub fn handle(&self) -> RefreshHandle {
        self.handle.clone()
    }

    /// One fetch-and-merge pass. Fetch failures degrade to a stale view and
    /// are retried on the next tick, never escalated.
    pub async fn refresh_once(&self) {
        match self.backend.fetch_conversations().await {
            Ok(snapshots) => {
                let count = snapshots.len();
                for snapshot in snapshots {
                    self.engine.absorb_snapshot(snapshot).await;
                }
                tracing::debug!(conversations = count, "summary refresh merged");
            }
            Err(e) => {
                tracing::warn!(error = %e, "summary refresh failed; view may be briefly stale");
            }
        }
    }

    /// Spawn the poll loop. Aborted on shutdown.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {}
                    _ = self.handle.wait() => {}
                }
                self.refresh_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::InMemoryBackend;
    use crate::models::conversation::ConversationSnapshot;
    use crate::models::message::{ContentType, RemoteMessage};
    use crate::services::index_service::RecomputeQueue;
    use crate::store::MessageStore;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn refresh_backfills_missed_messages_idempotently() {
        let store = MessageStore::new();
        let engine = ReconcileEngine::new(
            store.clone(),
            RecomputeQueue::new(),
            Uuid::new_v4(),
            Duration::from_secs(10),
        );
        let backend = InMemoryBackend::new();
        let conversation_id = Uuid::new_v4();
        let missed = RemoteMessage {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: Uuid::new_v4(),
            content: "missed while offline".into(),
            content_type: ContentType::Text,
            created_at: Utc::now(),
            edited_at: None,
            is_deleted: false,
            decision: None,
            reactions: vec![],
            reply_to_id: None,
        };
        backend
            .set_snapshots(vec![ConversationSnapshot {
                id: conversation_id,
                participant_ids: vec![missed.sender_id],
                pinned: false,
                muted: false,
                archived: false,
                recent_messages: vec![missed],
            }])
            .await;

        let scheduler = RefreshScheduler::new(
            engine,
            Arc::new(backend),
            Duration::from_secs(60),
            RefreshHandle::new(),
        );

        scheduler.refresh_once().await;
        scheduler.refresh_once().await;

        assert_eq!(store.list(conversation_id).await.len(), 1);
    }
}
