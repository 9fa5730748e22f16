//! # Send Coordinator
//!
//! Optimistic writes: a locally composed message is inserted into the store
//! under a provisional id before any network round-trip, so the sender's own
//! view updates immediately. The backend call runs on a spawned task and its
//! completion is folded back through the reconciliation engine.
//!
//! Concurrent sends are independent: each gets its own provisional sequence
//! number and its own completion, and confirmations may land out of send
//! order. On failure the provisional is removed and the composed content is
//! handed back on the draft-restore channel; retry is by resubmission, never
//! automatic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::clients::ChatBackend;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::models::decision::DecisionData;
use crate::models::message::{ContentType, DeliveryStatus, Message, MessageId};
use crate::services::index_service::RecomputeQueue;
use crate::services::reconciliation::ReconcileEngine;
use crate::services::refresh_service::RefreshHandle;

/// Returned to the composition surface when a send fails, carrying the
/// original content so nothing the user typed is lost.
#[derive(Debug, Clone)]
pub struct FailedSend {
    pub conversation_id: Uuid,
    pub content: String,
    pub content_type: ContentType,
    pub reason: CoreError,
}

#[derive(Clone)]
pub struct SendCoordinator {
    engine: Arc<ReconcileEngine>,
    backend: Arc<dyn ChatBackend>,
    queue: RecomputeQueue,
    refresh: RefreshHandle,
    current_user: Uuid,
    config: Config,
    next_seq: Arc<AtomicU64>,
    failed_tx: UnboundedSender<FailedSend>,
}

impl SendCoordinator {
    /// Returns the coordinator and the draft-restore receiver the
    /// presentation layer listens on.
    pub fn new(
        engine: Arc<ReconcileEngine>,
        backend: Arc<dyn ChatBackend>,
        queue: RecomputeQueue,
        refresh: RefreshHandle,
        current_user: Uuid,
        config: Config,
    ) -> (Self, UnboundedReceiver<FailedSend>) {
        let (failed_tx, failed_rx) = unbounded_channel();
        (
            Self {
                engine,
                backend,
                queue,
                refresh,
                current_user,
                config,
                next_seq: Arc::new(AtomicU64::new(1)),
                failed_tx,
            },
            failed_rx,
        )
    }

    /// Send a text message. The returned provisional message is already in
    /// the store when this returns; the backend round-trip continues in the
    /// background.
    pub async fn send(&self, conversation_id: Uuid, content: &str) -> CoreResult<Message> {
        self.send_with_type(conversation_id, content.to_string(), ContentType::Text, None)
            .await
    }

    /// Send a voice message; `content` carries the playback URL and the
    /// audio metadata rides on the content type.
    pub async fn send_audio(
        &self,
        conversation_id: Uuid,
        url: &str,
        duration_ms: u32,
        codec: &str,
    ) -> CoreResult<Message> {
        self.send_with_type(
            conversation_id,
            url.to_string(),
            ContentType::Audio {
                duration_ms,
                codec: codec.to_string(),
            },
            None,
        )
        .await
    }

    /// Send a proposal: a message carrying a vote workflow that participants
    /// approve until `threshold` is met.
    pub async fn send_proposal(
        &self,
        conversation_id: Uuid,
        content: &str,
        threshold: u32,
    ) -> CoreResult<Message> {
        self.send_with_type(
            conversation_id,
            content.to_string(),
            ContentType::Text,
            Some(DecisionData::new(threshold)),
        )
        .await
    }

    async fn send_with_type(
        &self,
        conversation_id: Uuid,
        content: String,
        content_type: ContentType,
        decision: Option<DecisionData>,
    ) -> CoreResult<Message> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidContent("message content cannot be empty".into()));
        }
        if content.len() > self.config.max_content_len {
            return Err(CoreError::InvalidContent(format!(
                "content exceeds {} bytes",
                self.config.max_content_len
            )));
        }

        let temp_id = MessageId::Provisional(self.next_seq.fetch_add(1, Ordering::Relaxed));
        let provisional = Message {
            id: temp_id,
            conversation_id,
            sender_id: self.current_user,
            content,
            content_type,
            created_at: Utc::now(),
            edited_at: None,
            is_deleted: false,
            decision,
            reactions: vec![],
            reply_to_id: None,
            delivery_status: DeliveryStatus::Sending,
        };

        // Provisional insert happens before the network task exists, so the
        // caller sees its message in `list` as soon as `send` returns.
        self.engine.store().append(provisional.clone()).await?;
        self.queue.schedule(conversation_id);

        let coordinator = self.clone();
        let outbound = provisional.clone();
        tokio::spawn(async move {
            coordinator.complete_send(outbound).await;
        });

        Ok(provisional)
    }

    async fn complete_send(&self, provisional: Message) {
        let conversation_id = provisional.conversation_id;
        match self
            .backend
            .send_message(conversation_id, &provisional.content)
            .await
        {
            Ok(receipt) => {
                self.engine
                    .apply_confirmation(conversation_id, provisional.id, receipt)
                    .await;
                // Consistency backstop: pull summaries after a successful
                // round-trip in case realtime dropped something meanwhile.
                self.refresh.request_now();
            }
            Err(reason) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    temp_id = %provisional.id,
                    error = %reason,
                    "send failed; provisional removed, draft restored"
                );
                self.engine.store().remove(provisional.id).await;
                self.queue.schedule(conversation_id);
                let _ = self.failed_tx.send(FailedSend {
                    conversation_id,
                    content: provisional.content,
                    content_type: provisional.content_type,
                    reason,
                });
            }
        }
    }
}
