//! Session wiring: one `ChatClient` per signed-in session owns the store,
//! the reconciliation engine, and the background workers, and exposes the
//! operations the presentation layer consumes.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::clients::{ArchiveSink, ChatBackend, RealtimeService};
use crate::config::Config;
use crate::error::CoreResult;
use crate::models::conversation::ConversationSummary;
use crate::models::decision::{DecisionStatus, VoteChoice};
use crate::models::message::{Message, MessageId};
use crate::realtime::RealtimeSubscriber;
use crate::services::decision_service::DecisionService;
use crate::services::index_service::ConversationIndex;
use crate::services::reconciliation::ReconcileEngine;
use crate::services::refresh_service::{RefreshHandle, RefreshScheduler};
use crate::services::send_coordinator::{FailedSend, SendCoordinator};
use crate::store::MessageStore;

pub struct ChatClient {
    config: Config,
    current_user: Uuid,
    store: MessageStore,
    engine: Arc<ReconcileEngine>,
    index: ConversationIndex,
    coordinator: SendCoordinator,
    decisions: DecisionService,
    realtime: RealtimeSubscriber,
    refresh: Arc<RefreshScheduler>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ChatClient {
    /// Wire up a session. Returns the client and the draft-restore receiver
    /// carrying failed sends back to the composition surface.
    pub fn new(
        config: Config,
        current_user: Uuid,
        backend: Arc<dyn ChatBackend>,
        realtime_service: Arc<dyn RealtimeService>,
        archive: Arc<dyn ArchiveSink>,
    ) -> (Self, UnboundedReceiver<FailedSend>) {
        let store = MessageStore::new();
        let index = ConversationIndex::new(store.clone(), backend.clone(), current_user);
        let queue = index.queue();
        let engine = ReconcileEngine::new(
            store.clone(),
            queue.clone(),
            current_user,
            config.echo_match_window,
        );

        let refresh_handle = RefreshHandle::new();
        let refresh = Arc::new(RefreshScheduler::new(
            engine.clone(),
            backend.clone(),
            config.refresh_interval,
            refresh_handle.clone(),
        ));

        let (coordinator, failed_rx) = SendCoordinator::new(
            engine.clone(),
            backend.clone(),
            queue,
            refresh_handle.clone(),
            current_user,
            config.clone(),
        );

        let decisions = DecisionService::new(store.clone(), archive);
        let realtime = RealtimeSubscriber::new(engine.clone(), realtime_service, refresh_handle);

        (
            Self {
                config,
                current_user,
                store,
                engine,
                index,
                coordinator,
                decisions,
                realtime,
                refresh,
                workers: Mutex::new(Vec::new()),
            },
            failed_rx,
        )
    }

    /// Start the session: index worker, initial summary sync, realtime
    /// subscription, and the periodic refresh loop.
    pub async fn start(&self) -> CoreResult<()> {
        {
            let mut workers = self.workers.lock().await;
            if !workers.is_empty() {
                tracing::debug!("session already started");
                return Ok(());
            }
            workers.push(self.index.start(self.config.index_debounce));
            workers.push(self.refresh.clone().start());
        }

        self.refresh.refresh_once().await;
        self.realtime.start().await?;
        Ok(())
    }

    /// Tear the session down. Idempotent; nothing is processed afterwards.
    pub async fn shutdown(&self) {
        self.realtime.stop().await;
        let mut workers = self.workers.lock().await;
        for worker in workers.drain(..) {
            worker.abort();
        }
    }

    pub fn current_user(&self) -> Uuid {
        self.current_user
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn engine(&self) -> &Arc<ReconcileEngine> {
        &self.engine
    }

    pub fn index(&self) -> &ConversationIndex {
        &self.index
    }

    pub fn decisions(&self) -> &DecisionService {
        &self.decisions
    }

    pub fn realtime(&self) -> &RealtimeSubscriber {
        &self.realtime
    }

    // --- message operations -------------------------------------------------

    pub async fn send(&self, conversation_id: Uuid, content: &str) -> CoreResult<Message> {
        self.coordinator.send(conversation_id, content).await
    }

    pub async fn send_audio(
        &self,
        conversation_id: Uuid,
        url: &str,
        duration_ms: u32,
        codec: &str,
    ) -> CoreResult<Message> {
        self.coordinator
            .send_audio(conversation_id, url, duration_ms, codec)
            .await
    }

    pub async fn send_proposal(
        &self,
        conversation_id: Uuid,
        content: &str,
        threshold: u32,
    ) -> CoreResult<Message> {
        self.coordinator
            .send_proposal(conversation_id, content, threshold)
            .await
    }

    pub async fn cast_vote(
        &self,
        message_id: MessageId,
        voter_id: Uuid,
        choice: VoteChoice,
    ) -> CoreResult<DecisionStatus> {
        self.decisions.cast_vote(message_id, voter_id, choice).await
    }

    /// Conversation timeline in authoritative order, soft-deleted entries
    /// filtered.
    pub async fn messages(&self, conversation_id: Uuid) -> Vec<Message> {
        self.store.list_visible(conversation_id).await
    }

    pub async fn summaries(&self) -> Vec<ConversationSummary> {
        self.index.summaries().await
    }

    /// Make a conversation the active view, marking it read.
    pub async fn open_conversation(&self, conversation_id: Uuid) {
        self.index.set_active(Some(conversation_id)).await;
    }

    pub async fn close_conversation(&self) {
        self.index.set_active(None).await;
    }

    /// Drop a conversation locally; any in-flight reconciliation against it
    /// is discarded downstream with a warning.
    pub async fn remove_conversation(&self, conversation_id: Uuid) {
        self.engine.remove_conversation(conversation_id).await;
    }
}
