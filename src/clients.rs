//! Collaborator contracts consumed by the sync core, plus in-memory
//! implementations used by integration tests and embedding demos.
//!
//! The core never talks to a transport directly: the backend send API, the
//! realtime subscription service, the summary fetch, the archival sink, and
//! the mark-as-read API are all seams behind these traits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::models::conversation::ConversationSnapshot;
use crate::models::message::{MessageId, RemoteMessage};

/// Backend acknowledgement of a send: the permanent id and the authoritative
/// creation timestamp that defines the message's position in the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReceipt {
    pub message_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Backend send + summary + read-marker API.
///
/// The caller does not retry; a resubmission of identical content after a
/// failure must be accepted (content equality alone is not a duplicate).
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send_message(&self, conversation_id: Uuid, content: &str) -> CoreResult<SendReceipt>;

    async fn fetch_conversations(&self) -> CoreResult<Vec<ConversationSnapshot>>;

    async fn mark_read(&self, conversation_id: Uuid) -> CoreResult<()>;
}

/// Unique identifier for a realtime feed registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedId(Uuid);

impl FeedId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FeedId {
    fn default() -> Self {
        Self::new()
    }
}

/// A live realtime feed: messages arrive on `receiver` until the owning
/// subscriber unsubscribes.
pub struct RealtimeFeed {
    pub id: FeedId,
    pub receiver: UnboundedReceiver<RemoteMessage>,
}

/// Long-lived push channel delivering messages created by any participant,
/// including other devices of the current user. At-least-once delivery.
#[async_trait]
pub trait RealtimeService: Send + Sync {
    async fn subscribe(&self) -> CoreResult<RealtimeFeed>;

    /// Idempotent: unsubscribing an unknown or already-removed feed is a
    /// no-op.
    async fn unsubscribe(&self, id: FeedId);
}

/// One-shot record emitted when a proposal crosses its approval threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub message_id: MessageId,
    pub conversation_id: Uuid,
    pub approved_at: DateTime<Utc>,
    pub approve_count: u32,
}

/// Fire-and-forget archival sink. Failures are logged by the caller, never
/// retried, never surfaced to the user.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    async fn archive(&self, record: ArchiveRecord) -> CoreResult<()>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

#[derive(Default)]
struct InMemoryBackendState {
    snapshots: Vec<ConversationSnapshot>,
    sent: Vec<(Uuid, String)>,
    read_marks: Vec<Uuid>,
    send_delay: Option<std::time::Duration>,
}

/// Scriptable backend double: records every call, can be told to fail sends
/// or to delay confirmations (for exercising the echo-before-confirmation
/// race).
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<InMemoryBackendState>>,
    fail_sends: Arc<AtomicBool>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub async fn set_send_delay(&self, delay: std::time::Duration) {
        self.state.lock().await.send_delay = Some(delay);
    }

    pub async fn set_snapshots(&self, snapshots: Vec<ConversationSnapshot>) {
        self.state.lock().await.snapshots = snapshots;
    }

    pub async fn sent_messages(&self) -> Vec<(Uuid, String)> {
        self.state.lock().await.sent.clone()
    }

    pub async fn read_marks(&self) -> Vec<Uuid> {
        self.state.lock().await.read_marks.clone()
    }
}

#[async_trait]
impl ChatBackend for InMemoryBackend {
    async fn send_message(&self, conversation_id: Uuid, content: &str) -> CoreResult<SendReceipt> {
        let delay = self.state.lock().await.send_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(CoreError::SendFailed("backend rejected send".into()));
        }

        let mut guard = self.state.lock().await;
        guard.sent.push((conversation_id, content.to_string()));
        Ok(SendReceipt {
            message_id: Uuid::new_v4(),
            created_at: Utc::now(),
        })
    }

    async fn fetch_conversations(&self) -> CoreResult<Vec<ConversationSnapshot>> {
        Ok(self.state.lock().await.snapshots.clone())
    }

    async fn mark_read(&self, conversation_id: Uuid) -> CoreResult<()> {
        self.state.lock().await.read_marks.push(conversation_id);
        Ok(())
    }
}

/// In-memory realtime service: tests push messages with `publish` and every
/// registered feed receives them. Dead feeds are pruned on publish, the same
/// way Nova's connection registry cleans up dead senders on broadcast.
#[derive(Clone, Default)]
pub struct InMemoryRealtimeService {
    feeds: Arc<Mutex<HashMap<FeedId, UnboundedSender<RemoteMessage>>>>,
}

impl InMemoryRealtimeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, message: RemoteMessage) {
        let mut guard = self.feeds.lock().await;
        guard.retain(|_, sender| sender.send(message.clone()).is_ok());
    }

    pub async fn feed_count(&self) -> usize {
        self.feeds.lock().await.len()
    }
}

#[async_trait]
impl RealtimeService for InMemoryRealtimeService {
    async fn subscribe(&self) -> CoreResult<RealtimeFeed> {
        let (tx, rx) = unbounded_channel();
        let id = FeedId::new();
        self.feeds.lock().await.insert(id, tx);
        Ok(RealtimeFeed { id, receiver: rx })
    }

    async fn unsubscribe(&self, id: FeedId) {
        self.feeds.lock().await.remove(&id);
    }
}

/// Archive sink that records every received record; can be told to fail so
/// tests can observe the logged-not-retried policy.
#[derive(Clone, Default)]
pub struct RecordingArchive {
    records: Arc<Mutex<Vec<ArchiveRecord>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn records(&self) -> Vec<ArchiveRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl ArchiveSink for RecordingArchive {
    async fn archive(&self, record: ArchiveRecord) -> CoreResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoreError::BackendUnavailable("archive sink down".into()));
        }
        self.records.lock().await.push(record);
        Ok(())
    }
}
