use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::decision::DecisionData;

/// Message identifier.
///
/// A provisional id is minted locally by the send coordinator before the
/// backend has seen the message; a confirmed id is the backend-assigned
/// permanent identity. Keeping the two as a tagged union makes reconciliation
/// matching a pattern match instead of a string-prefix convention, and the
/// derived total order (provisional before confirmed, then by value) is the
/// deterministic tie-break for messages sharing a `created_at`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MessageId {
    Provisional(u64),
    Confirmed(Uuid),
}

impl MessageId {
    pub fn is_provisional(&self) -> bool {
        matches!(self, MessageId::Provisional(_))
    }

    pub fn as_confirmed(&self) -> Option<Uuid> {
        match self {
            MessageId::Confirmed(id) => Some(*id),
            MessageId::Provisional(_) => None,
        }
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageId::Provisional(seq) => write!(f, "local-{seq}"),
            MessageId::Confirmed(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentType {
    Text,
    /// Voice message; the content field carries the playback URL.
    Audio { duration_ms: u32, codec: String },
    /// Backend-generated housekeeping line (membership changes etc.).
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Provisional: inserted locally, backend round-trip in flight.
    Sending,
    /// Confirmed by the backend or received from another participant.
    Sent,
    /// Backend rejected the send. Failed provisionals are removed from the
    /// store rather than kept in this state; the variant exists for wire
    /// payloads from backends that report it.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub user_id: Uuid,
    pub emoji: String,
    pub reacted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub content_type: ContentType,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<DecisionData>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<MessageId>,
    pub delivery_status: DeliveryStatus,
}

impl Message {
    /// Sort key used everywhere a conversation is read: ascending
    /// `created_at` with the id as a stable tie-break.
    pub fn sort_key(&self) -> (DateTime<Utc>, MessageId) {
        (self.created_at, self.id)
    }
}

/// Wire form of a message as delivered by the realtime channel or the
/// summary refresh. Always carries a permanent id; conversion to `Message`
/// happens at the ingestion boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    #[serde(default = "default_content_type")]
    pub content_type: ContentType,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<DecisionData>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<Uuid>,
}

fn default_content_type() -> ContentType {
    ContentType::Text
}

impl From<RemoteMessage> for Message {
    fn from(remote: RemoteMessage) -> Self {
        Message {
            id: MessageId::Confirmed(remote.id),
            conversation_id: remote.conversation_id,
            sender_id: remote.sender_id,
            content: remote.content,
            content_type: remote.content_type,
            created_at: remote.created_at,
            edited_at: remote.edited_at,
            is_deleted: remote.is_deleted,
            decision: remote.decision,
            reactions: remote.reactions,
            reply_to_id: remote.reply_to_id.map(MessageId::Confirmed),
            delivery_status: DeliveryStatus::Sent,
        }
    }
}
