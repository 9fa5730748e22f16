use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::message::RemoteMessage;

/// Derived per-conversation summary. Never mutated independently: always
/// recomputed from the message log plus the last-read marker, so there is no
/// second source of truth to drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub participant_ids: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: u32,
    pub pinned: bool,
    pub muted: bool,
    pub archived: bool,
}

impl ConversationSummary {
    pub fn empty(id: Uuid, participant_ids: Vec<Uuid>) -> Self {
        Self {
            id,
            participant_ids,
            last_message_preview: None,
            last_message_at: None,
            unread_count: 0,
            pinned: false,
            muted: false,
            archived: false,
        }
    }
}

/// Wire form returned by the conversation summary fetch. Besides metadata it
/// carries the most recent messages so the periodic refresh can backfill
/// anything the realtime channel dropped; those messages are merged through
/// the same reconciliation funnel as pushed ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub id: Uuid,
    pub participant_ids: Vec<Uuid>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub recent_messages: Vec<RemoteMessage>,
}
