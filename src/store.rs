//! # Message Store
//!
//! In-memory authoritative message log, one list per conversation. Every
//! component mutates conversation state exclusively through the operations
//! here; the interior `RwLock` serializes those mutations so concurrently
//! arriving inputs (optimistic sends, backend confirmations, realtime push,
//! refresh backfill) never interleave at the instruction level.
//!
//! Ordering is defined on read: `list` sorts by `(created_at, id)`. No caller
//! may rely on insertion order.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::models::message::{Message, MessageId, Reaction};

/// Result of `upsert_from_remote`. `Ignored` is the expected outcome for
/// at-least-once redelivery from the realtime channel or the refresh poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Ignored,
}

/// Result of `replace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// Provisional entry swapped for the confirmed record.
    Replaced,
    /// The provisional was already superseded (remote echo won the race).
    /// Benign; the stale replace becomes a no-op.
    ProvisionalGone,
    /// The confirmed id was already present; the provisional was dropped
    /// instead of producing a duplicate.
    AlreadyConfirmed,
}

#[derive(Debug, Clone, Default)]
pub struct ConversationMeta {
    pub participant_ids: Vec<Uuid>,
    pub pinned: bool,
    pub muted: bool,
    pub archived: bool,
}

struct ConversationEntry {
    meta: ConversationMeta,
    messages: Vec<Message>,
}

#[derive(Default)]
struct StoreInner {
    conversations: HashMap<Uuid, ConversationEntry>,
    /// Secondary index so operations addressed by message id alone
    /// (`mutate`, reactions, votes) need no conversation handle.
    locations: HashMap<MessageId, Uuid>,
}

#[derive(Clone, Default)]
pub struct MessageStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a conversation (or refresh its metadata). Messages for
    /// unregistered conversations are rejected with `StaleConversation`.
    pub async fn register_conversation(&self, id: Uuid, meta: ConversationMeta) {
        let mut guard = self.inner.write().await;
        match guard.conversations.get_mut(&id) {
            Some(entry) => entry.meta = meta,
            None => {
                guard.conversations.insert(
                    id,
                    ConversationEntry {
                        meta,
                        messages: Vec::new(),
                    },
                );
            }
        }
    }

    /// Drop a conversation and its messages. Any in-flight reconciliation
    /// targeting it will be dropped with a warning downstream.
    pub async fn remove_conversation(&self, id: Uuid) {
        let mut guard = self.inner.write().await;
        if let Some(entry) = guard.conversations.remove(&id) {
            for message in &entry.messages {
                guard.locations.remove(&message.id);
            }
        }
    }

    pub async fn contains_conversation(&self, id: Uuid) -> bool {
        self.inner.read().await.conversations.contains_key(&id)
    }

    pub async fn conversation_ids(&self) -> Vec<Uuid> {
        self.inner.read().await.conversations.keys().copied().collect()
    }

    pub async fn conversation_meta(&self, id: Uuid) -> Option<ConversationMeta> {
        self.inner
            .read()
            .await
            .conversations
            .get(&id)
            .map(|e| e.meta.clone())
    }

    /// Append a new message. Used for provisional inserts; remote records go
    /// through `upsert_from_remote` instead.
    pub async fn append(&self, message: Message) -> CoreResult<()> {
        let mut guard = self.inner.write().await;
        let conversation_id = message.conversation_id;
        let entry = guard
            .conversations
            .get_mut(&conversation_id)
            .ok_or(CoreError::StaleConversation(conversation_id))?;

        let id = message.id;
        entry.messages.push(message);
        guard.locations.insert(id, conversation_id);
        Ok(())
    }

    /// Swap a provisional entry for its confirmed record.
    ///
    /// Fails silently (logged, not an error) when the provisional is no
    /// longer present: the expected outcome when the remote echo of the same
    /// logical send arrived first and already superseded it.
    pub async fn replace(&self, temp_id: MessageId, confirmed: Message) -> ReplaceOutcome {
        debug_assert!(temp_id.is_provisional());
        let mut guard = self.inner.write().await;

        let Some(conversation_id) = guard.locations.get(&temp_id).copied() else {
            tracing::debug!(temp_id = %temp_id, "replace: provisional already superseded");
            return ReplaceOutcome::ProvisionalGone;
        };

        // Remote echo upserted before our confirmation returned: drop the
        // provisional rather than duplicating the permanent id.
        if guard.locations.contains_key(&confirmed.id) {
            guard.locations.remove(&temp_id);
            if let Some(entry) = guard.conversations.get_mut(&conversation_id) {
                entry.messages.retain(|m| m.id != temp_id);
            }
            tracing::debug!(
                temp_id = %temp_id,
                confirmed_id = %confirmed.id,
                "replace: confirmed id already present, dropped provisional"
            );
            return ReplaceOutcome::AlreadyConfirmed;
        }

        let Some(entry) = guard.conversations.get_mut(&conversation_id) else {
            guard.locations.remove(&temp_id);
            return ReplaceOutcome::ProvisionalGone;
        };

        let confirmed_id = confirmed.id;
        if let Some(slot) = entry.messages.iter_mut().find(|m| m.id == temp_id) {
            *slot = confirmed;
            guard.locations.remove(&temp_id);
            guard.locations.insert(confirmed_id, conversation_id);
            ReplaceOutcome::Replaced
        } else {
            guard.locations.remove(&temp_id);
            ReplaceOutcome::ProvisionalGone
        }
    }

    /// Insert-or-ignore by permanent id. Idempotent against at-least-once
    /// delivery from the realtime channel and the refresh overlap.
    pub async fn upsert_from_remote(&self, message: Message) -> CoreResult<UpsertOutcome> {
        debug_assert!(!message.id.is_provisional());
        let mut guard = self.inner.write().await;

        if guard.locations.contains_key(&message.id) {
            return Ok(UpsertOutcome::Ignored);
        }

        let conversation_id = message.conversation_id;
        let entry = guard
            .conversations
            .get_mut(&conversation_id)
            .ok_or(CoreError::StaleConversation(conversation_id))?;

        let id = message.id;
        entry.messages.push(message);
        guard.locations.insert(id, conversation_id);
        Ok(UpsertOutcome::Inserted)
    }

    /// Remove a provisional entry (send-failure path). Returns whether the
    /// entry was still present.
    pub async fn remove(&self, temp_id: MessageId) -> bool {
        let mut guard = self.inner.write().await;
        let Some(conversation_id) = guard.locations.remove(&temp_id) else {
            return false;
        };
        if let Some(entry) = guard.conversations.get_mut(&conversation_id) {
            entry.messages.retain(|m| m.id != temp_id);
        }
        true
    }

    /// Apply `f` to the message with the given id. Returns the closure's
    /// result, or `None` when the message is unknown (e.g. its conversation
    /// was removed concurrently).
    pub async fn mutate<R>(
        &self,
        id: MessageId,
        f: impl FnOnce(&mut Message) -> R,
    ) -> Option<R> {
        let mut guard = self.inner.write().await;
        let conversation_id = guard.locations.get(&id).copied()?;
        let entry = guard.conversations.get_mut(&conversation_id)?;
        let message = entry.messages.iter_mut().find(|m| m.id == id)?;
        Some(f(message))
    }

    /// All messages of a conversation in authoritative order: ascending
    /// `created_at`, id as the stable tie-break.
    pub async fn list(&self, conversation_id: Uuid) -> Vec<Message> {
        let guard = self.inner.read().await;
        let mut messages = guard
            .conversations
            .get(&conversation_id)
            .map(|e| e.messages.clone())
            .unwrap_or_default();
        messages.sort_by_key(|m| m.sort_key());
        messages
    }

    /// `list` with soft-deleted entries filtered out (read-model view).
    pub async fn list_visible(&self, conversation_id: Uuid) -> Vec<Message> {
        let mut messages = self.list(conversation_id).await;
        messages.retain(|m| !m.is_deleted);
        messages
    }

    pub async fn get(&self, id: MessageId) -> Option<Message> {
        let guard = self.inner.read().await;
        let conversation_id = guard.locations.get(&id)?;
        guard
            .conversations
            .get(conversation_id)?
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    /// Edit message text in place, stamping `edited_at`.
    pub async fn edit(&self, id: MessageId, content: String) -> CoreResult<()> {
        self.mutate(id, |message| {
            message.content = content;
            message.edited_at = Some(Utc::now());
        })
        .await
        .ok_or(CoreError::MessageNotFound)
    }

    /// Soft delete: the entry stays in the log with `is_deleted` set and is
    /// filtered by read models. True purge belongs to the persistent store.
    pub async fn soft_delete(&self, id: MessageId) -> CoreResult<()> {
        self.mutate(id, |message| {
            message.is_deleted = true;
        })
        .await
        .ok_or(CoreError::MessageNotFound)
    }

    /// Add a reaction; one entry per (user, emoji) pair.
    pub async fn add_reaction(&self, id: MessageId, user_id: Uuid, emoji: String) -> CoreResult<()> {
        self.mutate(id, |message| {
            if !message
                .reactions
                .iter()
                .any(|r| r.user_id == user_id && r.emoji == emoji)
            {
                message.reactions.push(Reaction {
                    user_id,
                    emoji,
                    reacted_at: Utc::now(),
                });
            }
        })
        .await
        .ok_or(CoreError::MessageNotFound)
    }

    pub async fn remove_reaction(
        &self,
        id: MessageId,
        user_id: Uuid,
        emoji: &str,
    ) -> CoreResult<()> {
        self.mutate(id, |message| {
            message
                .reactions
                .retain(|r| !(r.user_id == user_id && r.emoji == emoji));
        })
        .await
        .ok_or(CoreError::MessageNotFound)
    }
}
