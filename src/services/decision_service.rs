//! # Decision Engine
//!
//! Vote workflow for proposal messages. Operates on individual messages
//! through `MessageStore::mutate` and stays off the network reconciliation
//! path entirely. The open -> approved transition emits one archival record;
//! the emit is one-shot per message no matter how many votes follow.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::clients::{ArchiveRecord, ArchiveSink};
use crate::error::{CoreError, CoreResult};
use crate::models::decision::{DecisionStatus, VoteChoice};
use crate::models::message::MessageId;
use crate::store::MessageStore;

#[derive(Clone)]
pub struct DecisionService {
    store: MessageStore,
    archive: Arc<dyn ArchiveSink>,
}

impl DecisionService {
    pub fn new(store: MessageStore, archive: Arc<dyn ArchiveSink>) -> Self {
        Self { store, archive }
    }

    /// Record a vote, replacing any prior vote by the same voter, and return
    /// the resulting status.
    ///
    /// Archival is fire-and-forget: a sink failure is logged and the vote
    /// still stands. The approval itself is local state; the record is a
    /// downstream courtesy.
    pub async fn cast_vote(
        &self,
        message_id: MessageId,
        voter_id: Uuid,
        choice: VoteChoice,
    ) -> CoreResult<DecisionStatus> {
        let outcome = self
            .store
            .mutate(message_id, |message| {
                let Some(decision) = message.decision.as_mut() else {
                    return Err(CoreError::NotAProposal);
                };
                let crossed = decision.cast(voter_id, choice, Utc::now());
                Ok((
                    crossed,
                    decision.status,
                    decision.approve_count(),
                    message.conversation_id,
                ))
            })
            .await
            .ok_or(CoreError::MessageNotFound)?;

        let (crossed, status, approve_count, conversation_id) = outcome?;

        if crossed {
            tracing::info!(
                message_id = %message_id,
                conversation_id = %conversation_id,
                approve_count,
                "proposal approved; emitting archival record"
            );
            let record = ArchiveRecord {
                message_id,
                conversation_id,
                approved_at: Utc::now(),
                approve_count,
            };
            if let Err(e) = self.archive.archive(record).await {
                tracing::warn!(
                    message_id = %message_id,
                    error = %e,
                    "archival collaborator failed; not retried"
                );
            }
        }

        Ok(status)
    }

    pub async fn status(&self, message_id: MessageId) -> CoreResult<DecisionStatus> {
        let message = self
            .store
            .get(message_id)
            .await
            .ok_or(CoreError::MessageNotFound)?;
        message
            .decision
            .map(|d| d.status)
            .ok_or(CoreError::NotAProposal)
    }
}
