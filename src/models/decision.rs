use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Open,
    Approved,
    /// Accepted from the wire for forward compatibility; local evaluation
    /// never produces it. Reject votes only withhold approval.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub voter_id: Uuid,
    pub choice: VoteChoice,
    pub cast_at: DateTime<Utc>,
}

/// Vote-based approval workflow attached to a proposal message.
///
/// `votes` holds at most one entry per voter; a re-cast replaces the prior
/// entry (last writer wins). `status` is derived from the votes, except that
/// `Approved` is sticky: the open -> approved transition is one-way so the
/// archival side effect fires exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionData {
    pub status: DecisionStatus,
    pub votes: Vec<Vote>,
    pub threshold: u32,
}

impl DecisionData {
    pub fn new(threshold: u32) -> Self {
        Self {
            status: DecisionStatus::Open,
            votes: Vec::new(),
            threshold,
        }
    }

    pub fn approve_count(&self) -> u32 {
        self.votes
            .iter()
            .filter(|v| v.choice == VoteChoice::Approve)
            .count() as u32
    }

    /// Pure evaluation of the vote tally. Does not mutate `status`.
    pub fn evaluate(&self) -> DecisionStatus {
        if self.approve_count() >= self.threshold {
            DecisionStatus::Approved
        } else {
            DecisionStatus::Open
        }
    }

    /// Record (or replace) a vote and update `status`.
    ///
    /// Returns `true` only on the open -> approved transition, which is the
    /// caller's cue to emit the one-shot archival record. Votes cast after
    /// approval are still recorded but never re-trigger the transition.
    pub fn cast(&mut self, voter_id: Uuid, choice: VoteChoice, cast_at: DateTime<Utc>) -> bool {
        self.votes.retain(|v| v.voter_id != voter_id);
        self.votes.push(Vote {
            voter_id,
            choice,
            cast_at,
        });

        if self.status == DecisionStatus::Open && self.evaluate() == DecisionStatus::Approved {
            self.status = DecisionStatus::Approved;
            return true;
        }
        false
    }
}
