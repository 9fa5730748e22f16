//! # chat-client-core
//!
//! Client-side conversation synchronization. Three uncoordinated input
//! streams feed one per-conversation message log: the local user's
//! optimistic sends, backend confirmations of those sends, and a realtime
//! push channel carrying everyone else's messages (including other devices
//! of the same user). All three pass through a single reconciliation funnel
//! that owns de-duplication and ordering; a derived conversation index and a
//! proposal vote engine sit on top.
//!
//! This crate is an in-process library consumed by a presentation layer. It
//! owns no transport: the backend, the realtime service, the archival sink,
//! and the read-marker API are trait seams in [`clients`].

pub mod clients;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod realtime;
pub mod services;
pub mod state;
pub mod store;

pub use clients::{ArchiveRecord, ArchiveSink, ChatBackend, RealtimeService, SendReceipt};
pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use models::{
    ContentType, ConversationSnapshot, ConversationSummary, DecisionData, DecisionStatus,
    DeliveryStatus, Message, MessageId, Reaction, RemoteMessage, Vote, VoteChoice,
};
pub use services::{FailedSend, ReconcileEngine, RemoteOutcome};
pub use state::ChatClient;
pub use store::{MessageStore, ReplaceOutcome, UpsertOutcome};
