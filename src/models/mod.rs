pub mod conversation;
pub mod decision;
pub mod message;

pub use conversation::{ConversationSnapshot, ConversationSummary};
pub use decision::{DecisionData, DecisionStatus, Vote, VoteChoice};
pub use message::{ContentType, DeliveryStatus, Message, MessageId, Reaction, RemoteMessage};
