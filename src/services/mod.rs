pub mod decision_service;
pub mod index_service;
pub mod reconciliation;
pub mod refresh_service;
pub mod send_coordinator;

pub use decision_service::DecisionService;
pub use index_service::{ConversationIndex, RecomputeQueue};
pub use reconciliation::{ReconcileEngine, RemoteOutcome};
pub use refresh_service::{RefreshHandle, RefreshScheduler};
pub use send_coordinator::{FailedSend, SendCoordinator};
