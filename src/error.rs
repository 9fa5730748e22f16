use thiserror::Error;
use uuid::Uuid;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid content: {0}")]
    InvalidContent(String),

    #[error("backend send failed: {0}")]
    SendFailed(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("conversation {0} not known locally")]
    StaleConversation(Uuid),

    #[error("message not found")]
    MessageNotFound,

    #[error("message is not a proposal")]
    NotAProposal,

    #[error("subscription error: {0}")]
    Subscription(String),
}

impl CoreError {
    /// Whether the caller may reasonably resubmit the same operation.
    /// The coordinator itself never retries; this informs the
    /// retry-by-resubmission policy at the composition surface.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::SendFailed(_)
                | CoreError::BackendUnavailable(_)
                | CoreError::Subscription(_)
        )
    }
}
