use thiserror::Error;

use crate::approval::ApprovalError;

/// Rejections surfaced by [`crate::SessionController`]. None of them are fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("A response is already streaming. Stop it before sending another message.")]
    TurnInProgress,
    #[error("This chat has expired. Start a new chat to continue.")]
    SessionExpired,
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("Message is empty")]
    EmptyInput,
    #[error("Failed to start invocation: {0}")]
    Invocation(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Folder does not exist: {0}")]
    InvalidFolder(String),
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Unknown model: {name}. Available: {available}")]
    UnknownModel { name: String, available: String },
    #[error(transparent)]
    Approval(#[from] ApprovalError),
}

impl ControllerError {
    /// Returns true for rejections that happen before any state mutation.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::TurnInProgress
                | Self::SessionExpired
                | Self::BackendUnavailable(_)
                | Self::EmptyInput
        )
    }
}
