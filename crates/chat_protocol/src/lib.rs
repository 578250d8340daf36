//! Shared contract between the chat session core, its backends and its stores.
//!
//! This crate defines only wire and record shapes plus the backend
//! collaborator trait. It excludes process spawning, persistence and any
//! turn orchestration.

use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};

mod record;
mod request;
mod unit;

pub use record::{ChatMessage, ChatSession, Role, Settings};
pub use request::{InvocationRequest, ResumeDecision};
pub use unit::{ProtocolUnit, ToolActivity, UsageInfo};

/// Shared cancellation flag for one invocation.
pub type CancelSignal = Arc<AtomicBool>;

/// Error returned while constructing a backend or probing its availability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInitError {
    message: String,
}

impl BackendInitError {
    /// Creates a new backend initialization error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the underlying error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for BackendInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BackendInitError {}

impl From<String> for BackendInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for BackendInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Immutable metadata describing a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendProfile {
    pub backend_id: String,
    pub display_name: String,
}

/// Backend-invocation collaborator.
pub trait Backend: Send + Sync + 'static {
    /// Returns backend identity metadata.
    fn profile(&self) -> BackendProfile;

    /// Probes the backend and returns a human-readable version string.
    fn check_available(&self) -> Result<String, BackendInitError>;

    /// Runs one invocation and emits protocol units in arrival order.
    ///
    /// Returns `Err` when the invocation itself fails. Units emitted before
    /// the failure have already been delivered.
    fn invoke(
        &self,
        request: InvocationRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(ProtocolUnit),
    ) -> Result<(), String>;

    /// Asks the backend to terminate whatever runs under `process_id`.
    ///
    /// Fire-and-forget: failures are reported but never block the caller.
    fn cancel(&self, process_id: &str) -> Result<(), String>;
}
