//! Session and streaming orchestration core.
//!
//! [`SessionController`] turns user input into backend invocations, folds the
//! resulting protocol units into a transcript, pauses on tool interrupts until
//! a human resolves them, and expires idle sessions. Every side effect goes
//! through [`HostOps`], so the controller itself never blocks or spawns.

pub mod approval;
pub mod commands;
pub mod controller;
pub mod decoder;
pub mod error;
pub mod events;
pub mod inactivity;
pub mod models;
pub mod session;
pub mod tool_kind;

pub use crate::approval::{
    ApprovalError, ApprovalState, PendingApproval, PendingQuestions, Question, QuestionOption,
    Resumption, ToolApprovalMachine, ToolTransition,
};
pub use crate::commands::{parse_slash_command, SlashCommand};
pub use crate::controller::{
    BackendStatus, ControllerConfig, HostOps, InvocationId, Phase, SessionController,
};
pub use crate::decoder::{decode, Chunk, Decoded, ToolEvent, ToolPhase};
pub use crate::error::ControllerError;
pub use crate::events::TurnEvent;
pub use crate::inactivity::{InactivityAlarm, InactivityMonitor, InactivityPolicy};
pub use crate::models::{alias_list, default_model, resolve_model, ModelEntry, MODELS};
pub use crate::session::{Session, ToolPolicy, KNOWN_TOOLS};
pub use crate::tool_kind::ToolKind;
