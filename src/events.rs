use chat_protocol::{ChatMessage, Settings, UsageInfo};
use serde_json::Value;

use crate::approval::{PendingApproval, PendingQuestions};

/// Presentation-facing events. Renderers need no protocol knowledge.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// A user turn opened; `resumption` marks synthesized continuation messages.
    TurnStarted {
        session_id: String,
        message: String,
        resumption: bool,
    },
    TextDelta(String),
    ToolStarted {
        tool_id: String,
        tool_name: String,
        input: Value,
    },
    ToolFinished {
        tool_id: String,
        tool_name: String,
        is_error: bool,
        result: Option<String>,
    },
    AwaitingApproval(PendingApproval),
    AwaitingAnswer(PendingQuestions),
    TurnCompleted {
        usage: Option<UsageInfo>,
    },
    TurnErrored {
        error: String,
    },
    TurnStopped,
    InactivityWarning,
    SessionExpired,
    SessionReset,
    SessionLoaded {
        session_id: String,
        messages: Vec<ChatMessage>,
    },
    ConversationCleared,
    SettingsRequested(Settings),
    Notice(String),
    Error(String),
}
