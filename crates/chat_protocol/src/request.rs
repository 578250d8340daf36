use std::path::PathBuf;

use serde_json::Value;

/// Structured intent carried by a resumption after an interrupt.
///
/// Backends without a native resume primitive rely on the synthesized
/// message in [`InvocationRequest::message`] and may ignore this.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeDecision {
    Approved {
        tool_id: String,
        tool_name: String,
        input: Value,
    },
    Denied {
        tool_id: String,
        tool_name: String,
    },
    Answered {
        answers: Vec<(String, String)>,
    },
}

/// Input required to open one streaming invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub message: String,
    /// Locally generated session identifier; also the cancellation key.
    pub session_id: String,
    /// Backend continuation identifier, absent until the first reply.
    pub conversation_id: Option<String>,
    pub model: String,
    pub working_directory: Option<PathBuf>,
    /// `None` means unrestricted: every tool call is auto-approved.
    pub allowed_tools: Option<Vec<String>>,
    pub resume: Option<ResumeDecision>,
}

impl InvocationRequest {
    /// Returns true when `tool_name` runs without an approval interrupt.
    #[must_use]
    pub fn allows_tool(&self, tool_name: &str) -> bool {
        match &self.allowed_tools {
            None => true,
            Some(allowed) => allowed.iter().any(|tool| tool == tool_name),
        }
    }
}
