//! Explicit per-conversation state owned by the controller.

use std::path::PathBuf;

use chat_protocol::{ChatMessage, ChatSession, Role, Settings};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::tool_kind::truncate_chars;

pub const TITLE_MAX_CHARS: usize = 50;
pub const UNTITLED_SESSION: &str = "Untitled chat";

/// Tools the settings panel knows about.
pub const KNOWN_TOOLS: &[&str] = &[
    "Read",
    "Edit",
    "Write",
    "Bash",
    "Glob",
    "Grep",
    "WebFetch",
    "WebSearch",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPolicy {
    pub unrestricted: bool,
    /// Persistently allowed tools, loaded from settings.
    pub allowed: Vec<String>,
    /// Tools approved during this session only.
    pub session_approved: Vec<String>,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self {
            unrestricted: true,
            allowed: Vec::new(),
            session_approved: Vec::new(),
        }
    }
}

impl ToolPolicy {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            unrestricted: settings.unrestricted,
            allowed: settings.allowed_tools.clone(),
            session_approved: Vec::new(),
        }
    }

    pub fn approve_for_session(&mut self, tool_name: &str) {
        if !self.session_approved.iter().any(|tool| tool == tool_name) {
            self.session_approved.push(tool_name.to_string());
        }
    }

    /// `None` when unrestricted, else the deduplicated union, persistent entries first.
    #[must_use]
    pub fn resolve(&self) -> Option<Vec<String>> {
        if self.unrestricted {
            return None;
        }

        let mut resolved: Vec<String> = Vec::new();
        for tool in self.allowed.iter().chain(&self.session_approved) {
            if !resolved.contains(tool) {
                resolved.push(tool.clone());
            }
        }
        Some(resolved)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    /// Local identifier, created lazily on the first sent message.
    pub id: Option<String>,
    /// Backend continuation identifier, absent until the first reply.
    pub conversation_id: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub expired: bool,
    pub working_directory: Option<PathBuf>,
    pub tool_policy: ToolPolicy,
}

impl Session {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            working_directory: settings
                .working_directory
                .as_deref()
                .map(str::trim)
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
            tool_policy: ToolPolicy::from_settings(settings),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn has_content(&self) -> bool {
        !self.messages.is_empty()
    }

    /// Returns the session id, generating one on first use.
    pub fn ensure_id(&mut self) -> String {
        self.id.get_or_insert_with(new_session_id).clone()
    }

    /// Clears identity, transcript, expiry and session approvals; keeps
    /// the working directory and persistent policy.
    pub fn reset(&mut self) {
        self.id = None;
        self.conversation_id = None;
        self.messages.clear();
        self.expired = false;
        self.tool_policy.session_approved.clear();
    }

    /// Replaces identity and transcript with a stored record.
    pub fn load(&mut self, record: ChatSession) {
        self.reset();
        self.id = Some(record.id);
        self.messages = record.messages;
    }

    #[must_use]
    pub fn title(&self) -> String {
        self.messages
            .iter()
            .find(|message| message.role == Role::User)
            .map(|message| truncate_chars(message.content.trim(), TITLE_MAX_CHARS))
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| UNTITLED_SESSION.to_string())
    }

    /// Snapshot for the history store. `None` until the session has an id.
    #[must_use]
    pub fn to_record(&self, model: &str) -> Option<ChatSession> {
        let id = self.id.clone()?;
        let created_at = self
            .messages
            .first()
            .map(|message| message.timestamp.clone())
            .unwrap_or_else(now_rfc3339);

        Some(ChatSession {
            id,
            title: self.title(),
            messages: self.messages.clone(),
            created_at,
            model: model.to_string(),
        })
    }
}

#[must_use]
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[must_use]
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
