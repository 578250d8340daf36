use serde::{Deserialize, Serialize};

/// Author of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One persisted transcript message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    pub model: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(
        content: impl Into<String>,
        timestamp: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: timestamp.into(),
            model: model.into(),
        }
    }

    #[must_use]
    pub fn assistant(
        content: impl Into<String>,
        timestamp: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: timestamp.into(),
            model: model.into(),
        }
    }
}

/// Session shape exchanged with the history store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: String,
    pub model: String,
}

/// Persistent settings shape exchanged with the settings store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, rename = "workingDir", alias = "workingDirectory")]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default = "default_unrestricted")]
    pub unrestricted: bool,
}

fn default_unrestricted() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            working_directory: None,
            allowed_tools: Vec::new(),
            unrestricted: default_unrestricted(),
        }
    }
}
