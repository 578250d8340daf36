use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token counters reported with a completion unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsageInfo {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Tool-phase payload carried by a protocol unit.
///
/// `phase` stays a raw string on the wire; consumers decide which phases
/// they recognize and drop the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolActivity {
    #[serde(default)]
    pub tool_id: String,
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolActivity {
    #[must_use]
    pub fn new(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        phase: impl Into<String>,
    ) -> Self {
        Self {
            tool_id: tool_id.into(),
            tool_name: tool_name.into(),
            phase: phase.into(),
            input: None,
            result: None,
            is_error: None,
        }
    }

    #[must_use]
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    #[must_use]
    pub fn with_result(mut self, result: impl Into<String>, is_error: bool) -> Self {
        self.result = Some(result.into());
        self.is_error = Some(is_error);
        self
    }
}

/// One unit delivered over a backend invocation channel.
///
/// Every field is optional on the wire. A single unit may carry several
/// of them at once (for example a continuation identifier and text).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProtocolUnit {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolActivity>,
}

impl ProtocolUnit {
    /// Text-delta unit.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Unit announcing the backend conversation identifier.
    #[must_use]
    pub fn conversation(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    /// Tool-phase unit.
    #[must_use]
    pub fn tool(activity: ToolActivity) -> Self {
        Self {
            tool: Some(activity),
            ..Self::default()
        }
    }

    /// Completion unit with optional usage counters.
    #[must_use]
    pub fn done(usage: Option<UsageInfo>) -> Self {
        Self {
            done: true,
            usage,
            ..Self::default()
        }
    }
}
