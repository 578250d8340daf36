//! Classification of backend protocol units.

use chat_protocol::{ProtocolUnit, ToolActivity, UsageInfo};
use serde_json::Value;

/// Phase of a tool occurrence reported mid-turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolPhase {
    Start,
    Result,
    Ask,
    Approval,
}

impl ToolPhase {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "start" => Some(Self::Start),
            "result" => Some(Self::Result),
            "ask" => Some(Self::Ask),
            "approval" => Some(Self::Approval),
            _ => None,
        }
    }

    /// Interrupt phases mean the backend has already halted itself.
    #[must_use]
    pub fn is_interrupt(self) -> bool {
        matches!(self, Self::Ask | Self::Approval)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolEvent {
    pub tool_id: String,
    pub tool_name: String,
    pub phase: ToolPhase,
    pub input: Value,
    pub result: Option<String>,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    TextDelta(String),
    Tool(ToolEvent),
    Completion { usage: Option<UsageInfo> },
}

/// Outcome of decoding one unit.
///
/// The continuation identifier is extracted independently of the chunk
/// kind; a unit may carry one, the other, both, or neither.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Decoded {
    pub conversation_id: Option<String>,
    pub chunk: Option<Chunk>,
    pub malformed: bool,
}

/// Classifies one protocol unit. Precedence: tool payload, completion, text.
#[must_use]
pub fn decode(unit: ProtocolUnit) -> Decoded {
    let conversation_id = unit.session_id.filter(|id| !id.trim().is_empty());

    if let Some(activity) = unit.tool {
        return match decode_tool(activity) {
            Some(event) => Decoded {
                conversation_id,
                chunk: Some(Chunk::Tool(event)),
                malformed: false,
            },
            None => Decoded {
                conversation_id,
                chunk: None,
                malformed: true,
            },
        };
    }

    if unit.done {
        return Decoded {
            conversation_id,
            chunk: Some(Chunk::Completion { usage: unit.usage }),
            malformed: false,
        };
    }

    let chunk = (!unit.content.is_empty()).then(|| Chunk::TextDelta(unit.content));
    Decoded {
        conversation_id,
        chunk,
        malformed: false,
    }
}

fn decode_tool(activity: ToolActivity) -> Option<ToolEvent> {
    let phase = ToolPhase::parse(&activity.phase)?;
    if activity.tool_name.trim().is_empty() {
        return None;
    }

    // start/result correlate through the id; interrupts may arrive without one.
    if matches!(phase, ToolPhase::Start | ToolPhase::Result) && activity.tool_id.is_empty() {
        return None;
    }

    Some(ToolEvent {
        tool_id: activity.tool_id,
        tool_name: activity.tool_name,
        phase,
        input: activity.input.unwrap_or(Value::Null),
        result: activity.result,
        is_error: activity.is_error.unwrap_or(false),
    })
}
