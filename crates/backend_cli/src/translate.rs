//! Stream-JSON line translation into protocol units.
//!
//! Pure and line-at-a-time: the caller owns the process and decides what to
//! do when a line interrupts the stream.

use chat_protocol::{ProtocolUnit, ToolActivity, UsageInfo};
use serde_json::Value;
use tracing::debug;

/// Tool the CLI uses to pose structured questions to the user.
pub const ASK_USER_TOOL: &str = "AskUserQuestion";

#[derive(Debug, Clone, PartialEq, Eq)]
struct ToolUseBlock {
    id: String,
    name: String,
    index: Option<u64>,
    input_json: String,
}

/// Units produced by one line, plus whether the process must halt now.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineOutcome {
    pub units: Vec<ProtocolUnit>,
    pub interrupted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StreamTranslator {
    allowed_tools: Option<Vec<String>>,
    conversation_announced: bool,
    active_tool: Option<ToolUseBlock>,
    usage: Option<UsageInfo>,
    text_seen: bool,
}

impl StreamTranslator {
    /// `allowed_tools = None` means every tool call proceeds without approval.
    #[must_use]
    pub fn new(allowed_tools: Option<Vec<String>>) -> Self {
        Self {
            allowed_tools,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn usage(&self) -> Option<UsageInfo> {
        self.usage
    }

    #[must_use]
    pub fn text_seen(&self) -> bool {
        self.text_seen
    }

    pub fn translate_line(&mut self, line: &str) -> LineOutcome {
        let mut outcome = LineOutcome::default();
        let line = line.trim();
        if line.is_empty() {
            return outcome;
        }

        let json: Value = match serde_json::from_str(line) {
            Ok(json) => json,
            Err(error) => {
                debug!(error = %error, "skipping non-JSON output line");
                return outcome;
            }
        };

        if !self.conversation_announced {
            if let Some(session_id) = json.get("session_id").and_then(Value::as_str) {
                self.conversation_announced = true;
                outcome.units.push(ProtocolUnit::conversation(session_id));
            }
        }

        match json.get("type").and_then(Value::as_str).unwrap_or_default() {
            "stream_event" => {
                if let Some(event) = json.get("event") {
                    self.translate_stream_event(event, &mut outcome);
                }
            }
            "user" => translate_tool_results(&json, &mut outcome),
            "result" => {
                if let Some(usage) = json.get("usage") {
                    self.usage = Some(parse_usage(usage));
                }
            }
            _ => {}
        }

        outcome
    }

    fn translate_stream_event(&mut self, event: &Value, outcome: &mut LineOutcome) {
        let index = event.get("index").and_then(Value::as_u64);

        match event.get("type").and_then(Value::as_str).unwrap_or_default() {
            "content_block_delta" => {
                let Some(delta) = event.get("delta") else {
                    return;
                };
                match delta.get("type").and_then(Value::as_str).unwrap_or_default() {
                    "text_delta" => {
                        if let Some(text) = delta.get("text").and_then(Value::as_str) {
                            self.text_seen |= !text.is_empty();
                            outcome.units.push(ProtocolUnit::text(text));
                        }
                    }
                    "input_json_delta" => {
                        if let (Some(tool), Some(partial)) = (
                            self.active_tool.as_mut(),
                            delta.get("partial_json").and_then(Value::as_str),
                        ) {
                            tool.input_json.push_str(partial);
                        }
                    }
                    _ => {}
                }
            }
            "content_block_start" => {
                let Some(block) = event.get("content_block") else {
                    return;
                };
                if block.get("type").and_then(Value::as_str) != Some("tool_use") {
                    return;
                }

                let field = |key: &str| {
                    block
                        .get(key)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                let name = field("name");
                self.active_tool = Some(ToolUseBlock {
                    id: field("id"),
                    name: if name.is_empty() { "unknown".to_string() } else { name },
                    index,
                    input_json: String::new(),
                });
            }
            "content_block_stop" => {
                if self
                    .active_tool
                    .as_ref()
                    .is_some_and(|tool| tool.index == index)
                {
                    if let Some(tool) = self.active_tool.take() {
                        self.close_tool(tool, outcome);
                    }
                }
            }
            _ => {}
        }
    }

    fn close_tool(&mut self, tool: ToolUseBlock, outcome: &mut LineOutcome) {
        let input = serde_json::from_str::<Value>(&tool.input_json).unwrap_or(Value::Null);

        let phase = if tool.name == ASK_USER_TOOL {
            "ask"
        } else if !self.allows(&tool.name) {
            "approval"
        } else {
            "start"
        };

        outcome.interrupted = phase != "start";
        outcome.units.push(ProtocolUnit::tool(
            ToolActivity::new(tool.id, tool.name, phase).with_input(input),
        ));
    }

    fn allows(&self, tool_name: &str) -> bool {
        match &self.allowed_tools {
            None => true,
            Some(allowed) => allowed.iter().any(|tool| tool == tool_name),
        }
    }
}

fn translate_tool_results(json: &Value, outcome: &mut LineOutcome) {
    let Some(items) = json
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_array)
    else {
        return;
    };

    let tool_name = json
        .get("tool_use_result")
        .and_then(|result| result.get("tool_name"))
        .and_then(Value::as_str)
        .unwrap_or("Tool");

    for item in items {
        if item.get("type").and_then(Value::as_str) != Some("tool_result") {
            continue;
        }

        let tool_id = item
            .get("tool_use_id")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let is_error = item
            .get("is_error")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        outcome.units.push(ProtocolUnit::tool(
            ToolActivity::new(tool_id, tool_name, "result")
                .with_result(result_text(item.get("content")), is_error),
        ));
    }
}

/// Tool result content is either a plain string or a list of text blocks.
fn result_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn parse_usage(usage: &Value) -> UsageInfo {
    let count = |key: &str| usage.get(key).and_then(Value::as_u64).unwrap_or(0);

    UsageInfo {
        input_tokens: count("input_tokens")
            + count("cache_creation_input_tokens")
            + count("cache_read_input_tokens"),
        output_tokens: count("output_tokens"),
    }
}
