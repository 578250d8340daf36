#![allow(dead_code)]

use std::path::{Path, PathBuf};

use chat_protocol::{ChatSession, InvocationRequest, Settings, ToolActivity};
use chatgate::{HostOps, InvocationId, TurnEvent};
use serde_json::Value;

#[derive(Default)]
pub struct HostSpy {
    pub next_invocation_id: InvocationId,
    pub requests: Vec<InvocationRequest>,
    pub cancelled: Vec<(InvocationId, String)>,
    pub saved_sessions: Vec<ChatSession>,
    pub deleted_sessions: Vec<String>,
    pub saved_settings: Vec<Settings>,
    pub valid_folders: Vec<PathBuf>,
    pub events: Vec<TurnEvent>,
    pub fail_next_start: Option<String>,
    pub fail_saves: Option<String>,
}

impl HostSpy {
    pub fn last_request(&self) -> &InvocationRequest {
        self.requests.last().expect("an invocation was started")
    }

    pub fn last_saved(&self) -> &ChatSession {
        self.saved_sessions.last().expect("a session was saved")
    }

    pub fn errors(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TurnEvent::Error(message) => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn take_events(&mut self) -> Vec<TurnEvent> {
        std::mem::take(&mut self.events)
    }
}

impl HostOps for HostSpy {
    fn start_invocation(&mut self, request: InvocationRequest) -> Result<InvocationId, String> {
        if let Some(error) = self.fail_next_start.take() {
            return Err(error);
        }

        self.next_invocation_id += 1;
        self.requests.push(request);
        Ok(self.next_invocation_id)
    }

    fn cancel_invocation(&mut self, invocation_id: InvocationId, session_id: &str) {
        self.cancelled.push((invocation_id, session_id.to_string()));
    }

    fn save_session(&mut self, session: &ChatSession) -> Result<(), String> {
        if let Some(error) = &self.fail_saves {
            return Err(error.clone());
        }

        self.saved_sessions.push(session.clone());
        Ok(())
    }

    fn delete_session(&mut self, session_id: &str) -> Result<(), String> {
        self.deleted_sessions.push(session_id.to_string());
        Ok(())
    }

    fn validate_folder(&self, path: &Path) -> bool {
        self.valid_folders.iter().any(|folder| folder == path)
    }

    fn save_settings(&mut self, settings: &Settings) -> Result<(), String> {
        self.saved_settings.push(settings.clone());
        Ok(())
    }

    fn emit(&mut self, event: TurnEvent) {
        self.events.push(event);
    }
}

pub fn tool(tool_id: &str, tool_name: &str, phase: &str, input: Value) -> ToolActivity {
    ToolActivity::new(tool_id, tool_name, phase).with_input(input)
}
