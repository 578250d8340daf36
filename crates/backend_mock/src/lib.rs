//! Deterministic scripted implementation of the `chat_protocol` backend contract.
//!
//! This crate contains no process or transport logic and is intended for
//! local development and controller-level integration testing.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chat_protocol::{
    Backend, BackendInitError, BackendProfile, CancelSignal, InvocationRequest, ProtocolUnit,
    ToolActivity, UsageInfo,
};
use serde_json::json;

/// Stable backend identifier used for explicit startup selection.
pub const MOCK_BACKEND_ID: &str = "mock";

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Unit(ProtocolUnit),
    Pause(Duration),
    Fail(String),
}

/// Ordered steps replayed for one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    steps: Vec<ScriptStep>,
}

impl Script {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn unit(mut self, unit: ProtocolUnit) -> Self {
        self.steps.push(ScriptStep::Unit(unit));
        self
    }

    #[must_use]
    pub fn conversation(self, conversation_id: &str) -> Self {
        self.unit(ProtocolUnit::conversation(conversation_id))
    }

    /// Splits `text` after every space or newline, one unit per token.
    #[must_use]
    pub fn tokens(mut self, text: &str) -> Self {
        let mut pending = String::new();
        for ch in text.chars() {
            pending.push(ch);
            if matches!(ch, ' ' | '\n') {
                self.steps
                    .push(ScriptStep::Unit(ProtocolUnit::text(std::mem::take(&mut pending))));
            }
        }

        if !pending.is_empty() {
            self.steps.push(ScriptStep::Unit(ProtocolUnit::text(pending)));
        }
        self
    }

    #[must_use]
    pub fn tool(self, activity: ToolActivity) -> Self {
        self.unit(ProtocolUnit::tool(activity))
    }

    #[must_use]
    pub fn done(self, usage: Option<UsageInfo>) -> Self {
        self.unit(ProtocolUnit::done(usage))
    }

    #[must_use]
    pub fn pause(mut self, duration: Duration) -> Self {
        self.steps.push(ScriptStep::Pause(duration));
        self
    }

    #[must_use]
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::Fail(error.into()));
        self
    }
}

/// Deterministic backend used by `chatgate_cli` tests and local runs.
///
/// Queued scripts are consumed one per invocation. With an empty queue the
/// backend either fails the invocation or, in demo mode, synthesizes a reply.
#[derive(Debug)]
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<InvocationRequest>>,
    cancels: Mutex<Vec<String>>,
    unit_delay: Duration,
    demo: bool,
    unavailable: Option<String>,
}

impl ScriptedBackend {
    #[must_use]
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
            unit_delay: Duration::ZERO,
            demo: false,
            unavailable: None,
        }
    }

    /// Backend that streams a synthesized reply with visible pacing.
    #[must_use]
    pub fn demo() -> Self {
        Self {
            unit_delay: Duration::from_millis(Self::DEMO_UNIT_DELAY_MS),
            demo: true,
            ..Self::new(Vec::new())
        }
    }

    #[must_use]
    pub fn with_unit_delay(mut self, delay: Duration) -> Self {
        self.unit_delay = delay;
        self
    }

    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            unavailable: Some(reason.into()),
            ..Self::new(Vec::new())
        }
    }

    pub fn push_script(&self, script: Script) {
        lock_unpoisoned(&self.scripts).push_back(script);
    }

    /// Requests received so far, in invocation order.
    pub fn requests(&self) -> Vec<InvocationRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    /// Process identifiers passed to [`Backend::cancel`].
    pub fn cancelled(&self) -> Vec<String> {
        lock_unpoisoned(&self.cancels).clone()
    }

    fn next_script(&self, request: &InvocationRequest) -> Option<Script> {
        if let Some(script) = lock_unpoisoned(&self.scripts).pop_front() {
            return Some(script);
        }

        self.demo.then(|| demo_script(request))
    }

    const DEMO_UNIT_DELAY_MS: u64 = 40;
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::demo()
    }
}

impl Backend for ScriptedBackend {
    fn profile(&self) -> BackendProfile {
        BackendProfile {
            backend_id: MOCK_BACKEND_ID.to_string(),
            display_name: "Scripted mock".to_string(),
        }
    }

    fn check_available(&self) -> Result<String, BackendInitError> {
        match &self.unavailable {
            Some(reason) => Err(BackendInitError::new(reason.clone())),
            None => Ok("mock 0.1.0".to_string()),
        }
    }

    fn invoke(
        &self,
        request: InvocationRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(ProtocolUnit),
    ) -> Result<(), String> {
        let script = self.next_script(&request);
        lock_unpoisoned(&self.requests).push(request);

        let Some(script) = script else {
            return Err("no script queued for mock backend".to_string());
        };

        for step in script.steps {
            if cancel.load(Ordering::SeqCst) {
                return Ok(());
            }

            match step {
                ScriptStep::Unit(unit) => {
                    let interrupt = unit
                        .tool
                        .as_ref()
                        .is_some_and(|tool| matches!(tool.phase.as_str(), "ask" | "approval"));
                    emit(unit);
                    if interrupt {
                        return Ok(());
                    }
                    if !self.unit_delay.is_zero() {
                        thread::sleep(self.unit_delay);
                    }
                }
                ScriptStep::Pause(duration) => thread::sleep(duration),
                ScriptStep::Fail(error) => return Err(error),
            }
        }

        Ok(())
    }

    fn cancel(&self, process_id: &str) -> Result<(), String> {
        lock_unpoisoned(&self.cancels).push(process_id.to_string());
        Ok(())
    }
}

/// Echo reply that also exercises the tool policy: a `Read` call runs when
/// allowed and halts for approval otherwise.
fn demo_script(request: &InvocationRequest) -> Script {
    let conversation_id = request
        .conversation_id
        .clone()
        .unwrap_or_else(|| format!("mock-{}", request.session_id));
    let read = json!({ "file_path": "README.md" });

    let script = Script::new()
        .conversation(&conversation_id)
        .tokens("Looking at the project first.\n");

    if !request.allows_tool("Read") {
        return script.tool(ToolActivity::new("mock-read", "Read", "approval").with_input(read));
    }

    script
        .tool(ToolActivity::new("mock-read", "Read", "start").with_input(read))
        .tool(ToolActivity::new("mock-read", "Read", "result").with_result("# README", false))
        .tokens(&format!("You said: {}\n", request.message))
        .done(Some(UsageInfo {
            input_tokens: request.message.len() as u64,
            output_tokens: 12,
        }))
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
