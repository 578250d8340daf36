#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use backend_mock::{Script, ScriptedBackend};
use chat_protocol::Backend;
use chatgate::{ControllerConfig, SessionController, TurnEvent};
use chatgate_cli::runtime::{Flow, Frontend, Runtime, RuntimeContext};
use tempfile::TempDir;

/// Frontend that records rendered events and sends every input line as a message.
#[derive(Default)]
pub struct RecordingFrontend {
    pub events: Vec<TurnEvent>,
}

impl RecordingFrontend {
    pub fn errors(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TurnEvent::Error(message) => Some(message.clone()),
                TurnEvent::TurnErrored { error } => Some(error.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn reply_text(&self) -> String {
        self.events
            .iter()
            .filter_map(|event| match event {
                TurnEvent::TextDelta(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Frontend for RecordingFrontend {
    fn render(&mut self, event: &TurnEvent, _controller: &SessionController) {
        self.events.push(event.clone());
    }

    fn on_input(&mut self, line: &str, ctx: &mut RuntimeContext<'_>) -> Flow {
        ctx.on_activity();
        let _ = ctx.send_message(line);
        Flow::Continue
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub backend: Arc<ScriptedBackend>,
    pub runtime: Runtime,
}

impl Harness {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self::with_backend(ScriptedBackend::new(scripts))
    }

    pub fn with_backend(backend: ScriptedBackend) -> Self {
        Self::with_config(backend, ControllerConfig::default())
    }

    pub fn with_config(backend: ScriptedBackend, config: ControllerConfig) -> Self {
        let dir = TempDir::new().expect("tempdir should be created");
        let backend = Arc::new(backend);
        let shared: Arc<dyn Backend> = Arc::clone(&backend) as Arc<dyn Backend>;
        let runtime = Runtime::new(shared, dir.path(), config);
        Self {
            dir,
            backend,
            runtime,
        }
    }

    /// Steps the loop until `predicate` holds or five seconds pass.
    pub fn run_until(
        &mut self,
        frontend: &mut dyn Frontend,
        mut predicate: impl FnMut(&Runtime) -> bool,
    ) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if predicate(&self.runtime) {
                return true;
            }
            self.runtime.step(frontend, Duration::from_millis(10));
        }
        predicate(&self.runtime)
    }

    pub fn run_until_idle(&mut self, frontend: &mut dyn Frontend) -> bool {
        self.run_until(frontend, |runtime| !runtime.controller().is_streaming())
    }
}
