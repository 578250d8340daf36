//! Single-threaded control loop around [`SessionController`].
//!
//! Backend invocations run on worker threads and post their units back
//! through one channel together with user input, so every controller
//! mutation happens on the thread that owns the [`Runtime`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chat_protocol::{
    Backend, CancelSignal, ChatSession, InvocationRequest, ProtocolUnit, Settings,
};
use chatgate::{
    BackendStatus, ControllerConfig, ControllerError, HostOps, InvocationId, SessionController,
    TurnEvent,
};
use history_store::{HistoryStore, HistoryStoreError, SettingsStore};
use tracing::{debug, warn};

/// Upper bound on how long the loop blocks without re-checking deadlines.
pub const MAX_IDLE_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    Unit {
        invocation_id: InvocationId,
        unit: ProtocolUnit,
    },
    Ended {
        invocation_id: InvocationId,
        result: Result<(), String>,
    },
    Input(String),
    InputClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Presentation and input routing, driven by the runtime loop.
pub trait Frontend {
    fn render(&mut self, event: &TurnEvent, controller: &SessionController);
    fn on_input(&mut self, line: &str, ctx: &mut RuntimeContext<'_>) -> Flow;
}

struct ActiveInvocation {
    invocation_id: InvocationId,
    cancel: CancelSignal,
    join_handle: Option<JoinHandle<()>>,
}

/// [`HostOps`] implementation backed by worker threads and file stores.
pub struct RuntimeHost {
    backend: Arc<dyn Backend>,
    history: HistoryStore,
    settings: SettingsStore,
    sender: Sender<RuntimeEvent>,
    next_invocation_id: InvocationId,
    invocations: Vec<ActiveInvocation>,
    events: Vec<TurnEvent>,
}

impl RuntimeHost {
    fn new(backend: Arc<dyn Backend>, config_root: &Path, sender: Sender<RuntimeEvent>) -> Self {
        Self {
            backend,
            history: HistoryStore::new(config_root),
            settings: SettingsStore::new(config_root),
            sender,
            next_invocation_id: 1,
            invocations: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    fn spawn_worker(
        &self,
        invocation_id: InvocationId,
        request: InvocationRequest,
        cancel: CancelSignal,
    ) -> Result<JoinHandle<()>, String> {
        let backend = Arc::clone(&self.backend);
        let sender = self.sender.clone();
        thread::Builder::new()
            .name(format!("chatgate-invocation-{invocation_id}"))
            .spawn(move || run_worker(backend, invocation_id, request, cancel, sender))
            .map_err(|error| format!("Failed to spawn invocation worker: {error}"))
    }

    fn reap_finished(&mut self) {
        self.invocations.retain_mut(|invocation| {
            let finished = invocation
                .join_handle
                .as_ref()
                .map_or(true, JoinHandle::is_finished);
            if finished {
                if let Some(handle) = invocation.join_handle.take() {
                    let _ = handle.join();
                }
            }
            !finished
        });
    }

    fn shutdown(&mut self) {
        for invocation in &self.invocations {
            invocation.cancel.store(true, Ordering::SeqCst);
        }
        for mut invocation in self.invocations.drain(..) {
            if let Some(handle) = invocation.join_handle.take() {
                let _ = handle.join();
            }
        }
    }
}

fn run_worker(
    backend: Arc<dyn Backend>,
    invocation_id: InvocationId,
    request: InvocationRequest,
    cancel: CancelSignal,
    sender: Sender<RuntimeEvent>,
) {
    let unit_sender = sender.clone();
    let mut emit = move |unit: ProtocolUnit| {
        let _ = unit_sender.send(RuntimeEvent::Unit {
            invocation_id,
            unit,
        });
    };

    let result = match catch_unwind(AssertUnwindSafe(|| {
        backend.invoke(request, Arc::clone(&cancel), &mut emit)
    })) {
        Ok(result) => result,
        Err(_) => Err("Backend panicked".to_string()),
    };

    let _ = sender.send(RuntimeEvent::Ended {
        invocation_id,
        result,
    });
}

impl HostOps for RuntimeHost {
    fn start_invocation(&mut self, request: InvocationRequest) -> Result<InvocationId, String> {
        self.reap_finished();

        let invocation_id = self.next_invocation_id;
        self.next_invocation_id += 1;
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        let join_handle = self.spawn_worker(invocation_id, request, Arc::clone(&cancel))?;

        self.invocations.push(ActiveInvocation {
            invocation_id,
            cancel,
            join_handle: Some(join_handle),
        });
        debug!(invocation_id, "invocation worker started");
        Ok(invocation_id)
    }

    fn cancel_invocation(&mut self, invocation_id: InvocationId, session_id: &str) {
        if let Some(invocation) = self
            .invocations
            .iter()
            .find(|invocation| invocation.invocation_id == invocation_id)
        {
            invocation.cancel.store(true, Ordering::SeqCst);
        }

        if let Err(error) = self.backend.cancel(session_id) {
            warn!(invocation_id, session_id, error = %error, "backend cancel failed");
        }
    }

    fn save_session(&mut self, session: &ChatSession) -> Result<(), String> {
        self.history.save(session).map_err(|error| error.to_string())
    }

    fn delete_session(&mut self, session_id: &str) -> Result<(), String> {
        self.history
            .delete(session_id)
            .map_err(|error| error.to_string())
    }

    fn validate_folder(&self, path: &Path) -> bool {
        self.settings.validate_folder(path)
    }

    fn save_settings(&mut self, settings: &Settings) -> Result<(), String> {
        self.settings.save(settings).map_err(|error| error.to_string())
    }

    fn emit(&mut self, event: TurnEvent) {
        self.events.push(event);
    }
}

/// Controller plus host for one frontend call, stamped with the time the
/// input arrived.
pub struct RuntimeContext<'a> {
    controller: &'a mut SessionController,
    host: &'a mut RuntimeHost,
    now: Instant,
}

impl RuntimeContext<'_> {
    pub fn controller(&self) -> &SessionController {
        self.controller
    }

    pub fn on_activity(&mut self) {
        self.controller.on_activity(self.now);
    }

    pub fn dismiss_warning(&mut self) {
        self.controller.dismiss_inactivity_warning(self.now);
    }

    pub fn send_message(&mut self, text: &str) -> Result<(), ControllerError> {
        self.controller.send_message(text, self.now, &mut *self.host)
    }

    pub fn approve(&mut self) -> Result<(), ControllerError> {
        self.controller.approve_tool(self.now, &mut *self.host)
    }

    pub fn deny(&mut self) -> Result<(), ControllerError> {
        self.controller.deny_tool(self.now, &mut *self.host)
    }

    pub fn set_answer(&mut self, index: usize, answer: &str) -> Result<(), ControllerError> {
        self.controller.set_answer(index, answer)
    }

    pub fn submit_answers(&mut self) -> Result<(), ControllerError> {
        self.controller.submit_answers(self.now, &mut *self.host)
    }

    pub fn stop(&mut self) {
        self.controller.stop_generation(&mut *self.host);
    }

    pub fn new_chat(&mut self) {
        self.controller.new_chat(&mut *self.host);
    }

    pub fn list_history(&self) -> Result<Vec<ChatSession>, HistoryStoreError> {
        self.host.history().list()
    }

    pub fn open_session(&mut self, record: ChatSession) -> Result<(), ControllerError> {
        self.controller.open_session(record, self.now, &mut *self.host)
    }

    pub fn delete_session(&mut self, session_id: &str) -> Result<(), ControllerError> {
        self.controller.delete_session(session_id, &mut *self.host)
    }

    pub fn apply_settings(&mut self, update: Settings) -> Result<(), ControllerError> {
        self.controller.apply_settings(update, &mut *self.host)
    }

    /// Queues a presentation event alongside the controller's own.
    pub fn emit(&mut self, event: TurnEvent) {
        self.host.emit(event);
    }
}

pub struct Runtime {
    controller: SessionController,
    host: RuntimeHost,
    receiver: Receiver<RuntimeEvent>,
}

impl Runtime {
    pub fn new(backend: Arc<dyn Backend>, config_root: &Path, config: ControllerConfig) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            controller: SessionController::new(config),
            host: RuntimeHost::new(backend, config_root, sender),
            receiver,
        }
    }

    /// Channel for feeding user input from another thread.
    pub fn sender(&self) -> Sender<RuntimeEvent> {
        self.host.sender.clone()
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Probes the backend and records the outcome on the controller.
    pub fn check_backend(&mut self) {
        let status = match self.host.backend.check_available() {
            Ok(version) => BackendStatus::Available { version },
            Err(error) => BackendStatus::Unavailable {
                reason: error.to_string(),
            },
        };
        self.controller.set_backend_status(status, &mut self.host);
    }

    pub fn take_events(&mut self) -> Vec<TurnEvent> {
        std::mem::take(&mut self.host.events)
    }

    pub fn context(&mut self, now: Instant) -> RuntimeContext<'_> {
        RuntimeContext {
            controller: &mut self.controller,
            host: &mut self.host,
            now,
        }
    }

    /// Applies one event to the controller.
    pub fn handle(&mut self, event: RuntimeEvent, frontend: &mut dyn Frontend) -> Flow {
        let flow = match event {
            RuntimeEvent::Unit {
                invocation_id,
                unit,
            } => {
                self.controller
                    .on_protocol_unit(invocation_id, unit, &mut self.host);
                Flow::Continue
            }
            RuntimeEvent::Ended {
                invocation_id,
                result,
            } => {
                self.controller
                    .on_invocation_ended(invocation_id, result, &mut self.host);
                self.host.reap_finished();
                Flow::Continue
            }
            RuntimeEvent::Input(line) => {
                let mut ctx = self.context(Instant::now());
                frontend.on_input(&line, &mut ctx)
            }
            RuntimeEvent::InputClosed => Flow::Quit,
        };

        self.flush(frontend);
        flow
    }

    /// Waits up to `max_wait` (or the next inactivity deadline) for one event,
    /// then polls the inactivity timers.
    pub fn step(&mut self, frontend: &mut dyn Frontend, max_wait: Duration) -> Flow {
        let wait = match self.controller.next_deadline() {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(max_wait),
            None => max_wait,
        };

        let flow = match self.receiver.recv_timeout(wait) {
            Ok(event) => self.handle(event, frontend),
            Err(RecvTimeoutError::Timeout) => Flow::Continue,
            Err(RecvTimeoutError::Disconnected) => Flow::Quit,
        };

        self.tick(Instant::now(), frontend);
        flow
    }

    /// Fires any inactivity alarm due at `now`.
    pub fn tick(&mut self, now: Instant, frontend: &mut dyn Frontend) {
        self.controller.on_tick(now, &mut self.host);
        self.flush(frontend);
    }

    pub fn run(&mut self, frontend: &mut dyn Frontend) {
        self.flush(frontend);
        while self.step(frontend, MAX_IDLE_WAIT) == Flow::Continue {}
        self.shutdown(frontend);
    }

    /// Stops any streaming turn and joins worker threads.
    pub fn shutdown(&mut self, frontend: &mut dyn Frontend) {
        if self.controller.is_streaming() {
            self.controller.stop_generation(&mut self.host);
        }
        self.host.shutdown();
        self.flush(frontend);
    }

    fn flush(&mut self, frontend: &mut dyn Frontend) {
        for event in self.take_events() {
            frontend.render(&event, &self.controller);
        }
    }
}
