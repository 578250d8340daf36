use std::path::{Path, PathBuf};
use std::time::Instant;

use chat_protocol::{
    ChatMessage, ChatSession, InvocationRequest, ProtocolUnit, ResumeDecision, Settings, UsageInfo,
};
use tracing::{debug, info, warn};

use crate::approval::{ApprovalState, PendingApproval, PendingQuestions, ToolApprovalMachine, ToolTransition};
use crate::commands::{parse_slash_command, SlashCommand, HELP_TEXT};
use crate::decoder::{decode, Chunk, ToolEvent};
use crate::error::ControllerError;
use crate::events::TurnEvent;
use crate::inactivity::{InactivityAlarm, InactivityMonitor, InactivityPolicy};
use crate::models::{alias_list, default_model, resolve_model};
use crate::session::{now_rfc3339, Session};

pub type InvocationId = u64;

/// Side effects the controller delegates to its host.
pub trait HostOps {
    fn start_invocation(&mut self, request: InvocationRequest) -> Result<InvocationId, String>;
    /// Fire-and-forget cancellation keyed by the local session identifier.
    fn cancel_invocation(&mut self, invocation_id: InvocationId, session_id: &str);
    fn save_session(&mut self, session: &ChatSession) -> Result<(), String>;
    fn delete_session(&mut self, session_id: &str) -> Result<(), String>;
    fn validate_folder(&self, path: &Path) -> bool;
    fn save_settings(&mut self, settings: &Settings) -> Result<(), String>;
    fn emit(&mut self, event: TurnEvent);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStatus {
    Unchecked,
    Available { version: String },
    Unavailable { reason: String },
}

/// Coarse controller state for presenters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Ready,
    Streaming { invocation_id: InvocationId },
    AwaitingApproval,
    AwaitingAnswer,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub model: String,
    pub settings: Settings,
    pub inactivity: InactivityPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            model: default_model().id.to_string(),
            settings: Settings::default(),
            inactivity: InactivityPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveTurn {
    invocation_id: InvocationId,
    accumulated: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionController {
    session: Session,
    model: String,
    turn: Option<ActiveTurn>,
    approvals: ToolApprovalMachine,
    inactivity: InactivityMonitor,
    backend: BackendStatus,
}

impl SessionController {
    #[must_use]
    pub fn new(config: ControllerConfig) -> Self {
        let model = resolve_model(&config.model)
            .map_or(config.model, |entry| entry.id.to_string());

        Self {
            session: Session::from_settings(&config.settings),
            model,
            turn: None,
            approvals: ToolApprovalMachine::new(),
            inactivity: InactivityMonitor::new(config.inactivity),
            backend: BackendStatus::Unchecked,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn backend_status(&self) -> &BackendStatus {
        &self.backend
    }

    pub fn is_streaming(&self) -> bool {
        self.turn.is_some()
    }

    /// Text received so far for the streaming turn.
    pub fn accumulated_text(&self) -> Option<&str> {
        self.turn.as_ref().map(|turn| turn.accumulated.as_str())
    }

    pub fn phase(&self) -> Phase {
        if self.session.expired {
            return Phase::Expired;
        }

        if let Some(turn) = &self.turn {
            return Phase::Streaming {
                invocation_id: turn.invocation_id,
            };
        }

        match self.approvals.state() {
            ApprovalState::AwaitingApproval => Phase::AwaitingApproval,
            ApprovalState::AwaitingAnswer => Phase::AwaitingAnswer,
            ApprovalState::Idle | ApprovalState::ToolRunning => Phase::Ready,
        }
    }

    pub fn pending_approval(&self) -> Option<&PendingApproval> {
        self.approvals.pending_approval()
    }

    pub fn pending_questions(&self) -> Option<&PendingQuestions> {
        self.approvals.pending_questions()
    }

    pub fn can_submit_answers(&self) -> bool {
        self.approvals.can_submit_answers()
    }

    pub fn warning_visible(&self) -> bool {
        self.inactivity.warning_visible()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.inactivity.next_deadline()
    }

    /// Settings as they would be persisted right now.
    pub fn settings(&self) -> Settings {
        Settings {
            working_directory: self
                .session
                .working_directory
                .as_ref()
                .map(|dir| dir.display().to_string()),
            allowed_tools: self.session.tool_policy.allowed.clone(),
            unrestricted: self.session.tool_policy.unrestricted,
        }
    }

    pub fn set_backend_status(&mut self, status: BackendStatus, host: &mut dyn HostOps) {
        match &status {
            BackendStatus::Available { version } => {
                info!(version = %version, "backend available");
                host.emit(TurnEvent::Notice(format!("Backend ready ({version})")));
            }
            BackendStatus::Unavailable { reason } => {
                warn!(reason = %reason, "backend unavailable");
                host.emit(TurnEvent::Error(format!("Backend unavailable: {reason}")));
            }
            BackendStatus::Unchecked => {}
        }
        self.backend = status;
    }

    /// Entry point for user input: slash commands or a new chat turn.
    pub fn send_message(
        &mut self,
        text: &str,
        now: Instant,
        host: &mut dyn HostOps,
    ) -> Result<(), ControllerError> {
        let result = self.submit(text, now, host);
        report(result, host)
    }

    fn submit(
        &mut self,
        text: &str,
        now: Instant,
        host: &mut dyn HostOps,
    ) -> Result<(), ControllerError> {
        self.check_preconditions()?;

        let text = text.trim();
        if text.is_empty() {
            return Err(ControllerError::EmptyInput);
        }

        if let Some(command) = parse_slash_command(text) {
            return self.dispatch_command(command, now, host);
        }

        self.start_turn(text, None, now, host)
    }

    fn check_preconditions(&self) -> Result<(), ControllerError> {
        if self.turn.is_some() {
            return Err(ControllerError::TurnInProgress);
        }

        if self.session.expired {
            return Err(ControllerError::SessionExpired);
        }

        if let BackendStatus::Unavailable { reason } = &self.backend {
            return Err(ControllerError::BackendUnavailable(reason.clone()));
        }

        Ok(())
    }

    fn start_turn(
        &mut self,
        text: &str,
        resume: Option<ResumeDecision>,
        now: Instant,
        host: &mut dyn HostOps,
    ) -> Result<(), ControllerError> {
        let session_id = self.session.ensure_id();
        self.session
            .messages
            .push(ChatMessage::user(text, now_rfc3339(), self.model.clone()));
        self.inactivity
            .record_activity(now, self.session.messages.len());
        self.approvals.reset();

        let resumption = resume.is_some();
        let request = InvocationRequest {
            message: text.to_string(),
            session_id: session_id.clone(),
            conversation_id: self.session.conversation_id.clone(),
            model: self.model.clone(),
            working_directory: self.session.working_directory.clone(),
            allowed_tools: self.session.tool_policy.resolve(),
            resume,
        };

        match host.start_invocation(request) {
            Ok(invocation_id) => {
                debug!(session_id = %session_id, invocation_id, resumption, "turn started");
                self.turn = Some(ActiveTurn {
                    invocation_id,
                    accumulated: String::new(),
                });
                host.emit(TurnEvent::TurnStarted {
                    session_id,
                    message: text.to_string(),
                    resumption,
                });
                Ok(())
            }
            Err(error) => {
                warn!(session_id = %session_id, error = %error, "failed to start invocation");
                host.emit(TurnEvent::TurnErrored {
                    error: error.clone(),
                });
                Err(ControllerError::Invocation(error))
            }
        }
    }

    fn is_current(&self, invocation_id: InvocationId) -> bool {
        self.turn
            .as_ref()
            .is_some_and(|turn| turn.invocation_id == invocation_id)
    }

    /// Feeds one protocol unit from `invocation_id`; units from finished turns are dropped.
    pub fn on_protocol_unit(
        &mut self,
        invocation_id: InvocationId,
        unit: ProtocolUnit,
        host: &mut dyn HostOps,
    ) {
        if !self.is_current(invocation_id) {
            debug!(invocation_id, "dropping unit for inactive invocation");
            return;
        }

        let decoded = decode(unit);
        if let Some(conversation_id) = decoded.conversation_id {
            self.session.conversation_id = Some(conversation_id);
        }

        if decoded.malformed {
            debug!(invocation_id, "dropping malformed protocol unit");
            return;
        }

        match decoded.chunk {
            None => {}
            Some(Chunk::TextDelta(text)) => {
                if let Some(turn) = self.turn.as_mut() {
                    turn.accumulated.push_str(&text);
                }
                host.emit(TurnEvent::TextDelta(text));
            }
            Some(Chunk::Tool(event)) => self.apply_tool_event(event, host),
            Some(Chunk::Completion { usage }) => self.complete_turn(usage, host),
        }
    }

    fn apply_tool_event(&mut self, event: ToolEvent, host: &mut dyn HostOps) {
        let tool_name = event.tool_name.clone();
        match self.approvals.apply(event) {
            ToolTransition::Started {
                tool_id,
                tool_name,
                input,
            } => host.emit(TurnEvent::ToolStarted {
                tool_id,
                tool_name,
                input,
            }),
            ToolTransition::Finished {
                tool_id,
                tool_name,
                is_error,
                result,
            } => host.emit(TurnEvent::ToolFinished {
                tool_id,
                tool_name,
                is_error,
                result,
            }),
            ToolTransition::AwaitingApproval(pending) => {
                info!(tool_name = %pending.tool_name, "tool awaiting approval");
                self.interrupt_turn(host);
                host.emit(TurnEvent::AwaitingApproval(pending));
            }
            ToolTransition::AwaitingAnswer(pending) => {
                info!(questions = pending.questions().len(), "backend awaiting answers");
                self.interrupt_turn(host);
                host.emit(TurnEvent::AwaitingAnswer(pending));
            }
            ToolTransition::Ignored => {
                debug!(tool_name = %tool_name, "ignoring tool event");
            }
        }
    }

    /// The backend halted itself; the stream is over without a completion.
    fn interrupt_turn(&mut self, host: &mut dyn HostOps) {
        if let Some(turn) = self.turn.take() {
            self.finalize_text(turn.accumulated);
            self.persist(host);
        }
    }

    fn complete_turn(&mut self, usage: Option<UsageInfo>, host: &mut dyn HostOps) {
        let Some(turn) = self.turn.take() else {
            return;
        };

        self.approvals.end_turn();
        self.finalize_text(turn.accumulated);
        self.persist(host);
        host.emit(TurnEvent::TurnCompleted { usage });
    }

    /// Reports the end of an invocation's channel.
    ///
    /// Completed, interrupted and stopped turns have already been finalized,
    /// so this only matters when the channel closed without a completion.
    pub fn on_invocation_ended(
        &mut self,
        invocation_id: InvocationId,
        result: Result<(), String>,
        host: &mut dyn HostOps,
    ) {
        if !self.is_current(invocation_id) {
            return;
        }

        let Some(turn) = self.turn.take() else {
            return;
        };

        let error = match result {
            Ok(()) => String::from("Backend exited without completing the response"),
            Err(error) => error,
        };
        warn!(invocation_id, error = %error, "invocation failed");

        self.approvals.end_turn();
        self.finalize_text(turn.accumulated);
        self.persist(host);
        host.emit(TurnEvent::TurnErrored { error });
    }

    pub fn stop_generation(&mut self, host: &mut dyn HostOps) {
        if let Some(turn) = self.turn.take() {
            let session_id = self.session.id.clone().unwrap_or_default();
            host.cancel_invocation(turn.invocation_id, &session_id);
            self.approvals.end_turn();
            self.finalize_text(turn.accumulated);
            self.persist(host);
        }

        host.emit(TurnEvent::TurnStopped);
    }

    pub fn new_chat(&mut self, host: &mut dyn HostOps) {
        self.cancel_active_turn(host);
        self.persist(host);
        self.clear_session();
        host.emit(TurnEvent::SessionReset);
    }

    fn cancel_active_turn(&mut self, host: &mut dyn HostOps) {
        if let Some(turn) = self.turn.take() {
            let session_id = self.session.id.clone().unwrap_or_default();
            host.cancel_invocation(turn.invocation_id, &session_id);
            self.finalize_text(turn.accumulated);
        }
    }

    fn clear_session(&mut self) {
        self.session.reset();
        self.approvals.reset();
        self.inactivity.disarm();
    }

    pub fn approve_tool(&mut self, now: Instant, host: &mut dyn HostOps) -> Result<(), ControllerError> {
        let result = self.resolve_approval(true, now, host);
        report(result, host)
    }

    pub fn deny_tool(&mut self, now: Instant, host: &mut dyn HostOps) -> Result<(), ControllerError> {
        let result = self.resolve_approval(false, now, host);
        report(result, host)
    }

    fn resolve_approval(
        &mut self,
        approve: bool,
        now: Instant,
        host: &mut dyn HostOps,
    ) -> Result<(), ControllerError> {
        self.check_preconditions()?;

        let resumption = if approve {
            self.approvals.approve()?
        } else {
            self.approvals.deny()?
        };

        if let ResumeDecision::Approved { tool_name, .. } = &resumption.decision {
            self.session.tool_policy.approve_for_session(tool_name);
        }

        self.start_turn(&resumption.message, Some(resumption.decision), now, host)
    }

    pub fn set_answer(&mut self, index: usize, answer: &str) -> Result<(), ControllerError> {
        self.approvals.set_answer(index, answer)?;
        Ok(())
    }

    pub fn submit_answers(&mut self, now: Instant, host: &mut dyn HostOps) -> Result<(), ControllerError> {
        let result = self.try_submit_answers(now, host);
        report(result, host)
    }

    fn try_submit_answers(&mut self, now: Instant, host: &mut dyn HostOps) -> Result<(), ControllerError> {
        self.check_preconditions()?;
        let resumption = self.approvals.submit_answers()?;
        self.start_turn(&resumption.message, Some(resumption.decision), now, host)
    }

    /// Any user activity restarts the inactivity countdowns.
    pub fn on_activity(&mut self, now: Instant) {
        if self.session.expired {
            return;
        }

        self.inactivity
            .record_activity(now, self.session.messages.len());
    }

    pub fn dismiss_inactivity_warning(&mut self, now: Instant) {
        if self.session.expired {
            return;
        }

        self.inactivity
            .dismiss_warning(now, self.session.messages.len());
    }

    pub fn on_tick(&mut self, now: Instant, host: &mut dyn HostOps) {
        match self.inactivity.poll(now) {
            Some(InactivityAlarm::Warning) => host.emit(TurnEvent::InactivityWarning),
            Some(InactivityAlarm::Expired) => self.expire(host),
            None => {}
        }
    }

    fn expire(&mut self, host: &mut dyn HostOps) {
        info!(session_id = ?self.session.id, "session expired after inactivity");
        self.cancel_active_turn(host);
        self.approvals.reset();
        self.session.expired = true;
        self.persist(host);
        host.emit(TurnEvent::SessionExpired);
    }

    /// Replaces the in-memory session with a stored record.
    pub fn open_session(
        &mut self,
        record: ChatSession,
        now: Instant,
        host: &mut dyn HostOps,
    ) -> Result<(), ControllerError> {
        if self.turn.is_some() {
            return report(Err(ControllerError::TurnInProgress), host);
        }

        self.persist(host);
        self.approvals.reset();

        if let Some(entry) = resolve_model(&record.model) {
            self.model = entry.id.to_string();
        }

        let session_id = record.id.clone();
        self.session.load(record);
        self.inactivity
            .record_activity(now, self.session.messages.len());

        host.emit(TurnEvent::SessionLoaded {
            session_id,
            messages: self.session.messages.clone(),
        });
        Ok(())
    }

    pub fn delete_session(&mut self, session_id: &str, host: &mut dyn HostOps) -> Result<(), ControllerError> {
        if let Err(error) = host.delete_session(session_id) {
            warn!(session_id, error = %error, "failed to delete session");
            return report(Err(ControllerError::Storage(error)), host);
        }

        // The current session is gone from storage; reset without re-saving it.
        if self.session.id.as_deref() == Some(session_id) {
            self.cancel_active_turn(host);
            self.clear_session();
            host.emit(TurnEvent::SessionReset);
        }

        Ok(())
    }

    /// Validates and persists a settings update through the same hooks as `/dir`.
    pub fn apply_settings(&mut self, update: Settings, host: &mut dyn HostOps) -> Result<(), ControllerError> {
        let result = self.try_apply_settings(update, host);
        report(result, host)
    }

    fn try_apply_settings(&mut self, update: Settings, host: &mut dyn HostOps) -> Result<(), ControllerError> {
        let working_directory = match update
            .working_directory
            .as_deref()
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
        {
            Some(dir) => {
                let path = PathBuf::from(dir);
                if !host.validate_folder(&path) {
                    return Err(ControllerError::InvalidFolder(dir.to_string()));
                }
                Some(path)
            }
            None => None,
        };

        self.session.working_directory = working_directory;
        self.session.tool_policy.unrestricted = update.unrestricted;
        self.session.tool_policy.allowed = update.allowed_tools;
        self.persist_settings(host);
        Ok(())
    }

    fn dispatch_command(
        &mut self,
        command: SlashCommand,
        now: Instant,
        host: &mut dyn HostOps,
    ) -> Result<(), ControllerError> {
        match command {
            SlashCommand::Model(None) => {
                let label = resolve_model(&self.model)
                    .map_or(self.model.clone(), |entry| {
                        format!("{} ({})", entry.display_name, entry.id)
                    });
                host.emit(TurnEvent::Notice(format!(
                    "Current model: {label}\nUsage: /model {}",
                    alias_list().replace(", ", " | ")
                )));
            }
            SlashCommand::Model(Some(name)) => {
                let entry = resolve_model(&name).ok_or_else(|| ControllerError::UnknownModel {
                    name: name.clone(),
                    available: alias_list(),
                })?;
                self.model = entry.id.to_string();
                host.emit(TurnEvent::Notice(format!(
                    "Model changed to: {}",
                    entry.display_name
                )));
            }
            SlashCommand::Dir(None) => {
                let current = self
                    .session
                    .working_directory
                    .as_ref()
                    .map_or_else(|| String::from("not set"), |dir| dir.display().to_string());
                host.emit(TurnEvent::Notice(format!(
                    "Project folder: {current}\nUsage: /dir /path/to/project"
                )));
            }
            SlashCommand::Dir(Some(path)) => {
                let mut update = self.settings();
                update.working_directory = Some(path.clone());
                self.try_apply_settings(update, host)?;
                host.emit(TurnEvent::Notice(format!("Project folder: {path}")));
            }
            SlashCommand::Settings => host.emit(TurnEvent::SettingsRequested(self.settings())),
            SlashCommand::New => self.new_chat(host),
            SlashCommand::Clear => {
                self.session.messages.clear();
                self.inactivity
                    .record_activity(now, self.session.messages.len());
                host.emit(TurnEvent::ConversationCleared);
            }
            SlashCommand::Help => host.emit(TurnEvent::Notice(HELP_TEXT.to_string())),
            SlashCommand::Unknown(token) => return Err(ControllerError::UnknownCommand(token)),
        }

        Ok(())
    }

    fn finalize_text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }

        self.session
            .messages
            .push(ChatMessage::assistant(text, now_rfc3339(), self.model.clone()));
    }

    fn persist(&mut self, host: &mut dyn HostOps) {
        if !self.session.has_content() {
            return;
        }

        let Some(record) = self.session.to_record(&self.model) else {
            return;
        };

        if let Err(error) = host.save_session(&record) {
            warn!(session_id = %record.id, error = %error, "failed to save session");
            host.emit(TurnEvent::Error(format!("Failed to save chat: {error}")));
        }
    }

    fn persist_settings(&mut self, host: &mut dyn HostOps) {
        let settings = self.settings();
        if let Err(error) = host.save_settings(&settings) {
            warn!(error = %error, "failed to save settings");
            host.emit(TurnEvent::Error(format!("Failed to save settings: {error}")));
        }
    }
}

/// Surfaces rejections as user-visible errors. Start failures were already
/// reported as `TurnErrored`.
fn report(result: Result<(), ControllerError>, host: &mut dyn HostOps) -> Result<(), ControllerError> {
    if let Err(error) = &result {
        if !matches!(error, ControllerError::Invocation(_)) {
            host.emit(TurnEvent::Error(error.to_string()));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Default)]
    struct NullHost {
        next_id: InvocationId,
        requests: Vec<InvocationRequest>,
        events: Vec<TurnEvent>,
    }

    impl HostOps for NullHost {
        fn start_invocation(&mut self, request: InvocationRequest) -> Result<InvocationId, String> {
            self.next_id += 1;
            self.requests.push(request);
            Ok(self.next_id)
        }

        fn cancel_invocation(&mut self, _invocation_id: InvocationId, _session_id: &str) {}

        fn save_session(&mut self, _session: &ChatSession) -> Result<(), String> {
            Ok(())
        }

        fn delete_session(&mut self, _session_id: &str) -> Result<(), String> {
            Ok(())
        }

        fn validate_folder(&self, _path: &Path) -> bool {
            true
        }

        fn save_settings(&mut self, _settings: &Settings) -> Result<(), String> {
            Ok(())
        }

        fn emit(&mut self, event: TurnEvent) {
            self.events.push(event);
        }
    }

    #[test]
    fn new_controller_resolves_model_alias() {
        let controller = SessionController::new(ControllerConfig {
            model: "haiku".to_string(),
            ..ControllerConfig::default()
        });
        assert_eq!(controller.model(), "claude-haiku-4-5-20251001");
        assert_eq!(controller.phase(), Phase::Ready);
    }

    #[test]
    fn identifier_only_unit_records_conversation_id() {
        let mut controller = SessionController::new(ControllerConfig::default());
        let mut host = NullHost::default();
        controller
            .send_message("hi", Instant::now(), &mut host)
            .expect("turn should start");

        controller.on_protocol_unit(1, ProtocolUnit::conversation("conv-1"), &mut host);

        assert_eq!(controller.session().conversation_id.as_deref(), Some("conv-1"));
        assert!(controller.is_streaming());
    }

    #[test]
    fn empty_input_is_rejected_without_state_change() {
        let mut controller = SessionController::new(ControllerConfig::default());
        let mut host = NullHost::default();

        let result = controller.send_message("   ", Instant::now(), &mut host);

        assert_eq!(result, Err(ControllerError::EmptyInput));
        assert!(host.requests.is_empty());
        assert_eq!(controller.session().id, None);
    }

    #[test]
    fn clear_keeps_session_identity() {
        let mut controller = SessionController::new(ControllerConfig::default());
        let mut host = NullHost::default();
        let now = Instant::now();
        controller.send_message("hi", now, &mut host).expect("turn");
        controller.on_protocol_unit(1, ProtocolUnit::done(None), &mut host);
        let id = controller.session().id.clone();

        controller.send_message("/clear", now, &mut host).expect("clear");

        assert!(controller.session().messages.is_empty());
        assert_eq!(controller.session().id, id);
        assert_eq!(controller.next_deadline(), None);
    }
}
