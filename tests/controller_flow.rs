mod support;

use std::path::PathBuf;
use std::time::Instant;

use assert_matches::assert_matches;
use chat_protocol::{ChatMessage, ChatSession, ProtocolUnit, Role, Settings, UsageInfo};
use chatgate::{
    BackendStatus, ControllerConfig, ControllerError, Phase, SessionController, TurnEvent,
};
use pretty_assertions::assert_eq;

use support::HostSpy;

fn controller() -> SessionController {
    SessionController::new(ControllerConfig::default())
}

fn restricted_controller(allowed: &[&str]) -> SessionController {
    SessionController::new(ControllerConfig {
        settings: Settings {
            working_directory: None,
            allowed_tools: allowed.iter().map(ToString::to_string).collect(),
            unrestricted: false,
        },
        ..ControllerConfig::default()
    })
}

#[test]
fn send_message_opens_invocation_with_session_context() {
    let mut controller = controller();
    let mut host = HostSpy::default();

    controller
        .send_message("  explain the build  ", Instant::now(), &mut host)
        .expect("turn should start");

    let request = host.last_request();
    assert_eq!(request.message, "explain the build");
    assert_eq!(Some(request.session_id.clone()), controller.session().id);
    assert_eq!(request.conversation_id, None);
    assert_eq!(request.model, "claude-sonnet-4-5-20250929");
    assert_eq!(request.allowed_tools, None);
    assert_eq!(request.resume, None);

    assert_eq!(controller.phase(), Phase::Streaming { invocation_id: 1 });
    assert_eq!(controller.session().messages.len(), 1);
    assert_eq!(controller.session().messages[0].role, Role::User);
    assert_matches!(
        host.events.last(),
        Some(TurnEvent::TurnStarted { resumption: false, .. })
    );
}

#[test]
fn completion_appends_exact_concatenation_and_persists() {
    let mut controller = controller();
    let mut host = HostSpy::default();
    controller
        .send_message("hi", Instant::now(), &mut host)
        .expect("turn should start");

    let mut first = ProtocolUnit::text("Hel");
    first.session_id = Some("conv-7".to_string());
    controller.on_protocol_unit(1, first, &mut host);
    controller.on_protocol_unit(1, ProtocolUnit::text("lo, "), &mut host);
    controller.on_protocol_unit(1, ProtocolUnit::text("world"), &mut host);
    let usage = UsageInfo {
        input_tokens: 1_200,
        output_tokens: 34,
    };
    controller.on_protocol_unit(1, ProtocolUnit::done(Some(usage)), &mut host);

    let messages = &controller.session().messages;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "Hello, world");
    assert_eq!(controller.session().conversation_id.as_deref(), Some("conv-7"));
    assert_eq!(controller.phase(), Phase::Ready);

    let saved = host.last_saved();
    assert_eq!(saved.title, "hi");
    assert_eq!(saved.messages.len(), 2);
    assert_eq!(
        host.events.last(),
        Some(&TurnEvent::TurnCompleted { usage: Some(usage) })
    );

    controller
        .send_message("again", Instant::now(), &mut host)
        .expect("second turn");
    assert_eq!(host.last_request().conversation_id.as_deref(), Some("conv-7"));
}

#[test]
fn empty_completion_adds_no_assistant_message() {
    let mut controller = controller();
    let mut host = HostSpy::default();
    controller
        .send_message("hi", Instant::now(), &mut host)
        .expect("turn should start");

    controller.on_protocol_unit(1, ProtocolUnit::done(None), &mut host);

    assert_eq!(controller.session().messages.len(), 1);
    assert!(!controller.is_streaming());
}

#[test]
fn second_send_while_streaming_mutates_nothing() {
    let mut controller = controller();
    let mut host = HostSpy::default();
    controller
        .send_message("first", Instant::now(), &mut host)
        .expect("turn should start");
    let before = controller.clone();

    let result = controller.send_message("second", Instant::now(), &mut host);

    assert_eq!(result, Err(ControllerError::TurnInProgress));
    assert_eq!(controller, before);
    assert_eq!(host.requests.len(), 1);
}

#[test]
fn slash_commands_are_guarded_while_streaming() {
    let mut controller = controller();
    let mut host = HostSpy::default();
    controller
        .send_message("first", Instant::now(), &mut host)
        .expect("turn should start");

    let result = controller.send_message("/new", Instant::now(), &mut host);

    assert_eq!(result, Err(ControllerError::TurnInProgress));
    assert!(controller.is_streaming());
}

#[test]
fn unavailable_backend_rejects_without_state_change() {
    let mut controller = controller();
    let mut host = HostSpy::default();
    controller.set_backend_status(
        BackendStatus::Unavailable {
            reason: "claude not found".to_string(),
        },
        &mut host,
    );

    let result = controller.send_message("hi", Instant::now(), &mut host);

    assert_eq!(
        result,
        Err(ControllerError::BackendUnavailable("claude not found".to_string()))
    );
    assert_eq!(controller.session().id, None);
    assert!(controller.session().messages.is_empty());
    assert!(host.requests.is_empty());
}

#[test]
fn stop_generation_cancels_and_keeps_partial_text() {
    let mut controller = controller();
    let mut host = HostSpy::default();
    controller
        .send_message("long answer please", Instant::now(), &mut host)
        .expect("turn should start");
    controller.on_protocol_unit(1, ProtocolUnit::text("partial"), &mut host);

    controller.stop_generation(&mut host);

    let session_id = controller.session().id.clone().expect("session id");
    assert_eq!(host.cancelled, vec![(1, session_id)]);
    assert_eq!(controller.phase(), Phase::Ready);
    assert_eq!(controller.session().messages[1].content, "partial");
    assert_eq!(host.events.last(), Some(&TurnEvent::TurnStopped));

    controller.on_protocol_unit(1, ProtocolUnit::text(" late"), &mut host);
    controller.on_invocation_ended(1, Ok(()), &mut host);
    assert_eq!(controller.session().messages.len(), 2);

    controller.stop_generation(&mut host);
    assert_eq!(host.cancelled.len(), 1);
}

#[test]
fn invocation_error_finalizes_partial_text_and_keeps_session_usable() {
    let mut controller = controller();
    let mut host = HostSpy::default();
    controller
        .send_message("hi", Instant::now(), &mut host)
        .expect("turn should start");
    controller.on_protocol_unit(1, ProtocolUnit::text("half"), &mut host);

    controller.on_invocation_ended(1, Err("pipe closed".to_string()), &mut host);

    assert_eq!(
        host.events.last(),
        Some(&TurnEvent::TurnErrored {
            error: "pipe closed".to_string(),
        })
    );
    assert_eq!(controller.session().messages[1].content, "half");
    assert_eq!(controller.phase(), Phase::Ready);
    controller
        .send_message("retry", Instant::now(), &mut host)
        .expect("session remains usable");
}

#[test]
fn channel_closing_without_completion_is_an_error() {
    let mut controller = controller();
    let mut host = HostSpy::default();
    controller
        .send_message("hi", Instant::now(), &mut host)
        .expect("turn should start");

    controller.on_invocation_ended(1, Ok(()), &mut host);

    assert_matches!(host.events.last(), Some(TurnEvent::TurnErrored { .. }));
    assert!(!controller.is_streaming());
}

#[test]
fn completed_turn_ignores_channel_end() {
    let mut controller = controller();
    let mut host = HostSpy::default();
    controller
        .send_message("hi", Instant::now(), &mut host)
        .expect("turn should start");
    controller.on_protocol_unit(1, ProtocolUnit::done(None), &mut host);
    host.take_events();

    controller.on_invocation_ended(1, Ok(()), &mut host);

    assert!(host.events.is_empty());
}

#[test]
fn failed_start_reports_error_and_returns_to_ready() {
    let mut controller = controller();
    let mut host = HostSpy {
        fail_next_start: Some("spawn failed".to_string()),
        ..HostSpy::default()
    };

    let result = controller.send_message("hi", Instant::now(), &mut host);

    assert_eq!(result, Err(ControllerError::Invocation("spawn failed".to_string())));
    assert_eq!(controller.phase(), Phase::Ready);
    assert!(host.errors().is_empty());
    assert_matches!(host.events.last(), Some(TurnEvent::TurnErrored { .. }));
}

#[test]
fn malformed_units_are_dropped_and_stream_continues() {
    let mut controller = controller();
    let mut host = HostSpy::default();
    controller
        .send_message("hi", Instant::now(), &mut host)
        .expect("turn should start");

    controller.on_protocol_unit(
        1,
        ProtocolUnit::tool(chat_protocol::ToolActivity::new("t1", "Bash", "bogus")),
        &mut host,
    );
    controller.on_protocol_unit(1, ProtocolUnit::text("still here"), &mut host);
    controller.on_protocol_unit(1, ProtocolUnit::done(None), &mut host);

    assert_eq!(controller.session().messages[1].content, "still here");
}

#[test]
fn new_chat_persists_then_clears_everything() {
    let mut controller = restricted_controller(&["Read"]);
    let mut host = HostSpy::default();
    controller
        .send_message("hi", Instant::now(), &mut host)
        .expect("turn should start");
    controller.on_protocol_unit(1, ProtocolUnit::conversation("conv-1"), &mut host);
    controller.on_protocol_unit(1, ProtocolUnit::done(None), &mut host);
    let saved_before = host.saved_sessions.len();

    controller.new_chat(&mut host);

    assert_eq!(host.saved_sessions.len(), saved_before + 1);
    let session = controller.session();
    assert_eq!(session.id, None);
    assert_eq!(session.conversation_id, None);
    assert!(session.messages.is_empty());
    assert!(!session.expired);
    assert!(session.tool_policy.session_approved.is_empty());
    assert_eq!(session.tool_policy.allowed, vec!["Read".to_string()]);
    assert_eq!(controller.next_deadline(), None);
    assert_eq!(host.events.last(), Some(&TurnEvent::SessionReset));
}

#[test]
fn new_chat_on_empty_session_saves_nothing() {
    let mut controller = controller();
    let mut host = HostSpy::default();

    controller.new_chat(&mut host);

    assert!(host.saved_sessions.is_empty());
}

#[test]
fn unknown_slash_command_names_the_token() {
    let mut controller = controller();
    let mut host = HostSpy::default();

    let result = controller.send_message("/frobnicate now", Instant::now(), &mut host);

    assert_eq!(
        result,
        Err(ControllerError::UnknownCommand("/frobnicate".to_string()))
    );
    assert_eq!(host.errors(), vec!["Unknown command: /frobnicate"]);
    assert!(host.requests.is_empty());
}

#[test]
fn model_command_switches_and_rejects_unknown_names() {
    let mut controller = controller();
    let mut host = HostSpy::default();

    controller
        .send_message("/model Opus", Instant::now(), &mut host)
        .expect("alias resolves");
    assert_eq!(controller.model(), "claude-opus-4-6");

    let result = controller.send_message("/model gpt-9", Instant::now(), &mut host);
    assert_matches!(result, Err(ControllerError::UnknownModel { .. }));
    assert_eq!(controller.model(), "claude-opus-4-6");

    controller
        .send_message("hello", Instant::now(), &mut host)
        .expect("turn should start");
    assert_eq!(host.last_request().model, "claude-opus-4-6");
    assert_eq!(controller.session().messages[0].model, "claude-opus-4-6");
}

#[test]
fn dir_command_validates_and_persists_settings() {
    let mut controller = controller();
    let mut host = HostSpy {
        valid_folders: vec![PathBuf::from("/work/app")],
        ..HostSpy::default()
    };

    let result = controller.send_message("/dir /missing", Instant::now(), &mut host);
    assert_eq!(
        result,
        Err(ControllerError::InvalidFolder("/missing".to_string()))
    );
    assert!(host.saved_settings.is_empty());
    assert_eq!(controller.session().working_directory, None);

    controller
        .send_message("/project /work/app", Instant::now(), &mut host)
        .expect("valid folder");
    assert_eq!(
        controller.session().working_directory,
        Some(PathBuf::from("/work/app"))
    );
    assert_eq!(
        host.saved_settings.last().and_then(|s| s.working_directory.clone()),
        Some("/work/app".to_string())
    );

    controller
        .send_message("hi", Instant::now(), &mut host)
        .expect("turn should start");
    assert_eq!(
        host.last_request().working_directory,
        Some(PathBuf::from("/work/app"))
    );
}

#[test]
fn settings_and_help_commands_only_emit_events() {
    let mut controller = controller();
    let mut host = HostSpy::default();

    controller
        .send_message("/settings", Instant::now(), &mut host)
        .expect("settings");
    controller
        .send_message("/help", Instant::now(), &mut host)
        .expect("help");

    assert_matches!(host.events[0], TurnEvent::SettingsRequested(ref s) if s.unrestricted);
    assert_matches!(host.events[1], TurnEvent::Notice(ref text) if text.contains("/model"));
    assert!(host.requests.is_empty());
    assert_eq!(controller.session().id, None);
}

#[test]
fn apply_settings_updates_policy_and_clears_blank_directory() {
    let mut controller = controller();
    let mut host = HostSpy::default();

    controller
        .apply_settings(
            Settings {
                working_directory: Some("   ".to_string()),
                allowed_tools: vec!["Read".to_string(), "Grep".to_string()],
                unrestricted: false,
            },
            &mut host,
        )
        .expect("settings apply");

    assert_eq!(controller.session().working_directory, None);
    controller
        .send_message("hi", Instant::now(), &mut host)
        .expect("turn should start");
    assert_eq!(
        host.last_request().allowed_tools,
        Some(vec!["Read".to_string(), "Grep".to_string()])
    );
    assert_eq!(host.saved_settings.len(), 1);
    assert!(!host.saved_settings[0].unrestricted);
}

#[test]
fn open_session_replaces_state_and_saves_outgoing() {
    let mut controller = controller();
    let mut host = HostSpy::default();
    controller
        .send_message("current", Instant::now(), &mut host)
        .expect("turn should start");
    controller.on_protocol_unit(1, ProtocolUnit::conversation("conv-current"), &mut host);
    controller.on_protocol_unit(1, ProtocolUnit::done(None), &mut host);
    let saves = host.saved_sessions.len();

    let record = ChatSession {
        id: "stored-1".to_string(),
        title: "older".to_string(),
        messages: vec![
            ChatMessage::user("older", "2026-01-01T00:00:00Z", "claude-haiku-4-5-20251001"),
            ChatMessage::assistant("reply", "2026-01-01T00:00:01Z", "claude-haiku-4-5-20251001"),
        ],
        created_at: "2026-01-01T00:00:00Z".to_string(),
        model: "claude-haiku-4-5-20251001".to_string(),
    };
    controller
        .open_session(record, Instant::now(), &mut host)
        .expect("open");

    assert_eq!(host.saved_sessions.len(), saves + 1);
    assert_eq!(controller.session().id.as_deref(), Some("stored-1"));
    assert_eq!(controller.session().conversation_id, None);
    assert_eq!(controller.session().messages.len(), 2);
    assert_eq!(controller.model(), "claude-haiku-4-5-20251001");
    assert!(controller.next_deadline().is_some());
    assert_matches!(host.events.last(), Some(TurnEvent::SessionLoaded { .. }));
}

#[test]
fn open_session_is_rejected_while_streaming() {
    let mut controller = controller();
    let mut host = HostSpy::default();
    controller
        .send_message("current", Instant::now(), &mut host)
        .expect("turn should start");

    let record = ChatSession {
        id: "other".to_string(),
        title: "t".to_string(),
        messages: Vec::new(),
        created_at: String::new(),
        model: String::new(),
    };

    assert_eq!(
        controller.open_session(record, Instant::now(), &mut host),
        Err(ControllerError::TurnInProgress)
    );
}

#[test]
fn deleting_current_session_resets_without_resaving() {
    let mut controller = controller();
    let mut host = HostSpy::default();
    controller
        .send_message("hi", Instant::now(), &mut host)
        .expect("turn should start");
    controller.on_protocol_unit(1, ProtocolUnit::done(None), &mut host);
    let id = controller.session().id.clone().expect("id");
    let saves = host.saved_sessions.len();

    controller.delete_session(&id, &mut host).expect("delete");

    assert_eq!(host.deleted_sessions, vec![id]);
    assert_eq!(host.saved_sessions.len(), saves);
    assert_eq!(controller.session().id, None);
}

#[test]
fn deleting_another_session_keeps_current() {
    let mut controller = controller();
    let mut host = HostSpy::default();
    controller
        .send_message("hi", Instant::now(), &mut host)
        .expect("turn should start");

    controller.delete_session("someone-else", &mut host).expect("delete");

    assert!(controller.session().id.is_some());
    assert!(controller.is_streaming());
}

#[test]
fn persistence_failure_is_reported_but_not_fatal() {
    let mut controller = controller();
    let mut host = HostSpy {
        fail_saves: Some("disk full".to_string()),
        ..HostSpy::default()
    };
    controller
        .send_message("hi", Instant::now(), &mut host)
        .expect("turn should start");

    controller.on_protocol_unit(1, ProtocolUnit::done(None), &mut host);

    assert_eq!(host.errors(), vec!["Failed to save chat: disk full"]);
    assert_eq!(controller.phase(), Phase::Ready);
}
