use std::time::{Duration, Instant};

use backend_mock::{Script, ScriptedBackend};
use chat_protocol::{ResumeDecision, Role, ToolActivity, UsageInfo};
use chatgate::{Phase, TurnEvent};
use chatgate_cli::runtime::{Flow, RuntimeEvent};
use history_store::HistoryStore;
use pretty_assertions::assert_eq;
use serde_json::json;

mod support;

use support::{Harness, RecordingFrontend};

#[test]
fn completed_turn_is_streamed_and_saved_to_history() {
    let mut harness = Harness::new(vec![Script::new()
        .conversation("conv-1")
        .tokens("Hello there, friend.")
        .done(Some(UsageInfo {
            input_tokens: 12,
            output_tokens: 4,
        }))]);
    let mut frontend = RecordingFrontend::default();

    harness
        .runtime
        .context(Instant::now())
        .send_message("hi")
        .expect("send should start a turn");
    assert!(harness.run_until_idle(&mut frontend));

    assert_eq!(frontend.reply_text(), "Hello there, friend.");
    assert!(frontend.events.contains(&TurnEvent::TurnCompleted {
        usage: Some(UsageInfo {
            input_tokens: 12,
            output_tokens: 4,
        }),
    }));

    let session_id = harness
        .runtime
        .controller()
        .session()
        .id
        .clone()
        .expect("session id assigned on first send");
    let saved = HistoryStore::new(harness.dir.path())
        .load(&session_id)
        .expect("completed turn is persisted");
    assert_eq!(saved.title, "hi");
    assert_eq!(
        saved
            .messages
            .iter()
            .map(|message| (message.role, message.content.as_str()))
            .collect::<Vec<_>>(),
        vec![(Role::User, "hi"), (Role::Assistant, "Hello there, friend.")]
    );
}

#[test]
fn approval_resumes_with_the_tool_allowed() {
    let mut harness = Harness::new(vec![
        Script::new()
            .conversation("conv-1")
            .tokens("Let me check. ")
            .tool(
                ToolActivity::new("t1", "Bash", "approval")
                    .with_input(json!({ "command": "ls" })),
            ),
        Script::new().tokens("Done.").done(None),
    ]);
    let mut frontend = RecordingFrontend::default();
    harness
        .runtime
        .context(Instant::now())
        .apply_settings(chat_protocol::Settings {
            working_directory: None,
            allowed_tools: vec!["Read".to_string()],
            unrestricted: false,
        })
        .expect("settings update");

    harness
        .runtime
        .context(Instant::now())
        .send_message("list files")
        .expect("send");
    assert!(harness.run_until(&mut frontend, |runtime| {
        runtime.controller().phase() == Phase::AwaitingApproval
    }));

    harness
        .runtime
        .context(Instant::now())
        .approve()
        .expect("approve resumes");
    assert!(harness.run_until_idle(&mut frontend));

    let requests = harness.backend.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].conversation_id.as_deref(), Some("conv-1"));
    assert_eq!(
        requests[1].allowed_tools,
        Some(vec!["Read".to_string(), "Bash".to_string()])
    );
    assert!(matches!(
        requests[1].resume,
        Some(ResumeDecision::Approved { ref tool_name, .. }) if tool_name == "Bash"
    ));
    assert!(requests[1].message.starts_with("APPROVED."));
    assert_eq!(frontend.reply_text(), "Let me check. Done.");
}

#[test]
fn stop_cancels_the_backend_and_keeps_partial_text() {
    let mut script = Script::new().conversation("conv-1").tokens("partial ");
    for _ in 0..200 {
        script = script.pause(Duration::from_millis(10));
    }
    let mut harness = Harness::new(vec![script.tokens("never").done(None)]);
    let mut frontend = RecordingFrontend::default();

    harness
        .runtime
        .context(Instant::now())
        .send_message("go")
        .expect("send");
    assert!(harness.run_until(&mut frontend, |runtime| {
        runtime.controller().accumulated_text() == Some("partial ")
    }));

    harness.runtime.context(Instant::now()).stop();
    harness.runtime.shutdown(&mut frontend);

    let session_id = harness
        .runtime
        .controller()
        .session()
        .id
        .clone()
        .expect("session id");
    assert_eq!(harness.backend.cancelled(), vec![session_id]);
    assert!(frontend.events.contains(&TurnEvent::TurnStopped));
    assert!(!frontend.reply_text().contains("never"));

    let messages = &harness.runtime.controller().session().messages;
    assert_eq!(messages.last().map(|message| message.content.as_str()), Some("partial "));
}

#[test]
fn backend_failure_surfaces_as_turn_error() {
    let mut harness = Harness::new(vec![Script::new().tokens("half").fail("model overloaded")]);
    let mut frontend = RecordingFrontend::default();

    harness
        .runtime
        .context(Instant::now())
        .send_message("hi")
        .expect("send");
    assert!(harness.run_until_idle(&mut frontend));

    assert!(frontend.events.contains(&TurnEvent::TurnErrored {
        error: "model overloaded".to_string(),
    }));
    assert!(!harness.runtime.controller().is_streaming());
}

#[test]
fn unavailable_backend_rejects_messages() {
    let mut harness = Harness::with_backend(ScriptedBackend::unavailable("claude not found"));
    let mut frontend = RecordingFrontend::default();

    harness.runtime.check_backend();
    let result = harness.runtime.context(Instant::now()).send_message("hi");
    harness.runtime.shutdown(&mut frontend);

    assert!(result.is_err());
    assert!(harness.backend.requests().is_empty());
    assert_eq!(
        frontend.errors(),
        vec![
            "Backend unavailable: claude not found".to_string(),
            "Backend unavailable: claude not found".to_string(),
        ]
    );
}

#[test]
fn input_events_are_routed_through_the_frontend() {
    let mut harness = Harness::new(vec![Script::new().tokens("pong").done(None)]);
    let mut frontend = RecordingFrontend::default();
    let sender = harness.runtime.sender();

    sender
        .send(RuntimeEvent::Input("ping".to_string()))
        .expect("runtime is listening");
    assert!(harness.run_until(&mut frontend, |runtime| {
        runtime.controller().session().messages.len() == 2
    }));
    assert_eq!(frontend.reply_text(), "pong");

    sender
        .send(RuntimeEvent::InputClosed)
        .expect("runtime is listening");
    let mut flow = Flow::Continue;
    let deadline = Instant::now() + Duration::from_secs(5);
    while flow == Flow::Continue && Instant::now() < deadline {
        flow = harness.runtime.step(&mut frontend, Duration::from_millis(10));
    }
    assert_eq!(flow, Flow::Quit);
}

#[test]
fn units_from_a_stopped_invocation_are_ignored() {
    let mut harness = Harness::new(vec![Script::new().tokens("late").done(None)]);
    let mut frontend = RecordingFrontend::default();

    harness
        .runtime
        .context(Instant::now())
        .send_message("hi")
        .expect("send");
    harness.runtime.context(Instant::now()).stop();

    let flow = harness.runtime.handle(
        RuntimeEvent::Unit {
            invocation_id: 1,
            unit: chat_protocol::ProtocolUnit::text("stale"),
        },
        &mut frontend,
    );
    assert_eq!(flow, Flow::Continue);
    harness.runtime.shutdown(&mut frontend);

    assert!(!frontend.reply_text().contains("stale"));
    assert!(frontend.events.contains(&TurnEvent::TurnStopped));
}
