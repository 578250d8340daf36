//! Line-oriented terminal front-end.

use std::io::Write;

use chat_protocol::{ChatMessage, ChatSession, Role, Settings, UsageInfo};
use chatgate::{
    PendingApproval, PendingQuestions, Phase, SessionController, ToolKind, TurnEvent, KNOWN_TOOLS,
};
use serde_json::Value;

use crate::runtime::{Flow, Frontend, RuntimeContext};

const REPLY_PREFIX: &str = "assistant> ";
const USER_PREFIX: &str = "you> ";
const TOOL_SUMMARY_MAX_CHARS: usize = 80;

pub const SHORTCUT_HELP: &str = "Shortcuts:
  :stop              Stop the current response
  :new               Start a new chat
  :history           List saved chats
  :open <n>          Open a chat from the last :history listing
  :delete <n>        Delete a chat from the last :history listing
  :allow <Tool,...>  Set the tools allowed without approval
  :unrestricted on|off
  :quit              Exit";

pub struct TerminalFrontend<W: Write> {
    out: W,
    mid_line: bool,
    in_reply: bool,
    listed: Vec<ChatSession>,
}

impl<W: Write> TerminalFrontend<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            mid_line: false,
            in_reply: false,
            listed: Vec::new(),
        }
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn banner(&mut self, backend_name: &str, model: &str) {
        self.line(&format!("chatgate · {backend_name} · {model}"));
        self.line("Type a message, /help for commands, or :help for shortcuts.");
    }

    fn line(&mut self, text: &str) {
        self.break_line();
        let _ = writeln!(self.out, "{text}");
        let _ = self.out.flush();
    }

    fn break_line(&mut self) {
        if self.mid_line {
            let _ = writeln!(self.out);
            self.mid_line = false;
        }
    }

    fn error(&mut self, message: &str) {
        self.in_reply = false;
        self.line(&format!("error: {message}"));
    }

    fn reply_text(&mut self, text: &str) {
        if !self.in_reply {
            self.break_line();
            let _ = write!(self.out, "{REPLY_PREFIX}");
            self.in_reply = true;
        }
        let _ = write!(self.out, "{text}");
        let _ = self.out.flush();
        self.mid_line = !text.ends_with('\n');
    }

    fn approval_prompt(&mut self, pending: &PendingApproval) {
        self.in_reply = false;
        let restated = ToolKind::classify(&pending.tool_name, &pending.input).restate();
        self.line(&format!("{} wants permission to run:", pending.tool_name));
        for line in restated.lines() {
            self.line(&format!("  {line}"));
        }
        self.line("Approve? [y/n]");
    }

    fn question_prompt(&mut self, pending: &PendingQuestions, index: usize) {
        let Some(question) = pending.questions().get(index) else {
            return;
        };

        let total = pending.questions().len();
        let header = question
            .header
            .as_deref()
            .map_or_else(String::new, |header| format!("[{header}] "));
        self.line(&format!(
            "Question {}/{total}: {header}{}",
            index + 1,
            question.question
        ));
        for (number, option) in question.options.iter().enumerate() {
            match &option.description {
                Some(description) => {
                    self.line(&format!("  {}. {} - {description}", number + 1, option.label));
                }
                None => self.line(&format!("  {}. {}", number + 1, option.label)),
            }
        }
        if question.options.is_empty() {
            self.line("Type your answer.");
        } else {
            self.line("Type a number or your own answer.");
        }
    }

    fn settings_panel(&mut self, settings: &Settings) {
        let folder = settings.working_directory.as_deref().unwrap_or("not set");
        let allowed = if settings.allowed_tools.is_empty() {
            String::from("none")
        } else {
            settings.allowed_tools.join(", ")
        };
        self.line("Settings");
        self.line(&format!("  Project folder: {folder}  (/dir <path>)"));
        self.line(&format!(
            "  Unrestricted:   {}  (:unrestricted on|off)",
            if settings.unrestricted { "on" } else { "off" }
        ));
        self.line(&format!("  Allowed tools:  {allowed}  (:allow <Tool,...>)"));
        self.line(&format!("  Known tools:    {}", KNOWN_TOOLS.join(", ")));
    }

    fn transcript(&mut self, messages: &[ChatMessage]) {
        for message in messages {
            let prefix = match message.role {
                Role::User => USER_PREFIX,
                Role::Assistant => REPLY_PREFIX,
            };
            self.line(&format!("{prefix}{}", message.content.trim_end()));
        }
    }

    fn list_history(&mut self, ctx: &RuntimeContext<'_>) {
        match ctx.list_history() {
            Ok(sessions) => {
                if sessions.is_empty() {
                    self.line("No saved chats.");
                }
                let current = ctx.controller().session().id.as_deref();
                for (number, session) in sessions.iter().enumerate() {
                    let marker = if current == Some(session.id.as_str()) { "*" } else { " " };
                    self.line(&format!(
                        "{marker}{}. {} ({}, {} messages)",
                        number + 1,
                        session.title,
                        session.created_at,
                        session.messages.len()
                    ));
                }
                self.listed = sessions;
            }
            Err(error) => self.error(&format!("Failed to list chats: {error}")),
        }
    }

    fn listed_session(&mut self, arg: &str) -> Option<ChatSession> {
        if self.listed.is_empty() {
            self.error("Run :history first");
            return None;
        }

        let found = arg
            .parse::<usize>()
            .ok()
            .and_then(|number| number.checked_sub(1))
            .and_then(|index| self.listed.get(index))
            .cloned();
        if found.is_none() {
            self.error(&format!("No chat numbered '{arg}'"));
        }
        found
    }

    fn allow_tools(&mut self, arg: &str, ctx: &mut RuntimeContext<'_>) {
        let mut tools = Vec::new();
        for name in arg
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|name| !name.is_empty())
        {
            match KNOWN_TOOLS
                .iter()
                .find(|known| known.eq_ignore_ascii_case(name))
            {
                Some(known) if !tools.iter().any(|tool: &String| tool.as_str() == *known) => {
                    tools.push((*known).to_string());
                }
                Some(_) => {}
                None => {
                    self.error(&format!(
                        "Unknown tool '{name}'. Known tools: {}",
                        KNOWN_TOOLS.join(", ")
                    ));
                    return;
                }
            }
        }

        let mut update = ctx.controller().settings();
        update.allowed_tools = tools;
        if ctx.apply_settings(update).is_ok() {
            let settings = ctx.controller().settings();
            self.settings_panel(&settings);
        }
    }

    fn set_unrestricted(&mut self, arg: &str, ctx: &mut RuntimeContext<'_>) {
        let unrestricted = match arg.to_ascii_lowercase().as_str() {
            "on" => true,
            "off" => false,
            _ => {
                self.error("Usage: :unrestricted on|off");
                return;
            }
        };

        let mut update = ctx.controller().settings();
        update.unrestricted = unrestricted;
        if ctx.apply_settings(update).is_ok() {
            let settings = ctx.controller().settings();
            self.settings_panel(&settings);
        }
    }

    fn answer_question(&mut self, text: &str, ctx: &mut RuntimeContext<'_>) {
        let Some(pending) = ctx.controller().pending_questions() else {
            return;
        };
        let Some(index) = pending.next_unanswered() else {
            return;
        };
        let answer = pending
            .questions()
            .get(index)
            .and_then(|question| {
                text.parse::<usize>()
                    .ok()
                    .and_then(|number| number.checked_sub(1))
                    .and_then(|option| question.options.get(option))
            })
            .map_or_else(|| text.to_string(), |option| option.label.clone());

        if let Err(error) = ctx.set_answer(index, &answer) {
            self.error(&error.to_string());
            return;
        }

        if ctx.controller().can_submit_answers() {
            let _ = ctx.submit_answers();
            return;
        }

        if let Some(pending) = ctx.controller().pending_questions() {
            if let Some(next) = pending.next_unanswered() {
                self.question_prompt(pending, next);
            }
        }
    }

    /// Returns `None` for lines that are not a known shortcut.
    fn shortcut(&mut self, line: &str, ctx: &mut RuntimeContext<'_>) -> Option<Flow> {
        let body = line.strip_prefix(':')?;
        let (command, arg) = match body.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (body, ""),
        };

        match command.to_ascii_lowercase().as_str() {
            "quit" | "q" => return Some(Flow::Quit),
            "stop" => ctx.stop(),
            "new" => ctx.new_chat(),
            "history" => self.list_history(ctx),
            "open" => {
                if let Some(record) = self.listed_session(arg) {
                    let _ = ctx.open_session(record);
                }
            }
            "delete" => {
                if let Some(record) = self.listed_session(arg) {
                    if ctx.delete_session(&record.id).is_ok() {
                        self.listed.retain(|session| session.id != record.id);
                        self.line(&format!("Deleted \"{}\".", record.title));
                    }
                }
            }
            "allow" => self.allow_tools(arg, ctx),
            "unrestricted" => self.set_unrestricted(arg, ctx),
            "help" => self.line(SHORTCUT_HELP),
            _ => return None,
        }

        Some(Flow::Continue)
    }
}

impl<W: Write> Frontend for TerminalFrontend<W> {
    fn render(&mut self, event: &TurnEvent, controller: &SessionController) {
        match event {
            TurnEvent::TurnStarted {
                message,
                resumption,
                ..
            } => {
                self.in_reply = false;
                if *resumption {
                    let first = message.lines().next().unwrap_or_default();
                    self.line(&format!("» {first}"));
                }
            }
            TurnEvent::TextDelta(text) => self.reply_text(text),
            TurnEvent::ToolStarted {
                tool_name, input, ..
            } => {
                self.in_reply = false;
                self.line(&format!("[{tool_name}] {}", tool_summary(input)).trim_end());
            }
            TurnEvent::ToolFinished {
                tool_name,
                is_error,
                result,
                ..
            } => {
                self.in_reply = false;
                if *is_error {
                    let detail = result
                        .as_deref()
                        .and_then(|result| result.lines().next())
                        .unwrap_or("failed");
                    self.line(&format!("[{tool_name}] error: {detail}"));
                } else {
                    self.line(&format!("[{tool_name}] done"));
                }
            }
            TurnEvent::AwaitingApproval(pending) => self.approval_prompt(pending),
            TurnEvent::AwaitingAnswer(pending) => {
                self.in_reply = false;
                if let Some(index) = pending.next_unanswered() {
                    self.question_prompt(pending, index);
                }
            }
            TurnEvent::TurnCompleted { usage } => {
                self.in_reply = false;
                self.break_line();
                if let Some(usage) = usage {
                    self.line(&format_usage(usage));
                }
            }
            TurnEvent::TurnErrored { error } => self.error(error),
            TurnEvent::TurnStopped => {
                self.in_reply = false;
                self.line("(stopped)");
            }
            TurnEvent::InactivityWarning => self.line(
                "This chat will expire soon due to inactivity. Type anything to keep it open.",
            ),
            TurnEvent::SessionExpired => {
                self.in_reply = false;
                self.line("This chat has expired. Type :new to start a new chat.");
            }
            TurnEvent::SessionReset => {
                self.in_reply = false;
                self.line("Started a new chat.");
            }
            TurnEvent::SessionLoaded { messages, .. } => {
                self.line(&format!("Opened \"{}\".", controller.session().title()));
                self.transcript(messages);
            }
            TurnEvent::ConversationCleared => self.line("Conversation cleared."),
            TurnEvent::SettingsRequested(settings) => self.settings_panel(settings),
            TurnEvent::Notice(text) => self.line(text),
            TurnEvent::Error(text) => self.error(text),
        }
    }

    fn on_input(&mut self, line: &str, ctx: &mut RuntimeContext<'_>) -> Flow {
        if ctx.controller().warning_visible() {
            ctx.dismiss_warning();
        } else {
            ctx.on_activity();
        }

        let text = line.trim();
        if text.is_empty() {
            return Flow::Continue;
        }

        if let Some(flow) = self.shortcut(text, ctx) {
            return flow;
        }

        match ctx.controller().phase() {
            Phase::AwaitingApproval => match text.to_ascii_lowercase().as_str() {
                "y" | "yes" => {
                    let _ = ctx.approve();
                    return Flow::Continue;
                }
                "n" | "no" => {
                    let _ = ctx.deny();
                    return Flow::Continue;
                }
                _ => {}
            },
            Phase::AwaitingAnswer => {
                self.answer_question(text, ctx);
                return Flow::Continue;
            }
            _ => {}
        }

        let _ = ctx.send_message(text);
        Flow::Continue
    }
}

/// `1234` renders as `1.2k`.
#[must_use]
pub fn format_count(count: u64) -> String {
    if count < 1000 {
        count.to_string()
    } else {
        format!("{:.1}k", count as f64 / 1000.0)
    }
}

fn format_usage(usage: &UsageInfo) -> String {
    format!(
        "({} in · {} out)",
        format_count(usage.input_tokens),
        format_count(usage.output_tokens)
    )
}

fn tool_summary(input: &Value) -> String {
    let summary = ["file_path", "command", "pattern", "url", "query", "path"]
        .iter()
        .find_map(|key| input.get(key).and_then(Value::as_str))
        .unwrap_or_default();
    let first_line = summary.lines().next().unwrap_or_default();
    match first_line.char_indices().nth(TOOL_SUMMARY_MAX_CHARS) {
        Some((cutoff, _)) => format!("{}…", &first_line[..cutoff]),
        None => first_line.to_string(),
    }
}
