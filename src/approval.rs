//! Tool approval state machine.
//!
//! Interrupt phases (`approval`, `ask`) arrive only after the backend has
//! halted itself, so every resolution produces a [`Resumption`]: a
//! synthesized user message plus the structured decision behind it.

use chat_protocol::ResumeDecision;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::decoder::{ToolEvent, ToolPhase};
use crate::tool_kind::{truncate_chars, ToolKind};

/// Tool results longer than this are cut before reaching the presenter.
pub const RESULT_PREVIEW_MAX_CHARS: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalState {
    Idle,
    ToolRunning,
    AwaitingApproval,
    AwaitingAnswer,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    #[error("No tool approval is pending")]
    NoPendingApproval,
    #[error("No question is pending")]
    NoPendingQuestions,
    #[error("Question {index} does not exist ({total} questions pending)")]
    QuestionOutOfRange { index: usize, total: usize },
    #[error("Answer for question {index} is empty")]
    EmptyAnswer { index: usize },
    #[error("Answer every question before submitting ({answered} of {total} answered)")]
    IncompleteAnswers { answered: usize, total: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question: String,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(default)]
    pub multi_select: bool,
}

#[derive(Debug, Deserialize)]
struct AskPayload {
    questions: Vec<Question>,
}

/// Reads the structured questions out of an `ask` interrupt input.
#[must_use]
pub fn parse_questions(input: &Value) -> Vec<Question> {
    AskPayload::deserialize(input)
        .map(|payload| payload.questions)
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingApproval {
    pub tool_id: String,
    pub tool_name: String,
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingQuestions {
    pub tool_id: String,
    questions: Vec<Question>,
    answers: Vec<Option<String>>,
}

impl PendingQuestions {
    fn new(tool_id: String, questions: Vec<Question>) -> Self {
        let answers = vec![None; questions.len()];
        Self {
            tool_id,
            questions,
            answers,
        }
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn answer(&self, index: usize) -> Option<&str> {
        self.answers.get(index).and_then(|answer| answer.as_deref())
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|answer| answer.is_some()).count()
    }

    /// Index of the first question still without an answer.
    #[must_use]
    pub fn next_unanswered(&self) -> Option<usize> {
        self.answers.iter().position(Option::is_none)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.answers.iter().all(Option::is_some)
    }

    fn set(&mut self, index: usize, answer: &str) -> Result<(), ApprovalError> {
        let total = self.answers.len();
        let slot = self
            .answers
            .get_mut(index)
            .ok_or(ApprovalError::QuestionOutOfRange { index, total })?;

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(ApprovalError::EmptyAnswer { index });
        }

        *slot = Some(answer.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Interrupt {
    Approval(PendingApproval),
    Questions(PendingQuestions),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RunningTool {
    tool_id: String,
    tool_name: String,
}

/// What applying one tool event did to the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolTransition {
    Started {
        tool_id: String,
        tool_name: String,
        input: Value,
    },
    Finished {
        tool_id: String,
        tool_name: String,
        is_error: bool,
        result: Option<String>,
    },
    AwaitingApproval(PendingApproval),
    AwaitingAnswer(PendingQuestions),
    Ignored,
}

/// Resolution of an interrupt, ready to be sent as a new user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Resumption {
    pub message: String,
    pub decision: ResumeDecision,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ToolApprovalMachine {
    running: Vec<RunningTool>,
    interrupt: Option<Interrupt>,
}

impl ToolApprovalMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> ApprovalState {
        match (&self.interrupt, self.running.is_empty()) {
            (Some(Interrupt::Approval(_)), _) => ApprovalState::AwaitingApproval,
            (Some(Interrupt::Questions(_)), _) => ApprovalState::AwaitingAnswer,
            (None, false) => ApprovalState::ToolRunning,
            (None, true) => ApprovalState::Idle,
        }
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_some()
    }

    #[must_use]
    pub fn pending_approval(&self) -> Option<&PendingApproval> {
        match &self.interrupt {
            Some(Interrupt::Approval(pending)) => Some(pending),
            _ => None,
        }
    }

    #[must_use]
    pub fn pending_questions(&self) -> Option<&PendingQuestions> {
        match &self.interrupt {
            Some(Interrupt::Questions(pending)) => Some(pending),
            _ => None,
        }
    }

    pub fn apply(&mut self, event: ToolEvent) -> ToolTransition {
        if self.interrupt.is_some() {
            return ToolTransition::Ignored;
        }

        match event.phase {
            ToolPhase::Start => {
                self.running.push(RunningTool {
                    tool_id: event.tool_id.clone(),
                    tool_name: event.tool_name.clone(),
                });
                ToolTransition::Started {
                    tool_id: event.tool_id,
                    tool_name: event.tool_name,
                    input: event.input,
                }
            }
            ToolPhase::Result => {
                let Some(index) = self
                    .running
                    .iter()
                    .position(|tool| tool.tool_id == event.tool_id)
                else {
                    return ToolTransition::Ignored;
                };

                let running = self.running.remove(index);
                ToolTransition::Finished {
                    tool_id: running.tool_id,
                    tool_name: running.tool_name,
                    is_error: event.is_error,
                    result: event
                        .result
                        .map(|body| truncate_result(&body, RESULT_PREVIEW_MAX_CHARS)),
                }
            }
            ToolPhase::Approval => {
                self.running.clear();
                let pending = PendingApproval {
                    tool_id: event.tool_id,
                    tool_name: event.tool_name,
                    input: event.input,
                };
                self.interrupt = Some(Interrupt::Approval(pending.clone()));
                ToolTransition::AwaitingApproval(pending)
            }
            ToolPhase::Ask => {
                let questions = parse_questions(&event.input);
                if questions.is_empty() {
                    return ToolTransition::Ignored;
                }

                self.running.clear();
                let pending = PendingQuestions::new(event.tool_id, questions);
                self.interrupt = Some(Interrupt::Questions(pending.clone()));
                ToolTransition::AwaitingAnswer(pending)
            }
        }
    }

    /// Resolves a pending approval by re-issuing the exact tool call.
    pub fn approve(&mut self) -> Result<Resumption, ApprovalError> {
        let pending = self.take_approval()?;
        let details = ToolKind::classify(&pending.tool_name, &pending.input).restate();

        Ok(Resumption {
            message: format!("APPROVED. {details}"),
            decision: ResumeDecision::Approved {
                tool_id: pending.tool_id,
                tool_name: pending.tool_name,
                input: pending.input,
            },
        })
    }

    /// Resolves a pending approval by steering the backend away from the tool.
    pub fn deny(&mut self) -> Result<Resumption, ApprovalError> {
        let pending = self.take_approval()?;

        Ok(Resumption {
            message: format!(
                "DENIED: do NOT use {}. Find another way to complete the task without using that tool.",
                pending.tool_name
            ),
            decision: ResumeDecision::Denied {
                tool_id: pending.tool_id,
                tool_name: pending.tool_name,
            },
        })
    }

    pub fn set_answer(&mut self, index: usize, answer: &str) -> Result<(), ApprovalError> {
        match &mut self.interrupt {
            Some(Interrupt::Questions(pending)) => pending.set(index, answer),
            _ => Err(ApprovalError::NoPendingQuestions),
        }
    }

    #[must_use]
    pub fn can_submit_answers(&self) -> bool {
        self.pending_questions()
            .is_some_and(PendingQuestions::is_complete)
    }

    /// Formats every answer as one resumption message, in question order.
    pub fn submit_answers(&mut self) -> Result<Resumption, ApprovalError> {
        let pending = self
            .pending_questions()
            .ok_or(ApprovalError::NoPendingQuestions)?;
        if !pending.is_complete() {
            return Err(ApprovalError::IncompleteAnswers {
                answered: pending.answered_count(),
                total: pending.questions.len(),
            });
        }

        let Some(Interrupt::Questions(pending)) = self.interrupt.take() else {
            return Err(ApprovalError::NoPendingQuestions);
        };

        let answers: Vec<(String, String)> = pending
            .questions
            .into_iter()
            .zip(pending.answers)
            .map(|(question, answer)| (question.question, answer.unwrap_or_default()))
            .collect();

        let lines: Vec<String> = answers
            .iter()
            .map(|(question, answer)| format!("\"{question}\" -> {answer}"))
            .collect();
        let message = match lines.as_slice() {
            [single] => format!("My answer: {single}"),
            _ => format!("My answers:\n{}", lines.join("\n")),
        };

        Ok(Resumption {
            message,
            decision: ResumeDecision::Answered { answers },
        })
    }

    /// Forgets running tools when the turn that reported them ends.
    pub fn end_turn(&mut self) {
        self.running.clear();
    }

    pub fn reset(&mut self) {
        self.running.clear();
        self.interrupt = None;
    }

    fn take_approval(&mut self) -> Result<PendingApproval, ApprovalError> {
        match self.interrupt.take() {
            Some(Interrupt::Approval(pending)) => Ok(pending),
            other => {
                self.interrupt = other;
                Err(ApprovalError::NoPendingApproval)
            }
        }
    }
}

fn truncate_result(body: &str, max_chars: usize) -> String {
    let truncated = truncate_chars(body, max_chars);
    if truncated.len() == body.len() {
        return truncated;
    }

    format!("{truncated}\n[truncated]")
}
