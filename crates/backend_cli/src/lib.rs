//! Claude Code CLI-backed implementation of the `chat_protocol` backend contract.
//!
//! Each invocation spawns the CLI in stream-JSON mode and translates its
//! NDJSON output into protocol units. Tool policy is enforced here: a tool
//! call outside the allowed set halts the process before the tool runs.

use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use chat_protocol::{
    Backend, BackendInitError, BackendProfile, CancelSignal, InvocationRequest, ProtocolUnit,
};
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

mod registry;
mod translate;

pub use registry::ProcessRegistry;
pub use translate::{LineOutcome, StreamTranslator, ASK_USER_TOOL};

/// Stable backend identifier used for explicit startup selection.
pub const CLI_BACKEND_ID: &str = "claude-cli";
pub const DEFAULT_CLI_PROGRAM: &str = "claude";
pub const INSTALL_HINT: &str = "Install it with: npm install -g @anthropic-ai/claude-code";

const DEFAULT_VERSION_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(3);

/// Runtime configuration for the CLI backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliBackendConfig {
    pub program: PathBuf,
    pub version_timeout: Duration,
    pub terminate_grace: Duration,
}

impl CliBackendConfig {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            version_timeout: DEFAULT_VERSION_TIMEOUT,
            terminate_grace: DEFAULT_TERMINATE_GRACE,
        }
    }

    #[must_use]
    pub fn with_version_timeout(mut self, timeout: Duration) -> Self {
        self.version_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }
}

impl Default for CliBackendConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CLI_PROGRAM)
    }
}

#[derive(Debug)]
pub struct ClaudeCliBackend {
    config: CliBackendConfig,
    registry: ProcessRegistry,
}

impl ClaudeCliBackend {
    pub fn new(config: CliBackendConfig) -> Result<Self, BackendInitError> {
        if config.program.as_os_str().is_empty() {
            return Err(BackendInitError::new("CLI program path must not be empty"));
        }

        Ok(Self {
            config,
            registry: ProcessRegistry::default(),
        })
    }

    pub fn config(&self) -> &CliBackendConfig {
        &self.config
    }

    fn program_label(&self) -> String {
        self.config.program.display().to_string()
    }
}

/// Command-line arguments for one invocation, in the order the CLI expects.
#[must_use]
pub fn invocation_args(request: &InvocationRequest) -> Vec<String> {
    let mut args: Vec<String> = [
        "--print",
        "--verbose",
        "--output-format",
        "stream-json",
        "--include-partial-messages",
        // Approval is enforced by halting the process at tool boundaries.
        "--dangerously-skip-permissions",
    ]
    .iter()
    .map(ToString::to_string)
    .collect();

    if let Some(conversation_id) = &request.conversation_id {
        args.push("--resume".to_string());
        args.push(conversation_id.clone());
    }

    if !request.model.trim().is_empty() {
        args.push("--model".to_string());
        args.push(request.model.clone());
    }

    args.push(request.message.clone());
    args
}

impl Backend for ClaudeCliBackend {
    fn profile(&self) -> BackendProfile {
        BackendProfile {
            backend_id: CLI_BACKEND_ID.to_string(),
            display_name: "Claude Code CLI".to_string(),
        }
    }

    fn check_available(&self) -> Result<String, BackendInitError> {
        let unavailable = |detail: String| {
            BackendInitError::new(format!(
                "{} is not available ({detail}). {INSTALL_HINT}",
                self.program_label()
            ))
        };

        let mut child = Command::new(&self.config.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|error| unavailable(error.to_string()))?;

        let status = match child.wait_timeout(self.config.version_timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(unavailable("version check timed out".to_string()));
            }
            Err(error) => {
                let _ = child.kill();
                return Err(unavailable(error.to_string()));
            }
        };

        let mut stdout = String::new();
        if let Some(mut pipe) = child.stdout.take() {
            let _ = pipe.read_to_string(&mut stdout);
        }

        if !status.success() {
            return Err(unavailable(format!("exit status {status}")));
        }

        Ok(stdout.trim().to_string())
    }

    fn invoke(
        &self,
        request: InvocationRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(ProtocolUnit),
    ) -> Result<(), String> {
        let mut command = Command::new(&self.config.program);
        command
            .args(invocation_args(&request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &request.working_directory {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|error| format!("Failed to launch {}: {error}", self.program_label()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| "CLI stdout was not captured".to_string())?;
        let stderr = child.stderr.take();
        let stderr_reader = thread::Builder::new()
            .name("chatgate-cli-stderr".to_string())
            .spawn(move || {
                let mut output = String::new();
                if let Some(mut stderr) = stderr {
                    let _ = stderr.read_to_string(&mut output);
                }
                output
            })
            .map_err(|error| format!("Failed to spawn stderr reader: {error}"))?;

        let process_id = request.session_id.clone();
        let child = self.registry.register(&process_id, child);
        info!(process_id = %process_id, model = %request.model, "CLI invocation started");

        let mut translator = StreamTranslator::new(request.allowed_tools.clone());
        let mut terminate_requested: Option<Instant> = None;
        let mut interrupted = false;

        for line in BufReader::new(stdout).lines() {
            if cancel.load(Ordering::SeqCst) {
                break;
            }

            let line = match line {
                Ok(line) => line,
                Err(error) => {
                    warn!(process_id = %process_id, error = %error, "failed reading CLI output");
                    break;
                }
            };

            let outcome = translator.translate_line(&line);
            for unit in outcome.units {
                emit(unit);
            }

            if outcome.interrupted {
                debug!(process_id = %process_id, "halting CLI for user interaction");
                interrupted = true;
                break;
            }
        }

        if interrupted || cancel.load(Ordering::SeqCst) {
            if let Err(error) = registry::terminate(&child) {
                warn!(process_id = %process_id, error = %error, "failed to terminate CLI process");
            }
            terminate_requested = Some(Instant::now());
        }

        let status = registry::wait_for_exit(&child, terminate_requested, self.config.terminate_grace);
        self.registry.unregister(&process_id, &child);
        let stderr_output = stderr_reader.join().unwrap_or_default();
        let status = status?;

        if interrupted || cancel.load(Ordering::SeqCst) {
            return Ok(());
        }

        if !status.success() && !translator.text_seen() {
            let stderr_output = stderr_output.trim();
            return Err(if stderr_output.is_empty() {
                match status.code() {
                    Some(code) => format!("CLI exited with code {code}"),
                    None => format!("CLI exited with {status}"),
                }
            } else {
                stderr_output.to_string()
            });
        }

        emit(ProtocolUnit::done(translator.usage()));
        Ok(())
    }

    fn cancel(&self, process_id: &str) -> Result<(), String> {
        self.registry.stop(process_id)
    }
}
