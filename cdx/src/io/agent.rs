//! Agent runtime abstraction.
//!
//! The [`AgentRuntime`] trait decouples session orchestration from the actual
//! agent backend (currently `codex exec --json`). Tests use scripted runtimes
//! that yield predetermined events without spawning processes.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::events::ThreadEvent;
use crate::io::config::AgentConfig;
use crate::io::process::{StreamingChild, spawn_streaming};

/// Bytes of agent stderr kept for error reporting.
const STDERR_LIMIT_BYTES: usize = 100_000;

/// Model reasoning effort passed through to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
    Xhigh,
}

impl ReasoningEffort {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Xhigh => "xhigh",
        }
    }
}

impl fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for starting or resuming an agent session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    /// Working directory for the agent process.
    pub workdir: PathBuf,
    /// Effective prompt (instructions already prepended).
    pub prompt: String,
    /// Resume this session instead of starting a new one.
    pub resume_session_id: Option<String>,
    pub model: Option<String>,
    pub reasoning_effort: Option<ReasoningEffort>,
}

/// Forward-only, exhaustible stream of lifecycle events.
///
/// An `Err` item means the session crashed; consumers stop at the first one.
pub type EventStream = Box<dyn Iterator<Item = Result<ThreadEvent>>>;

/// Abstraction over agent execution backends.
pub trait AgentRuntime {
    /// Start (or resume) a session and return its event stream.
    fn start(&self, request: &AgentRequest) -> Result<EventStream>;
}

/// Runtime that spawns `codex exec --json`.
#[derive(Debug, Clone)]
pub struct CodexRuntime {
    config: AgentConfig,
}

impl CodexRuntime {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Build the `codex exec` invocation for `request`; the prompt goes to stdin.
    pub fn build_command(&self, request: &AgentRequest) -> Command {
        let mut cmd = Command::new(&self.config.command);
        cmd.arg("exec")
            .arg("--json")
            .arg("--sandbox")
            .arg(&self.config.sandbox)
            // The workdir need not be a repository; change detection degrades on its own.
            .arg("--skip-git-repo-check")
            .arg("-c")
            .arg(format!("approval_policy=\"{}\"", self.config.approval_policy));

        if let Some(model) = &request.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(effort) = request.reasoning_effort {
            cmd.arg("-c")
                .arg(format!("model_reasoning_effort=\"{effort}\""));
        }
        if let Some(session_id) = &request.resume_session_id {
            cmd.arg("resume").arg(session_id);
        }
        cmd.arg("-").current_dir(&request.workdir);
        cmd
    }
}

impl AgentRuntime for CodexRuntime {
    #[instrument(skip_all, fields(resume = request.resume_session_id.is_some()))]
    fn start(&self, request: &AgentRequest) -> Result<EventStream> {
        info!(workdir = %request.workdir.display(), "starting codex exec");
        let cmd = self.build_command(request);
        let child = spawn_streaming(cmd, request.prompt.as_bytes(), STDERR_LIMIT_BYTES)
            .with_context(|| format!("start {} exec", self.config.command))?;
        Ok(Box::new(CodexEventStream {
            child,
            command: self.config.command.clone(),
            done: false,
        }))
    }
}

/// JSONL event stream read from the agent's stdout.
struct CodexEventStream {
    child: StreamingChild,
    command: String,
    done: bool,
}

impl CodexEventStream {
    fn finish(&mut self) -> Option<Result<ThreadEvent>> {
        let exit = match self.child.finish() {
            Ok(exit) => exit,
            Err(err) => return Some(Err(err)),
        };
        if exit.status.success() {
            debug!("codex exec completed successfully");
            return None;
        }
        warn!(exit_code = ?exit.status.code(), "codex exec failed");
        let stderr = exit.stderr_text();
        let mut message = format!("{} exec exited with {}", self.command, exit.status);
        if !stderr.is_empty() {
            message.push_str(": ");
            message.push_str(&stderr);
        }
        Some(Err(anyhow!(message)))
    }
}

impl Iterator for CodexEventStream {
    type Item = Result<ThreadEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let line = match self.child.next_line() {
                Some(Ok(line)) => line,
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    return self.finish();
                }
            };
            match parse_event_line(&line) {
                Ok(Some(event)) => return Some(Ok(event)),
                Ok(None) => continue,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Parse one stdout line.
///
/// Blank lines and well-formed events of an unrecognized type yield `None`;
/// a line that is not JSON at all is an error.
pub fn parse_event_line(line: &str) -> Result<Option<ThreadEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let value: serde_json::Value =
        serde_json::from_str(line).with_context(|| format!("parse agent event line: {line}"))?;
    match serde_json::from_value::<ThreadEvent>(value) {
        Ok(event) => Ok(Some(event)),
        Err(err) => {
            warn!(err = %err, line, "skipping unrecognized agent event");
            Ok(None)
        }
    }
}
