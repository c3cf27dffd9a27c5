//! Orchestration for a single `cdx run` session.
//!
//! A run moves through [`Phase::Starting`], [`Phase::Streaming`],
//! [`Phase::Reconciling`] and [`Phase::Persisting`]. Agent-reported failures
//! (`turn.failed`, `error`) complete normally with status `failed`; anything
//! that escapes as an error becomes a [`SessionCrash`], which the CLI turns
//! into a result via [`recover_from_crash`].

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{Local, SecondsFormat, Utc};
use tracing::{debug, info, instrument, warn};

use crate::core::accumulator::{Accumulator, Progress};
use crate::core::path::normalize_change_path;
use crate::core::prompt::compose_prompt;
use crate::core::reconcile::merge_file_changes;
use crate::core::types::{FileChange, RunResult, RunStatus, TraceEntry, UNKNOWN_SESSION_ID};
use crate::io::agent::{AgentRequest, AgentRuntime, ReasoningEffort};
use crate::io::git::Git;
use crate::io::trace::{CODING_AGENT, TraceStore, resolve_trace_file_path};
use crate::io::transcript::TranscriptLocator;

/// Resolved configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Absolute working directory.
    pub workdir: PathBuf,
    /// Resume this session instead of starting a new one.
    pub session_id: Option<String>,
    /// File whose contents are prepended to the prompt.
    pub instructions: Option<PathBuf>,
    /// Journal path override.
    pub trace_file: Option<PathBuf>,
    pub agent_id: Option<String>,
    pub agent_type: Option<String>,
    pub model: Option<String>,
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Task prompt (non-empty).
    pub prompt: String,
}

impl RunOptions {
    pub fn new(workdir: impl Into<PathBuf>, prompt: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            session_id: None,
            instructions: None,
            trace_file: None,
            agent_id: None,
            agent_type: None,
            model: None,
            reasoning_effort: None,
            prompt: prompt.into(),
        }
    }

    /// Journal path: the override if given, else the repository default.
    pub fn trace_file_path(&self) -> PathBuf {
        self.trace_file
            .clone()
            .unwrap_or_else(|| resolve_trace_file_path(&self.workdir))
    }
}

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Streaming,
    Reconciling,
    Persisting,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::Reconciling => "reconciling",
            Self::Persisting => "persisting",
            Self::Done => "done",
        };
        f.write_str(label)
    }
}

/// A run that ended in an error instead of a result.
#[derive(Debug)]
pub struct SessionCrash {
    /// Session id observed before the crash, if any.
    pub session_id: Option<String>,
    /// Phase the run was in when it failed.
    pub phase: Phase,
    pub duration_ms: u64,
    pub error: anyhow::Error,
}

impl fmt::Display for SessionCrash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session crashed while {}: {:#}", self.phase, self.error)
    }
}

impl std::error::Error for SessionCrash {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let source: &(dyn std::error::Error + 'static) = &*self.error;
        Some(source)
    }
}

/// Run one agent session end to end and record it in `store`.
pub fn run_session<R: AgentRuntime, S: TraceStore>(
    options: &RunOptions,
    runtime: &R,
    store: &S,
    locator: &TranscriptLocator,
) -> Result<RunResult, SessionCrash> {
    let mut run = SessionRun::new();
    match run.drive(options, runtime, store, locator) {
        Ok(result) => Ok(result),
        Err(error) => Err(SessionCrash {
            session_id: run.acc.session_id().map(str::to_string),
            phase: run.phase,
            duration_ms: run.elapsed_ms(),
            error,
        }),
    }
}

struct SessionRun {
    acc: Accumulator,
    phase: Phase,
    started: Instant,
}

impl SessionRun {
    fn new() -> Self {
        Self {
            acc: Accumulator::new(),
            phase: Phase::Starting,
            started: Instant::now(),
        }
    }

    fn enter(&mut self, phase: Phase) {
        debug!(%phase, "session phase");
        self.phase = phase;
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    #[instrument(skip_all, fields(workdir = %options.workdir.display()))]
    fn drive<R: AgentRuntime, S: TraceStore>(
        &mut self,
        options: &RunOptions,
        runtime: &R,
        store: &S,
        locator: &TranscriptLocator,
    ) -> Result<RunResult> {
        let request = build_agent_request(options)?;
        let events = runtime.start(&request).context("start agent session")?;

        self.enter(Phase::Streaming);
        for event in events {
            let event = event.context("agent event stream")?;
            if let Some(progress) = self.acc.apply(&event) {
                report_progress(&progress);
            }
        }

        self.enter(Phase::Reconciling);
        let files_changed =
            reconcile_changes(&options.workdir, self.acc.files_changed(), &store.owned_paths());

        self.enter(Phase::Persisting);
        let transcript = locator.locate(self.acc.session_id(), Local::now().date_naive());
        let result = RunResult {
            session_id: self
                .acc
                .session_id()
                .unwrap_or(UNKNOWN_SESSION_ID)
                .to_string(),
            status: self.acc.status(),
            files_changed,
            final_response: self.acc.final_response().to_string(),
            error: self.acc.error().map(str::to_string),
            duration_ms: self.elapsed_ms(),
        };
        store
            .append(&trace_entry(options, &result, transcript))
            .context("append trace entry")?;

        self.enter(Phase::Done);
        info!(
            session_id = %result.session_id,
            status = ?result.status,
            files = result.files_changed.len(),
            duration_ms = result.duration_ms,
            "session finished"
        );
        Ok(result)
    }
}

fn build_agent_request(options: &RunOptions) -> Result<AgentRequest> {
    let instructions = match &options.instructions {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("read instructions {}", path.display()))?,
        ),
        None => None,
    };
    Ok(AgentRequest {
        workdir: options.workdir.clone(),
        prompt: compose_prompt(instructions.as_deref(), &options.prompt),
        resume_session_id: options.session_id.clone(),
        model: options.model.clone(),
        reasoning_effort: options.reasoning_effort,
    })
}

/// Merge agent-reported changes with `git status`, excluding the tool's own files.
///
/// Both sources are normalized to repository-relative paths first.
pub fn reconcile_changes(
    workdir: &Path,
    reported: &[FileChange],
    owned_paths: &[PathBuf],
) -> Vec<FileChange> {
    let git = Git::new(workdir);
    let root = git.repo_root().unwrap_or_else(|| workdir.to_path_buf());

    let excluded: BTreeSet<String> = owned_paths
        .iter()
        .map(|path| normalize_change_path(&path.display().to_string(), workdir, &root))
        .collect();
    let primary: Vec<FileChange> = reported
        .iter()
        .map(|change| {
            FileChange::new(
                normalize_change_path(&change.path, workdir, &root),
                change.kind,
            )
        })
        .collect();
    let secondary: Vec<FileChange> = git
        .detect_changes()
        .into_iter()
        .map(|change| {
            FileChange::new(
                normalize_change_path(&change.path, &root, &root),
                change.kind,
            )
        })
        .collect();

    let merged = merge_file_changes(&primary, &secondary, &excluded);
    debug!(
        reported = primary.len(),
        detected = secondary.len(),
        merged = merged.len(),
        "reconciled file changes"
    );
    merged
}

/// Build the failed result for a crashed run and try to journal it.
///
/// A journal failure here is only logged.
pub fn recover_from_crash<S: TraceStore>(
    options: &RunOptions,
    store: &S,
    locator: &TranscriptLocator,
    crash: &SessionCrash,
) -> RunResult {
    let result = RunResult {
        session_id: crash
            .session_id
            .clone()
            .unwrap_or_else(|| UNKNOWN_SESSION_ID.to_string()),
        status: RunStatus::Failed,
        files_changed: Vec::new(),
        final_response: String::new(),
        error: Some(format!("{:#}", crash.error)),
        duration_ms: crash.duration_ms,
    };
    let transcript = locator.locate(crash.session_id.as_deref(), Local::now().date_naive());
    if let Err(err) = store.append(&trace_entry(options, &result, transcript)) {
        warn!(err = %format!("{err:#}"), "failed to record crash in trace journal");
    }
    result
}

fn trace_entry(options: &RunOptions, result: &RunResult, transcript: String) -> TraceEntry {
    TraceEntry {
        coding_agent: CODING_AGENT.to_string(),
        session_id: result.session_id.clone(),
        agent_id: options.agent_id.clone().unwrap_or_default(),
        agent_type: options.agent_type.clone().unwrap_or_default(),
        status: result.status,
        files_changed: result.files_changed.clone(),
        error: result.error.clone(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        duration_ms: result.duration_ms,
        transcript,
    }
}

fn report_progress(progress: &Progress) {
    match progress {
        Progress::SessionStarted { session_id } => info!(%session_id, "session started"),
        Progress::TurnStarted => info!("turn started"),
        Progress::TurnCompleted { usage } => info!(
            input_tokens = usage.input_tokens,
            cached_input_tokens = usage.cached_input_tokens,
            output_tokens = usage.output_tokens,
            "turn completed"
        ),
        Progress::TurnFailed { message } => warn!(%message, "turn failed"),
        Progress::CommandStarted { command } => info!(%command, "exec"),
        Progress::CommandFinished { command, exit_code } => {
            info!(%command, exit_code = ?exit_code, "exec done");
        }
        Progress::FilesChanged { changes } => {
            for change in changes {
                info!(path = %change.path, kind = %change.kind, "file changed");
            }
        }
        Progress::StreamError { message } => warn!(%message, "agent error"),
    }
}
