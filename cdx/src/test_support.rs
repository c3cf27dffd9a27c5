//! Test-only helpers: scripted agent runtimes, in-memory journals, temp repos.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow, bail};

use crate::core::events::ThreadEvent;
use crate::core::types::{TraceEntry, TraceFile};
use crate::io::agent::{AgentRequest, AgentRuntime, EventStream};
use crate::io::trace::{TraceStore, empty_trace_file};

/// One item yielded by a [`ScriptedRuntime`] stream.
#[derive(Debug, Clone)]
pub enum ScriptedEvent {
    Event(ThreadEvent),
    /// Stream error with this message.
    Crash(String),
}

/// Agent runtime that replays a fixed script and records each request.
#[derive(Debug, Default)]
pub struct ScriptedRuntime {
    script: Vec<ScriptedEvent>,
    start_error: Option<String>,
    requests: RefCell<Vec<AgentRequest>>,
}

impl ScriptedRuntime {
    pub fn new(script: Vec<ScriptedEvent>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// Runtime whose `start` fails with `message`.
    pub fn failing_start(message: &str) -> Self {
        Self {
            start_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Requests passed to successful `start` calls.
    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.borrow().clone()
    }
}

impl AgentRuntime for ScriptedRuntime {
    fn start(&self, request: &AgentRequest) -> Result<EventStream> {
        if let Some(message) = &self.start_error {
            bail!("{message}");
        }
        self.requests.borrow_mut().push(request.clone());
        let items: Vec<Result<ThreadEvent>> = self
            .script
            .iter()
            .map(|item| match item {
                ScriptedEvent::Event(event) => Ok(event.clone()),
                ScriptedEvent::Crash(message) => Err(anyhow!("{message}")),
            })
            .collect();
        Ok(Box::new(items.into_iter()))
    }
}

/// Journal kept in memory; optionally fails every append.
#[derive(Debug, Default)]
pub struct MemoryTraceStore {
    entries: RefCell<Vec<TraceEntry>>,
    fail_appends: bool,
}

impl MemoryTraceStore {
    pub fn failing() -> Self {
        Self {
            fail_appends: true,
            ..Self::default()
        }
    }

    pub fn entries(&self) -> Vec<TraceEntry> {
        self.entries.borrow().clone()
    }
}

impl TraceStore for MemoryTraceStore {
    fn read_all(&self) -> Result<TraceFile> {
        Ok(TraceFile {
            traces: self.entries(),
            ..empty_trace_file()
        })
    }

    fn append(&self, entry: &TraceEntry) -> Result<()> {
        if self.fail_appends {
            bail!("trace store unavailable");
        }
        self.entries.borrow_mut().push(entry.clone());
        Ok(())
    }
}

/// Temporary git repository with one commit containing `README.md`.
pub struct TestRepo {
    _temp: tempfile::TempDir,
    root: PathBuf,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create temp dir")?;
        let root = fs::canonicalize(temp.path()).context("canonicalize temp dir")?;
        git(&root, &["init", "-q"])?;
        git(&root, &["config", "user.email", "cdx@example.com"])?;
        git(&root, &["config", "user.name", "cdx"])?;
        git(&root, &["config", "commit.gpgsign", "false"])?;
        fs::write(root.join("README.md"), "hello\n").context("write README.md")?;
        git(&root, &["add", "README.md"])?;
        git(&root, &["commit", "-q", "-m", "init"])?;
        Ok(Self { _temp: temp, root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Run `git` in the repository root.
    pub fn git(&self, args: &[&str]) -> Result<()> {
        git(&self.root, args)
    }
}

fn git(dir: &Path, args: &[&str]) -> Result<()> {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .with_context(|| format!("run git {}", args.join(" ")))?;
    if !status.success() {
        bail!("git {} failed with {status}", args.join(" "));
    }
    Ok(())
}

/// Write an executable `/bin/sh` script standing in for the agent binary.
///
/// The body should consume stdin (e.g. `cat > /dev/null`) before exiting.
#[cfg(unix)]
pub fn write_fake_agent(dir: &Path, body: &str) -> Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-codex");
    fs::write(&path, format!("#!/bin/sh\n{body}"))
        .with_context(|| format!("write {}", path.display()))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("chmod {}", path.display()))?;
    Ok(path)
}
