//! Shared deterministic types for the session core.
//!
//! These types define the stable JSON contracts of the tool: the primary
//! stdout result and the entries persisted to `.agent-trace.json`. Field order
//! is part of the contract because the journal is re-serialized in full on
//! every append.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Session identifier reported when the agent never started a thread.
pub const UNKNOWN_SESSION_ID: &str = "unknown";

/// Kind of change applied to a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    Add,
    Delete,
    Update,
}

impl fmt::Display for FileChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Update => "update",
        };
        f.write_str(label)
    }
}

/// One changed file, as reported by the agent or detected from git.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub kind: FileChangeKind,
}

impl FileChange {
    pub fn new(path: impl Into<String>, kind: FileChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Outcome of a session.
///
/// `Completed` is the initial state; once a run observes a failure it stays
/// `Failed` (see [`crate::core::accumulator::Accumulator`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Completed,
    Failed,
}

/// Token counters reported with `turn.completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    #[serde(default)]
    pub cached_input_tokens: u64,
    pub output_tokens: u64,
}

/// Primary output of `cdx run`, printed to stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub session_id: String,
    pub status: RunStatus,
    pub files_changed: Vec<FileChange>,
    pub final_response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// One persisted record in the trace journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub coding_agent: String,
    pub session_id: String,
    pub agent_id: String,
    pub agent_type: String,
    pub status: RunStatus,
    pub files_changed: Vec<FileChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// RFC 3339 UTC timestamp with millisecond precision.
    pub timestamp: String,
    pub duration_ms: u64,
    /// Transcript file path, the transcript root when no file matched, or
    /// empty when no session id was observed.
    pub transcript: String,
}

/// Root document of `.agent-trace.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFile {
    pub version: String,
    pub traces: Vec<TraceEntry>,
}
