//! Lifecycle events emitted by `codex exec --json`.
//!
//! Each stdout line of the agent process is one JSON object tagged by `type`.
//! Item kinds cdx does not inspect (reasoning, todo lists, MCP calls,
//! web searches) deserialize to [`ThreadItem::Other`].

use serde::Deserialize;

use crate::core::types::{FileChange, Usage};

/// One event of a session's event stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ThreadEvent {
    #[serde(rename = "thread.started")]
    ThreadStarted { thread_id: String },
    #[serde(rename = "turn.started")]
    TurnStarted,
    #[serde(rename = "turn.completed")]
    TurnCompleted { usage: Usage },
    #[serde(rename = "turn.failed")]
    TurnFailed { error: ThreadError },
    #[serde(rename = "item.started")]
    ItemStarted { item: ThreadItem },
    #[serde(rename = "item.updated")]
    ItemUpdated { item: ThreadItem },
    #[serde(rename = "item.completed")]
    ItemCompleted { item: ThreadItem },
    /// Unrecoverable stream error reported by the agent.
    #[serde(rename = "error")]
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ThreadError {
    pub message: String,
}

/// A unit of agent output within a turn.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreadItem {
    FileChange {
        changes: Vec<FileChange>,
    },
    CommandExecution {
        command: String,
        #[serde(default)]
        exit_code: Option<i32>,
    },
    AgentMessage {
        text: String,
    },
    #[serde(other)]
    Other,
}
