//! Reconciliation of agent-reported and git-detected file changes.
//!
//! The agent's structured report is authoritative for files it edited through
//! its patch tool. Files touched by shell commands only show up in `git
//! status`, so those are appended when the agent did not already report them.

use std::collections::{BTreeSet, HashSet};

use crate::core::types::{FileChange, FileChangeKind};

/// Merge `primary` (agent) and `secondary` (git) changes.
///
/// Output keeps primary order first, then secondary order. Paths are unique
/// (first occurrence wins, so the agent's kind takes precedence) and paths in
/// `excluded` never appear.
pub fn merge_file_changes(
    primary: &[FileChange],
    secondary: &[FileChange],
    excluded: &BTreeSet<String>,
) -> Vec<FileChange> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut merged = Vec::with_capacity(primary.len() + secondary.len());
    for change in primary.iter().chain(secondary) {
        if excluded.contains(&change.path) {
            continue;
        }
        if seen.insert(change.path.as_str()) {
            merged.push(change.clone());
        }
    }
    merged
}

/// Classify a porcelain v1 status code (`XY`, already trimmed).
///
/// Renames and copies are not distinguished from modifications.
pub fn kind_for_status_code(code: &str) -> FileChangeKind {
    match code {
        "D" => FileChangeKind::Delete,
        "??" | "A" => FileChangeKind::Add,
        _ => FileChangeKind::Update,
    }
}
