//! Git adapter for change detection and trace-file placement.
//!
//! Every query here is best-effort from the session's point of view: callers
//! use the `Option`/empty-returning helpers, which log and degrade instead of
//! failing the run.

use std::path::PathBuf;
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::reconcile::kind_for_status_code;
use crate::core::types::FileChange;

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file, relative to the repository root.
    pub path: String,
}

impl StatusEntry {
    pub fn to_file_change(&self) -> FileChange {
        FileChange::new(self.path.clone(), kind_for_status_code(self.code.trim()))
    }
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Top-level directory of the repository containing the workdir.
    pub fn toplevel(&self) -> Result<PathBuf> {
        let out = self.run_capture(&["rev-parse", "--show-toplevel"])?;
        non_empty_path(&out).ok_or_else(|| anyhow!("git rev-parse --show-toplevel was empty"))
    }

    /// Working tree of the superproject when the workdir is inside a submodule.
    pub fn superproject_root(&self) -> Result<Option<PathBuf>> {
        let out = self.run_capture(&["rev-parse", "--show-superproject-working-tree"])?;
        Ok(non_empty_path(&out))
    }

    /// Best-effort repository top level; `None` outside a repository.
    pub fn repo_root(&self) -> Option<PathBuf> {
        match self.toplevel() {
            Ok(root) => Some(root),
            Err(err) => {
                debug!(err = %err, workdir = %self.workdir.display(), "no git toplevel");
                None
            }
        }
    }

    /// Directory that owns the shared trace journal.
    ///
    /// Prefers the superproject, then the top level, then the workdir itself.
    #[instrument(skip_all)]
    pub fn trace_root(&self) -> PathBuf {
        match self.superproject_root() {
            Ok(Some(root)) => {
                debug!(root = %root.display(), "using superproject root");
                return root;
            }
            Ok(None) => {}
            Err(err) => {
                debug!(err = %err, "superproject lookup failed");
            }
        }
        self.repo_root().unwrap_or_else(|| self.workdir.clone())
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-z", "-uall"])?;
        Ok(parse_status_output(&out))
    }

    /// Working-tree changes relative to HEAD, or empty when git is unavailable.
    #[instrument(skip_all)]
    pub fn detect_changes(&self) -> Vec<FileChange> {
        match self.status_porcelain() {
            Ok(entries) => {
                debug!(count = entries.len(), "detected working tree changes");
                entries.iter().map(StatusEntry::to_file_change).collect()
            }
            Err(err) => {
                warn!(err = %err, "git change detection unavailable");
                Vec::new()
            }
        }
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn non_empty_path(out: &str) -> Option<PathBuf> {
    let trimmed = out.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

/// Parse `git status --porcelain=v1 -z` output.
///
/// Records are NUL-terminated `XY path` with paths unquoted. A rename or copy
/// record is followed by one extra record holding the source path, which is
/// skipped. Records that do not fit the format are skipped with a warning.
pub fn parse_status_output(out: &str) -> Vec<StatusEntry> {
    let mut entries = Vec::new();
    let mut records = out.split('\0');
    while let Some(record) = records.next() {
        if record.is_empty() {
            continue;
        }
        match parse_status_record(record) {
            Some(entry) => {
                if has_source_record(&entry.code) {
                    records.next();
                }
                entries.push(entry);
            }
            None => warn!(record, "skipping unexpected porcelain record"),
        }
    }
    entries
}

fn parse_status_record(record: &str) -> Option<StatusEntry> {
    let code = record.get(..2)?;
    let path = record.strip_prefix(code)?.strip_prefix(' ')?;
    if path.is_empty() {
        return None;
    }
    Some(StatusEntry {
        code: code.to_string(),
        path: path.to_string(),
    })
}

fn has_source_record(code: &str) -> bool {
    code.contains(['R', 'C'])
}
