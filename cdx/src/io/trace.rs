//! Trace journal storage (`.agent-trace.json`).
//!
//! One JSON document per repository accumulates an entry for every session.
//! Appends are read-modify-write cycles serialized by an exclusive advisory
//! lock on a sidecar `.lock` file; the new document replaces the old one via
//! temp file + rename, so readers see either the old or the new journal.
//!
//! The journal is shared with other coding agents. Appends treat it as
//! untyped JSON so foreign entries and keys survive verbatim; only
//! [`TraceStore::read_all`] parses it into a [`TraceFile`].

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use fs2::FileExt;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::types::{TraceEntry, TraceFile};
use crate::io::git::Git;

/// Journal file name at the repository root.
pub const TRACE_FILE_NAME: &str = ".agent-trace.json";
/// Schema version written to new journals.
pub const TRACE_VERSION: &str = "0.1.0";
/// `coding_agent` tag of every entry written by this tool.
pub const CODING_AGENT: &str = "codex";

/// Storage for trace entries.
pub trait TraceStore {
    /// Load the whole journal (an empty journal if none exists yet).
    fn read_all(&self) -> Result<TraceFile>;

    /// Append one entry at the end of the journal.
    fn append(&self, entry: &TraceEntry) -> Result<()>;

    /// Files this store writes on disk, if any.
    ///
    /// These are side effects of the tool itself and are excluded from the
    /// session's change set.
    fn owned_paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// An empty journal tagged with [`TRACE_VERSION`].
pub fn empty_trace_file() -> TraceFile {
    TraceFile {
        version: TRACE_VERSION.to_string(),
        traces: Vec::new(),
    }
}

/// Journal location for `workdir`: `<repo root>/.agent-trace.json`, where the
/// root prefers a superproject and falls back to the workdir itself.
pub fn resolve_trace_file_path(workdir: &Path) -> PathBuf {
    Git::new(workdir).trace_root().join(TRACE_FILE_NAME)
}

/// JSON file journal.
///
/// The `<journal>.lock` sidecar is created on first append and left in
/// place; other writers may be blocked on it.
#[derive(Debug, Clone)]
pub struct JsonTraceStore {
    path: PathBuf,
}

impl JsonTraceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn lock_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, ".lock")
    }

    fn tmp_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, ".tmp")
    }

    /// The journal as untyped JSON, or a fresh empty journal.
    fn read_document(&self) -> Result<Value> {
        if !self.path.exists() {
            return serde_json::to_value(empty_trace_file()).context("serialize empty trace file");
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read trace file {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parse trace file {}", self.path.display()))
    }
}

impl TraceStore for JsonTraceStore {
    fn read_all(&self) -> Result<TraceFile> {
        if !self.path.exists() {
            return Ok(empty_trace_file());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read trace file {}", self.path.display()))?;
        let trace: TraceFile = serde_json::from_str(&contents)
            .with_context(|| format!("parse trace file {}", self.path.display()))?;
        Ok(trace)
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    fn append(&self, entry: &TraceEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let lock_path = self.lock_path();
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("open trace lock {}", lock_path.display()))?;
        FileExt::lock_exclusive(&lock).with_context(|| format!("lock {}", lock_path.display()))?;

        let mut document = self.read_document()?;
        let count = push_entry(&mut document, entry)
            .with_context(|| format!("append to trace file {}", self.path.display()))?;
        let mut buf = serde_json::to_string_pretty(&document).context("serialize trace file")?;
        buf.push('\n');
        write_atomic(&self.path, &self.tmp_path(), &buf)?;
        debug!(entries = count, "trace entry appended");

        // Qualified: std's inherent `File::unlock` would shadow the trait method.
        FileExt::unlock(&lock).with_context(|| format!("unlock {}", lock_path.display()))?;
        Ok(())
    }

    fn owned_paths(&self) -> Vec<PathBuf> {
        vec![self.path.clone(), self.lock_path(), self.tmp_path()]
    }
}

/// Push `entry` onto the document's `traces` array; returns the new length.
fn push_entry(document: &mut Value, entry: &TraceEntry) -> Result<usize> {
    let object = document
        .as_object_mut()
        .ok_or_else(|| anyhow!("journal root is not a JSON object"))?;
    let traces = object
        .entry("traces")
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| anyhow!("journal `traces` is not an array"))?;
    traces.push(serde_json::to_value(entry).context("serialize trace entry")?);
    Ok(traces.len())
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn write_atomic(path: &Path, tmp_path: &Path, contents: &str) -> Result<()> {
    fs::write(tmp_path, contents)
        .with_context(|| format!("write temp trace file {}", tmp_path.display()))?;
    fs::rename(tmp_path, path).with_context(|| format!("replace trace file {}", path.display()))?;
    Ok(())
}
