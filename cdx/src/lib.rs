//! Run a single `codex exec` session and record what it did.
//!
//! `cdx` launches the agent, consumes its JSONL event stream, reconciles the
//! files it reported against `git status`, and appends one entry per session
//! to a repository-level trace journal (`.agent-trace.json`).
//!
//! - **[`core`]**: Pure logic (event model, accumulation, path normalization,
//!   change reconciliation). No I/O.
//! - **[`io`]**: Side effects (agent process, git, config, journal, transcript
//!   lookup), behind traits where tests need to substitute them.
//!
//! [`session`] coordinates the two to implement `cdx run`.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
