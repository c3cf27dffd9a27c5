//! Stable exit codes for the `cdx` CLI.

/// Session completed.
pub const OK: i32 = 0;
/// Session finished with status `failed` (the agent reported a failure).
pub const FAILED: i32 = 1;
/// Session crashed; a failed result was still printed and journaled.
pub const CRASHED: i32 = 2;
/// Invalid invocation or configuration; no session was started.
pub const INVALID: i32 = 1;
