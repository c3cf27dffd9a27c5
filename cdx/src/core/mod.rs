//! Deterministic, pure logic shared by the session orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod accumulator;
pub mod events;
pub mod path;
pub mod prompt;
pub mod reconcile;
pub mod types;
