//! Side-effecting operations: agent process, git, config, journal, transcripts.

pub mod agent;
pub mod config;
pub mod git;
pub mod process;
pub mod trace;
pub mod transcript;
