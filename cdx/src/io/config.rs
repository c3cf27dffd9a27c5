//! Optional `cdx` configuration (`.cdx.toml`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::io::agent::ReasoningEffort;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".cdx.toml";

/// cdx configuration (TOML).
///
/// Every field is optional; command-line flags take precedence over values
/// read from the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CdxConfig {
    pub agent: AgentConfig,
    pub transcript: TranscriptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent executable (e.g. `codex` or an absolute path).
    pub command: String,

    /// Sandbox mode passed to `--sandbox`.
    pub sandbox: String,

    /// Approval policy passed as `-c approval_policy=...`.
    pub approval_policy: String,

    /// Default model when `--model` is not given.
    pub model: Option<String>,

    /// Default reasoning effort when `--thinking` is not given.
    pub reasoning_effort: Option<ReasoningEffort>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: "codex".to_string(),
            sandbox: "workspace-write".to_string(),
            approval_policy: "never".to_string(),
            model: None,
            reasoning_effort: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TranscriptConfig {
    /// Root of the per-session transcript tree (defaults to
    /// `$CODEX_HOME/sessions` or `~/.codex/sessions`).
    pub sessions_dir: Option<PathBuf>,
}

impl CdxConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent.command.trim().is_empty() {
            return Err(anyhow!("agent.command must be non-empty"));
        }
        if self.agent.sandbox.trim().is_empty() {
            return Err(anyhow!("agent.sandbox must be non-empty"));
        }
        if self.agent.approval_policy.trim().is_empty() {
            return Err(anyhow!("agent.approval_policy must be non-empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CdxConfig::default()`.
pub fn load_config(path: &Path) -> Result<CdxConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        let cfg = CdxConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CdxConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    debug!(path = %path.display(), "config loaded");
    Ok(cfg)
}
