//! `cdx`: run one codex session and journal it.
//!
//! Prints the run result as JSON on stdout and exits with
//! [`exit_codes::OK`], [`exit_codes::FAILED`] or [`exit_codes::CRASHED`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::error;

use cdx::core::types::{RunResult, RunStatus};
use cdx::exit_codes;
use cdx::io::agent::{CodexRuntime, ReasoningEffort};
use cdx::io::config::{CONFIG_FILE_NAME, CdxConfig, load_config};
use cdx::io::trace::JsonTraceStore;
use cdx::io::transcript::TranscriptLocator;
use cdx::logging;
use cdx::session::{RunOptions, recover_from_crash, run_session};

#[derive(Parser)]
#[command(
    name = "cdx",
    version,
    about = "Run a codex session and record it in the agent trace journal"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run (or resume) one agent session and print its result as JSON.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Working directory for the agent.
    #[arg(short, long)]
    workdir: PathBuf,

    /// Resume an existing session instead of starting a new one.
    #[arg(long, visible_alias = "thread-id")]
    session_id: Option<String>,

    /// File whose contents are prepended to the prompt.
    #[arg(short, long)]
    instructions: Option<PathBuf>,

    /// Trace journal path (defaults to `.agent-trace.json` at the repository root).
    ///
    /// A `<path>.lock` file is kept next to the journal to serialize writers.
    #[arg(long)]
    trace_file: Option<PathBuf>,

    /// Caller-assigned agent id recorded in the journal.
    #[arg(long)]
    agent_id: Option<String>,

    /// Caller-assigned agent role recorded in the journal.
    #[arg(long)]
    agent_type: Option<String>,

    /// Model override.
    #[arg(short, long)]
    model: Option<String>,

    /// Reasoning effort override.
    #[arg(long, value_enum, visible_alias = "reasoning-effort")]
    thinking: Option<ReasoningEffort>,

    /// Config file (defaults to `<workdir>/.cdx.toml`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Task prompt; words are joined with single spaces.
    #[arg(required = true, num_args = 1..)]
    prompt: Vec<String>,
}

fn main() {
    logging::init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::OK
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    let code = match cli.command {
        Command::Run(args) => match cmd_run(args) {
            Ok(code) => code,
            Err(err) => {
                eprintln!("{:#}", err);
                exit_codes::INVALID
            }
        },
    };
    std::process::exit(code);
}

fn cmd_run(args: RunArgs) -> Result<i32> {
    let workdir = resolve_workdir(&args.workdir)?;
    let config = match &args.config {
        Some(path) if !path.exists() => bail!("config file {} does not exist", path.display()),
        Some(path) => load_config(path)?,
        None => load_config(&workdir.join(CONFIG_FILE_NAME))?,
    };
    let options = build_options(args, workdir, &config)?;

    let runtime = CodexRuntime::new(config.agent.clone());
    let store = JsonTraceStore::new(options.trace_file_path());
    let locator = TranscriptLocator::from_env(config.transcript.sessions_dir.clone());

    let (result, code) = match run_session(&options, &runtime, &store, &locator) {
        Ok(result) => {
            let code = match result.status {
                RunStatus::Completed => exit_codes::OK,
                RunStatus::Failed => exit_codes::FAILED,
            };
            (result, code)
        }
        Err(crash) => {
            error!(phase = %crash.phase, err = %format!("{:#}", crash.error), "session crashed");
            (
                recover_from_crash(&options, &store, &locator, &crash),
                exit_codes::CRASHED,
            )
        }
    };
    print_result(&result)?;
    Ok(code)
}

/// Merge CLI arguments over config defaults.
fn build_options(args: RunArgs, workdir: PathBuf, config: &CdxConfig) -> Result<RunOptions> {
    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        bail!("prompt must be non-empty");
    }
    let trace_file = args
        .trace_file
        .as_deref()
        .map(absolute_trace_path)
        .transpose()?;
    Ok(RunOptions {
        workdir,
        session_id: args.session_id.filter(|id| !id.trim().is_empty()),
        instructions: args.instructions,
        trace_file,
        agent_id: args.agent_id,
        agent_type: args.agent_type,
        model: args.model.or_else(|| config.agent.model.clone()),
        reasoning_effort: args.thinking.or(config.agent.reasoning_effort),
        prompt,
    })
}

fn resolve_workdir(path: &Path) -> Result<PathBuf> {
    let workdir = fs::canonicalize(path)
        .with_context(|| format!("resolve workdir {}", path.display()))?;
    if !workdir.is_dir() {
        bail!("workdir {} is not a directory", workdir.display());
    }
    Ok(workdir)
}

/// Absolute journal path with the parent directory canonicalized when it exists.
fn absolute_trace_path(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path)
        .with_context(|| format!("resolve trace file {}", path.display()))?;
    let resolved = match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent).ok().map(|dir| dir.join(name)),
        _ => None,
    };
    Ok(resolved.unwrap_or(absolute))
}

fn print_result(result: &RunResult) -> Result<()> {
    let payload = serde_json::to_string_pretty(result).context("serialize run result")?;
    println!("{payload}");
    Ok(())
}
