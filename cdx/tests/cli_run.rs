//! CLI tests for `cdx run`.
//!
//! Spawns the cdx binary against a fake `codex` script (configured through
//! `--config`) and checks exit codes, the JSON result on stdout and the trace
//! journal.
#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use cdx::core::types::{FileChange, FileChangeKind, RunResult, RunStatus};
use cdx::exit_codes;
use cdx::io::trace::{JsonTraceStore, TRACE_FILE_NAME, TraceStore};
use cdx::test_support::{TestRepo, write_fake_agent};

struct Fixture {
    repo: TestRepo,
    tools: tempfile::TempDir,
}

impl Fixture {
    /// `body` runs after the fixture has captured stdin and argv.
    fn new(body: &str) -> Self {
        let repo = TestRepo::new().expect("repo");
        let tools = tempfile::tempdir().expect("tools dir");
        let script = write_fake_agent(
            tools.path(),
            &format!(
                "cat > \"{tools}/prompt.txt\"\necho \"$@\" > \"{tools}/args.txt\"\n{body}",
                tools = tools.path().display()
            ),
        )
        .expect("fake agent");
        let config = format!(
            "[agent]\ncommand = \"{}\"\n\n[transcript]\nsessions_dir = \"{}\"\n",
            script.display(),
            tools.path().join("sessions").display()
        );
        fs::write(tools.path().join("cdx.toml"), config).expect("config");
        Self { repo, tools }
    }

    fn config_path(&self) -> PathBuf {
        self.tools.path().join("cdx.toml")
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_cdx"))
            .arg("run")
            .arg("-w")
            .arg(self.repo.path())
            .arg("--config")
            .arg(self.config_path())
            .args(args)
            .output()
            .expect("cdx run")
    }

    fn captured(&self, name: &str) -> String {
        fs::read_to_string(self.tools.path().join(name)).expect("captured file")
    }

    fn trace_path(&self) -> PathBuf {
        self.repo.path().join(TRACE_FILE_NAME)
    }
}

fn result_of(output: &Output) -> RunResult {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "stdout is not a run result ({err}): {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

const COMPLETED_AGENT: &str = r#"mkdir -p src && echo 'fn main() {}' > src/new.rs
echo '{"type":"thread.started","thread_id":"sess-cli"}'
echo '{"type":"turn.started"}'
echo '{"type":"item.completed","item":{"id":"i1","type":"file_change","changes":[{"path":"src/new.rs","kind":"add"}],"status":"completed"}}'
echo '{"type":"item.completed","item":{"id":"i2","type":"reasoning","text":"thinking"}}'
echo '{"type":"item.completed","item":{"id":"i3","type":"agent_message","text":"Created src/new.rs"}}'
echo '{"type":"turn.completed","usage":{"input_tokens":10,"cached_input_tokens":2,"output_tokens":5}}'
"#;

#[test]
fn completed_session_exits_ok_and_journals_entry() {
    let fixture = Fixture::new(COMPLETED_AGENT);

    let output = fixture.run(&["--agent-id", "a-1", "--agent-type", "worker", "add", "main"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let result = result_of(&output);
    assert_eq!(result.session_id, "sess-cli");
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.final_response, "Created src/new.rs");
    assert_eq!(
        result.files_changed,
        vec![FileChange::new("src/new.rs", FileChangeKind::Add)]
    );
    assert_eq!(fixture.captured("prompt.txt"), "add main");

    let trace = JsonTraceStore::new(fixture.trace_path())
        .read_all()
        .expect("journal");
    assert_eq!(trace.version, "0.1.0");
    assert_eq!(trace.traces.len(), 1);
    let entry = &trace.traces[0];
    assert_eq!(entry.coding_agent, "codex");
    assert_eq!(entry.session_id, "sess-cli");
    assert_eq!(entry.agent_id, "a-1");
    assert_eq!(entry.agent_type, "worker");
    assert_eq!(entry.files_changed, result.files_changed);
    assert_eq!(
        entry.transcript,
        fixture.tools.path().join("sessions").display().to_string()
    );
}

#[test]
fn resume_and_instructions_reach_the_agent() {
    let fixture = Fixture::new(
        "echo '{\"type\":\"thread.started\",\"thread_id\":\"sess-old\"}'\n",
    );
    let instructions = fixture.tools.path().join("AGENTS.md");
    fs::write(&instructions, "Be brief.").expect("instructions");

    let output = fixture.run(&[
        "--session-id",
        "sess-old",
        "-i",
        instructions.to_str().expect("utf-8 path"),
        "-m",
        "gpt-5-codex",
        "--thinking",
        "high",
        "continue",
    ]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(
        fixture.captured("prompt.txt"),
        "Be brief.\n\n---\n\ncontinue"
    );
    let args = fixture.captured("args.txt");
    assert_eq!(
        args.trim_end(),
        "exec --json --sandbox workspace-write --skip-git-repo-check -c approval_policy=\"never\" \
         --model gpt-5-codex -c model_reasoning_effort=\"high\" resume sess-old -"
    );
}

#[test]
fn failed_turn_exits_failed() {
    let fixture = Fixture::new(
        r#"echo '{"type":"thread.started","thread_id":"sess-f"}'
echo '{"type":"turn.failed","error":{"message":"usage limit reached"}}'
"#,
    );

    let output = fixture.run(&["task"]);

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    let result = result_of(&output);
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.error.as_deref(), Some("usage limit reached"));

    let trace = JsonTraceStore::new(fixture.trace_path())
        .read_all()
        .expect("journal");
    assert_eq!(trace.traces[0].status, RunStatus::Failed);
    assert_eq!(
        trace.traces[0].error.as_deref(),
        Some("usage limit reached")
    );
}

#[test]
fn agent_crash_exits_crashed_with_observed_session() {
    let fixture = Fixture::new(
        r#"echo '{"type":"thread.started","thread_id":"sess-c"}'
echo 'auth expired' >&2
exit 7
"#,
    );

    let output = fixture.run(&["task"]);

    assert_eq!(output.status.code(), Some(exit_codes::CRASHED));
    let result = result_of(&output);
    assert_eq!(result.session_id, "sess-c");
    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.files_changed.is_empty());
    assert!(
        result
            .error
            .as_deref()
            .is_some_and(|e| e.contains("auth expired")),
        "{:?}",
        result.error
    );

    let trace = JsonTraceStore::new(fixture.trace_path())
        .read_all()
        .expect("journal");
    assert_eq!(trace.traces.len(), 1);
    assert_eq!(trace.traces[0].session_id, "sess-c");
    assert_eq!(trace.traces[0].error, result.error);
}

#[test]
fn garbage_output_before_session_is_unknown_crash() {
    let fixture = Fixture::new("echo 'this is not json'\n");

    let output = fixture.run(&["task"]);

    assert_eq!(output.status.code(), Some(exit_codes::CRASHED));
    let result = result_of(&output);
    assert_eq!(result.session_id, "unknown");
    let trace = JsonTraceStore::new(fixture.trace_path())
        .read_all()
        .expect("journal");
    assert_eq!(trace.traces[0].transcript, "");
}

#[test]
fn missing_workdir_is_invalid_and_writes_nothing() {
    let fixture = Fixture::new(COMPLETED_AGENT);
    let missing = fixture.tools.path().join("no-such-dir");

    let output = Command::new(env!("CARGO_BIN_EXE_cdx"))
        .arg("run")
        .arg("-w")
        .arg(&missing)
        .arg("--config")
        .arg(fixture.config_path())
        .arg("task")
        .output()
        .expect("cdx run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(output.stdout.is_empty());
    assert!(!fixture.tools.path().join("prompt.txt").exists());
}

#[test]
fn invalid_config_is_invalid_and_writes_no_trace() {
    let fixture = Fixture::new(COMPLETED_AGENT);
    fs::write(fixture.config_path(), "[agent]\ncommand = \"\"\n").expect("config");

    let output = fixture.run(&["task"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(output.stdout.is_empty());
    assert!(!fixture.trace_path().exists());
    assert!(String::from_utf8_lossy(&output.stderr).contains("agent.command"));
}

#[test]
fn usage_errors_exit_invalid_and_help_exits_ok() {
    let cdx = env!("CARGO_BIN_EXE_cdx");

    let missing_prompt = Command::new(cdx)
        .args(["run", "-w", "."])
        .output()
        .expect("cdx run");
    assert_eq!(missing_prompt.status.code(), Some(exit_codes::INVALID));

    let help = Command::new(cdx)
        .args(["run", "--help"])
        .output()
        .expect("cdx run --help");
    assert_eq!(help.status.code(), Some(exit_codes::OK));
    let help = String::from_utf8_lossy(&help.stdout);
    assert!(help.contains("--session-id"));
    assert!(help.contains(".lock"));
}

#[test]
fn trace_file_override_is_used() {
    let fixture = Fixture::new(COMPLETED_AGENT);
    let custom = fixture.tools.path().join("journal/trace.json");

    let output = fixture.run(&["--trace-file", path_str(&custom), "task"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(custom.is_file());
    assert!(!fixture.trace_path().exists());
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf-8 path")
}
