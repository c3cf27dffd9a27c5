//! Helpers for running a streaming child process with bounded stderr capture.

use std::io::{BufRead, BufReader, Lines, Read, Write};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};

/// A spawned child whose stdout is consumed line by line.
///
/// Stderr is drained on a background thread so the child never blocks on a
/// full pipe; at most `stderr_limit_bytes` of it are kept.
pub struct StreamingChild {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr: Option<thread::JoinHandle<Result<(Vec<u8>, usize)>>>,
}

/// Exit status and captured stderr of a finished [`StreamingChild`].
#[derive(Debug)]
pub struct StreamExit {
    pub status: ExitStatus,
    pub stderr: Vec<u8>,
    pub stderr_truncated: usize,
}

impl StreamExit {
    pub fn stderr_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).trim().to_string();
        if self.stderr_truncated > 0 {
            text.push_str(&format!(
                "\n[stderr truncated {} bytes]",
                self.stderr_truncated
            ));
        }
        text
    }
}

/// Spawn `cmd`, write `stdin` to it and close the pipe.
#[instrument(skip_all, fields(stderr_limit_bytes = stderr_limit_bytes))]
pub fn spawn_streaming(
    mut cmd: Command,
    stdin: &[u8],
    stderr_limit_bytes: usize,
) -> Result<StreamingChild> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        match child_stdin.write_all(stdin) {
            Ok(()) => {}
            // The child exited without reading its input; its exit status tells the rest.
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                warn!("child closed stdin before reading input");
            }
            Err(e) => return Err(e).context("write stdin"),
        }
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stderr = thread::spawn(move || read_stream_limited(stderr, stderr_limit_bytes));

    Ok(StreamingChild {
        child,
        lines: BufReader::new(stdout).lines(),
        stderr: Some(stderr),
    })
}

impl StreamingChild {
    /// Next stdout line, or `None` at end of stream.
    pub fn next_line(&mut self) -> Option<Result<String>> {
        self.lines
            .next()
            .map(|line| line.context("read child stdout"))
    }

    /// Wait for the child to exit after stdout reached end of stream.
    pub fn finish(&mut self) -> Result<StreamExit> {
        let status = self.child.wait().context("wait for child")?;
        let (stderr, stderr_truncated) = match self.stderr.take() {
            Some(handle) => join_output(handle).context("join stderr")?,
            None => (Vec::new(), 0),
        };
        if stderr_truncated > 0 {
            warn!(stderr_truncated, "stderr truncated");
        }
        debug!(exit_code = ?status.code(), "child finished");
        Ok(StreamExit {
            status,
            stderr,
            stderr_truncated,
        })
    }
}

impl Drop for StreamingChild {
    fn drop(&mut self) {
        if self.stderr.is_some() {
            // Dropped before `finish`: do not leave the child running.
            if let Err(e) = self.child.kill() {
                debug!(err = %e, "kill child on drop");
            }
            let _ = self.child.wait();
        }
    }
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
