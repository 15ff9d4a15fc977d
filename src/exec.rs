//! Bounded external-command invocation.
//!
//! Each request runs exactly one external command, synchronously from the
//! worker's perspective. Wall-clock and combined-output ceilings are
//! enforced here; exceeding either kills the child and surfaces the same
//! error shape as a nonzero exit. The raw output never reaches the
//! supervisor — workers always translate it into a payload.

use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::ExecLimits;
use crate::error::WorkerError;

/// How much captured stderr accompanies an execution error.
const STDERR_PREFIX_LEN: usize = 4096;

/// Raw outcome of a completed external command.
#[derive(Debug)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

/// Invoke one external command and capture its output within the ceilings.
///
/// Returns an error for a spawn failure, a nonzero exit (with a stderr
/// prefix attached), a wall-clock timeout, or an exceeded output cap.
/// The last three surface to the supervisor as the same `execution` kind.
pub async fn run_command(
    program: &str,
    args: &[String],
    limits: ExecLimits,
) -> Result<CommandOutput, WorkerError> {
    debug!(program = %program, ?args, "Invoking external command");
    let started = Instant::now();

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| WorkerError::Launch {
            program: program.to_string(),
            source,
        })?;

    let mut stdout = child.stdout.take().context("taking command stdout")?;
    let mut stderr = child.stderr.take().context("taking command stderr")?;

    // Drain both pipes concurrently under a shared byte budget, so a
    // chatty tool trips the cap as soon as it is exceeded. `child` is not
    // moved into this future, so it can be killed on timeout.
    let cap = limits.max_output_bytes;
    let timeout = Duration::from_secs(limits.timeout_seconds);
    let drained = match tokio::time::timeout(timeout, drain_capped(&mut stdout, &mut stderr, cap))
        .await
    {
        Ok(result) => result?,
        Err(_) => {
            let _ = child.kill().await;
            return Err(WorkerError::Timeout {
                program: program.to_string(),
                seconds: limits.timeout_seconds,
            });
        }
    };

    let (stdout_buf, stderr_buf) = match drained {
        Drained::Complete(stdout_buf, stderr_buf) => (stdout_buf, stderr_buf),
        Drained::Capped => {
            let _ = child.kill().await;
            return Err(WorkerError::OutputLimit {
                program: program.to_string(),
                limit_bytes: cap,
            });
        }
    };

    // EOF on both pipes does not mean the child exited; a tool that closes
    // its fds (or leaks them to a grandchild) and keeps running must still
    // hit the wall-clock ceiling here.
    let remaining = timeout.saturating_sub(started.elapsed());
    let status = match tokio::time::timeout(remaining, child.wait()).await {
        Ok(status) => status.context("waiting for external command")?,
        Err(_) => {
            let _ = child.kill().await;
            return Err(WorkerError::Timeout {
                program: program.to_string(),
                seconds: limits.timeout_seconds,
            });
        }
    };
    let duration = started.elapsed();
    let exit_code = status.code().unwrap_or(-1);

    if exit_code != 0 {
        return Err(WorkerError::Execution {
            program: program.to_string(),
            exit_code,
            stderr_prefix: stderr_prefix(&stderr_buf),
        });
    }

    debug!(
        program = %program,
        exit_code,
        stdout_len = stdout_buf.len(),
        elapsed_ms = duration.as_millis() as u64,
        "External command completed"
    );

    Ok(CommandOutput {
        exit_code,
        stdout: stdout_buf,
        stderr: stderr_buf,
        duration,
    })
}

/// Outcome of draining a command's pipes.
enum Drained {
    /// Both streams reached EOF within the budget.
    Complete(Vec<u8>, Vec<u8>),
    /// The combined output exceeded the cap; the child must be killed.
    Capped,
}

/// Read both pipes to EOF, stopping early once the combined size passes
/// `cap`.
async fn drain_capped<O, E>(stdout: &mut O, stderr: &mut E, cap: u64) -> anyhow::Result<Drained>
where
    O: tokio::io::AsyncRead + Unpin,
    E: tokio::io::AsyncRead + Unpin,
{
    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();
    let mut stdout_done = false;
    let mut stderr_done = false;
    let mut chunk_out = [0u8; 8192];
    let mut chunk_err = [0u8; 8192];

    while !(stdout_done && stderr_done) {
        tokio::select! {
            read = stdout.read(&mut chunk_out), if !stdout_done => {
                let n = read.context("reading command stdout")?;
                if n == 0 {
                    stdout_done = true;
                } else {
                    stdout_buf.extend_from_slice(&chunk_out[..n]);
                }
            }
            read = stderr.read(&mut chunk_err), if !stderr_done => {
                let n = read.context("reading command stderr")?;
                if n == 0 {
                    stderr_done = true;
                } else {
                    stderr_buf.extend_from_slice(&chunk_err[..n]);
                }
            }
        }

        if stdout_buf.len() as u64 + stderr_buf.len() as u64 > cap {
            return Ok(Drained::Capped);
        }
    }

    Ok(Drained::Complete(stdout_buf, stderr_buf))
}

fn stderr_prefix(stderr: &[u8]) -> String {
    let end = stderr.len().min(STDERR_PREFIX_LEN);
    String::from_utf8_lossy(&stderr[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn test_limits(timeout_seconds: u64, max_output_bytes: u64) -> ExecLimits {
        ExecLimits {
            timeout_seconds,
            max_output_bytes,
        }
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn captures_stdout_on_success() {
        let out = run_command("/bin/sh", &sh("printf hello"), test_limits(10, 1024))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout, b"hello");
        assert!(out.stderr.is_empty());
    }

    #[tokio::test]
    async fn empty_output_is_success() {
        let out = run_command("/bin/sh", &sh("true"), test_limits(10, 1024))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 0);
        assert!(out.stdout.is_empty());
    }

    #[tokio::test]
    async fn nonzero_exit_carries_stderr_prefix() {
        let err = run_command(
            "/bin/sh",
            &sh("echo scan failed >&2; exit 3"),
            test_limits(10, 1024),
        )
        .await
        .unwrap_err();
        match err {
            WorkerError::Execution {
                exit_code,
                stderr_prefix,
                ..
            } => {
                assert_eq!(exit_code, 3);
                assert!(stderr_prefix.contains("scan failed"));
            }
            other => panic!("expected execution error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn spawn_failure_is_launch_error() {
        let err = run_command(
            "/nonexistent/recon-tool",
            &[],
            test_limits(10, 1024),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, WorkerError::Launch { .. }));
        assert_eq!(err.kind(), "launch");
    }

    #[tokio::test]
    async fn timeout_kills_and_names_the_ceiling() {
        let started = Instant::now();
        let err = run_command("/bin/sh", &sh("sleep 30"), test_limits(1, 1024))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Timeout { seconds: 1, .. }));
        assert!(err.to_string().contains("timed out"));
        // No hang beyond the ceiling plus a small fixed overhead
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn timeout_applies_after_pipes_close() {
        // Tool closes stdout/stderr and keeps running; EOF must not bypass
        // the ceiling.
        let started = Instant::now();
        let err = run_command(
            "/bin/sh",
            &sh("exec 1>&- 2>&-; sleep 30"),
            test_limits(1, 1024),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, WorkerError::Timeout { seconds: 1, .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn output_cap_kills_chatty_command() {
        let err = run_command(
            "/bin/sh",
            &sh("head -c 100000 /dev/zero"),
            test_limits(10, 1024),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, WorkerError::OutputLimit { limit_bytes: 1024, .. }));
        assert_eq!(err.kind(), "execution");
    }
}
