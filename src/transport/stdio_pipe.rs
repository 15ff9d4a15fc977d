//! Stdin/stdout pipe transport for worker processes.
//!
//! Owns a child worker process, communicates via length-prefixed JSON on
//! the child's stdin (requests) and stdout (responses). Worker logging
//! goes to stderr, which is inherited so it reaches the supervisor's log.
//! Mutex-guarded for safe concurrent access from multiple callers.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::protocol::{RequestEnvelope, WorkerResponse};
use super::{recv_message, send_message, Transport};

/// How long to wait for a worker to exit after its stdin is closed
/// before killing it outright.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport that communicates with a worker via stdin/stdout pipes.
///
/// The worker process is spawned once and kept alive until `shutdown()`.
/// Each `request()` call acquires both stdin and stdout mutexes to ensure
/// atomic send/receive (no interleaving from concurrent callers).
pub struct StdioPipeTransport {
    child: Mutex<Child>,
    /// `None` once stdin has been closed during shutdown.
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<ChildStdout>,
    alive: AtomicBool,
}

impl StdioPipeTransport {
    /// Spawn a worker process and wait for its ready signal.
    ///
    /// `program` and `args` select the worker binary and kind;
    /// `ready_timeout` bounds the wait for the ready envelope; `envs`
    /// are extra environment variables for the child (configuration).
    pub async fn spawn(
        program: &str,
        args: &[&str],
        ready_timeout: Duration,
        envs: &[(&str, String)],
    ) -> Result<Self> {
        debug!(program = %program, ?args, "Spawning worker process");

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        for (key, value) in envs {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn worker: {program}"))?;

        let stdin = child.stdin.take().context("Failed to take worker stdin")?;
        let mut stdout = child.stdout.take().context("Failed to take worker stdout")?;

        // Wait for the worker's ready signal
        let ready_result = tokio::time::timeout(ready_timeout, recv_message(&mut stdout)).await;

        let ready_bytes = ready_result
            .map_err(|_| anyhow::anyhow!("Worker did not signal ready within {ready_timeout:?}"))?
            .context("Failed to read worker ready signal")?;

        let ready_msg: WorkerResponse = serde_json::from_slice(&ready_bytes)
            .context("Failed to parse worker ready signal")?;

        match ready_msg {
            WorkerResponse::Ready => {
                debug!("Worker is ready");
            }
            other => {
                anyhow::bail!("Expected ready signal, got: {other:?}");
            }
        }

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(Some(stdin)),
            stdout: Mutex::new(stdout),
            alive: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl Transport for StdioPipeTransport {
    async fn request(&self, req: &RequestEnvelope) -> Result<WorkerResponse> {
        if !self.alive.load(Ordering::Relaxed) {
            anyhow::bail!("Worker process is not alive");
        }

        // Acquire both locks for atomic send/receive
        let mut stdin = self.stdin.lock().await;
        let mut stdout = self.stdout.lock().await;

        let stdin = stdin
            .as_mut()
            .context("Worker stdin already closed")?;

        let req_bytes = serde_json::to_vec(req).context("Failed to serialize request")?;
        send_message(stdin, &req_bytes)
            .await
            .context("Failed to send request to worker")?;

        let resp_bytes = recv_message(&mut *stdout)
            .await
            .context("Failed to read response from worker")?;

        let resp: WorkerResponse =
            serde_json::from_slice(&resp_bytes).context("Failed to parse worker response")?;

        Ok(resp)
    }

    async fn shutdown(&self) -> Result<()> {
        if !self.alive.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.alive.store(false, Ordering::Relaxed);

        // Closing stdin lets the worker observe the channel-closed event
        // and exit on its own.
        drop(self.stdin.lock().await.take());

        let mut child = self.child.lock().await;
        match tokio::time::timeout(DRAIN_TIMEOUT, child.wait()).await {
            Ok(status) => {
                debug!(status = ?status.ok(), "Worker process exited");
            }
            Err(_) => {
                warn!("Worker did not exit after stdin close, killing");
                let _ = child.kill().await;
                let _ = child.wait().await;
            }
        }

        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }
}
