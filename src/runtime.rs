//! Worker lifecycle loop.
//!
//! `Starting → Ready → Processing → Ready` for long-lived workers,
//! `Starting → Ready → Processing → Terminated` for one-shot workers.
//! One request is in flight at a time: the next envelope is read only
//! after the previous response has been flushed, so early requests queue
//! in the pipe and responses keep arrival order. Exactly one response is
//! produced per request; request-level failures of every kind become
//! error envelopes and never terminate the process.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::WorkerError;
use crate::transport::protocol::{generate_request_id, RequestEnvelope, WorkerResponse};
use crate::transport::{recv_message, send_message};
use crate::workers::{RequestContext, Worker};

/// Run a worker over the process's stdin/stdout. Returns the exit code.
pub async fn run<W: Worker>(worker: W, config: Config) -> Result<i32> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    serve(worker, config, stdin, stdout).await
}

/// Run the lifecycle loop over arbitrary channels (tests drive this with
/// an in-memory duplex).
pub async fn serve<W, R, Wt>(
    worker: W,
    config: Config,
    mut reader: R,
    mut writer: Wt,
) -> Result<i32>
where
    W: Worker,
    R: AsyncRead + Unpin,
    Wt: AsyncWrite + Unpin,
{
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;

    let worker = Arc::new(worker);
    let config = Arc::new(config);

    // Handlers are registered; the worker may now announce itself.
    let ready = serde_json::to_vec(&WorkerResponse::Ready)?;
    send_message(&mut writer, &ready)
        .await
        .context("sending ready signal")?;
    info!(worker = W::KIND, "Worker ready");

    loop {
        let frame = tokio::select! {
            _ = sigterm.recv() => {
                info!(worker = W::KIND, "Received termination signal, exiting");
                return Ok(0);
            }
            _ = sigint.recv() => {
                info!(worker = W::KIND, "Received interrupt signal, exiting");
                return Ok(0);
            }
            frame = recv_message(&mut reader) => frame,
        };

        let bytes = match frame {
            Ok(bytes) => bytes,
            Err(err) => {
                // Parent channel closed. For a one-shot worker this is the
                // natural end of its single-message lifecycle; for a
                // long-lived worker it is abnormal termination.
                if worker.one_shot() {
                    info!(worker = W::KIND, "Request channel closed");
                    return Ok(0);
                }
                warn!(worker = W::KIND, error = %err, "Lost connection to supervisor");
                return Ok(1);
            }
        };

        // A termination signal during processing aborts the handler task,
        // which kills any in-flight external command with it.
        let response = tokio::select! {
            _ = sigterm.recv() => {
                info!(worker = W::KIND, "Received termination signal, aborting request");
                return Ok(0);
            }
            _ = sigint.recv() => {
                info!(worker = W::KIND, "Received interrupt signal, aborting request");
                return Ok(0);
            }
            response = handle_frame(&worker, &config, bytes) => response,
        };

        let failed = matches!(response, WorkerResponse::Error { .. });
        let payload = serde_json::to_vec(&response)?;
        send_message(&mut writer, &payload)
            .await
            .context("sending response")?;

        if worker.one_shot() {
            return Ok(i32::from(failed));
        }
    }
}

/// Handle one framed request, producing exactly one response.
async fn handle_frame<W: Worker>(
    worker: &Arc<W>,
    config: &Arc<Config>,
    bytes: Vec<u8>,
) -> WorkerResponse {
    let envelope: RequestEnvelope = match serde_json::from_slice(&bytes) {
        Ok(envelope) => envelope,
        Err(err) => {
            // No correlation id to recover; generate one so the parent
            // still gets a well-formed error envelope.
            let err = WorkerError::Validation(format!("malformed request envelope: {err}"));
            return WorkerResponse::error(generate_request_id(), &err);
        }
    };

    let request_id = envelope.request_id.unwrap_or_else(generate_request_id);
    info!(request_id = %request_id, worker = W::KIND, "Processing request");
    let started = Instant::now();

    let params: W::Params = match serde_json::from_value(envelope.params) {
        Ok(params) => params,
        Err(err) => {
            let err = WorkerError::Validation(format!("invalid parameters: {err}"));
            error!(request_id = %request_id, error = %err, "Rejected request");
            return WorkerResponse::error(request_id, &err);
        }
    };

    // The handler runs on its own task so a panic is contained here
    // instead of tearing the process down.
    let mut ctx = RequestContext::new(request_id.clone(), Arc::clone(config));
    let task_worker = Arc::clone(worker);
    let mut task = AbortOnDrop(tokio::spawn(async move {
        let result = task_worker.run(&mut ctx, params).await;
        (result, ctx)
    }));

    match (&mut task.0).await {
        Ok((Ok(payload), ctx)) => {
            info!(
                request_id = %request_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                warnings = ctx.warning_count(),
                "Request succeeded"
            );
            WorkerResponse::success(request_id, started.elapsed(), ctx.warning_count(), payload)
        }
        Ok((Err(err), _ctx)) => {
            error!(request_id = %request_id, error = %err, kind = err.kind(), "Request failed");
            WorkerResponse::error(request_id, &err)
        }
        Err(join_err) => {
            let err =
                WorkerError::Internal(anyhow::anyhow!("request handler panicked: {join_err}"));
            error!(request_id = %request_id, error = %err, "Request handler panicked");
            WorkerResponse::error(request_id, &err)
        }
    }
}

/// Aborts the handler task when the enclosing future is dropped, so an
/// external command cannot outlive a cancelled request.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
