//! Worker implementations, one per external reconnaissance tool.
//!
//! A worker validates its parameters, stages input files, builds the
//! tool's fixed command line, runs it through the bounded executor, and
//! translates the output into a structured payload. The lifecycle loop in
//! [`crate::runtime`] is the same for every kind.

pub mod cloud;
pub mod crawler;
pub mod dedupe;
pub mod portscan;
pub mod probe;
pub mod screenshot;

pub use cloud::CloudWorker;
pub use crawler::CrawlerWorker;
pub use dedupe::DedupeWorker;
pub use portscan::PortScanWorker;
pub use probe::ProbeWorker;
pub use screenshot::ScreenshotWorker;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::config::Config;
use crate::error::WorkerError;
use crate::staging::{artifact_dir, Staging};

/// One worker kind: parameter contract plus request handling.
///
/// `run` returns the tool payload that is flattened into the success
/// envelope's metadata block; every failure path returns a
/// [`WorkerError`] and the runtime turns it into an error envelope.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Parameters deserialized from the request envelope, validated
    /// before any command runs or file is staged.
    type Params: DeserializeOwned + Send + 'static;

    /// Kind name used in logs and CLI dispatch.
    const KIND: &'static str;

    /// One-shot workers process exactly one request then exit.
    fn one_shot(&self) -> bool {
        false
    }

    /// Handle one request end to end.
    async fn run(
        &self,
        ctx: &mut RequestContext,
        params: Self::Params,
    ) -> Result<serde_json::Value, WorkerError>;
}

/// Per-request state handed to a worker: correlation id, configuration,
/// and the warning sink for partial parse failures.
pub struct RequestContext {
    request_id: String,
    config: Arc<Config>,
    warnings: u32,
}

impl RequestContext {
    pub fn new(request_id: String, config: Arc<Config>) -> Self {
        Self {
            request_id,
            config,
            warnings: 0,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create the staging directory for this request.
    pub fn stage(&self) -> Result<Staging, WorkerError> {
        Staging::create(&self.config.temp_root, &self.request_id)
    }

    /// Create the artifact directory for this request.
    pub fn artifacts(&self) -> Result<PathBuf, WorkerError> {
        artifact_dir(&self.config.artifact_root, &self.request_id)
    }

    /// Record a non-fatal warning (skipped output record).
    pub fn warn(&mut self, message: &str) {
        warn!(request_id = %self.request_id, detail = %message, "Skipping output record");
        self.warnings += 1;
    }

    pub fn warning_count(&self) -> u32 {
        self.warnings
    }
}

/// Parse line-delimited JSON records.
///
/// Blank lines are ignored; a line that fails to parse is skipped with a
/// warning rather than aborting the batch. An empty input yields an empty
/// collection.
pub fn parse_jsonl(ctx: &mut RequestContext, data: &[u8]) -> Vec<serde_json::Value> {
    let text = String::from_utf8_lossy(data);
    let mut records = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(value) => records.push(value),
            Err(err) => {
                let preview: String = line.chars().take(80).collect();
                ctx.warn(&format!("unparsable JSON line ({err}): {preview}"));
            }
        }
    }
    records
}

#[cfg(test)]
pub(crate) fn test_context(temp_root: &std::path::Path) -> RequestContext {
    let config = Config {
        temp_root: temp_root.to_path_buf(),
        artifact_root: temp_root.join("artifacts"),
        ..Config::default()
    };
    RequestContext::new("testreq1".to_string(), Arc::new(config))
}
