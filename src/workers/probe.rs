//! HTTP/HTTPS prober worker (httpx).
//!
//! Stages the host list one per line, runs httpx with JSON-lines output,
//! and reports the probed URLs. Unparsable output lines are skipped with
//! a warning; partial success is acceptable for this tool class.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_jsonl, RequestContext, Worker};
use crate::error::WorkerError;
use crate::exec::run_command;

#[derive(Debug, Deserialize)]
pub struct ProbeParams {
    #[serde(default)]
    pub hosts: Vec<String>,
}

/// Long-lived worker wrapping the HTTP prober.
pub struct ProbeWorker;

#[async_trait]
impl Worker for ProbeWorker {
    type Params = ProbeParams;

    const KIND: &'static str = "probe";

    async fn run(
        &self,
        ctx: &mut RequestContext,
        params: ProbeParams,
    ) -> Result<Value, WorkerError> {
        if params.hosts.is_empty() {
            return Err(WorkerError::Validation("No hosts received".into()));
        }

        let staging = ctx.stage()?;
        let host_file = staging.write_lines("hosts.txt", &params.hosts)?;

        let config = ctx.config();
        let args = vec![
            "-l".to_string(),
            host_file.display().to_string(),
            "-json".to_string(),
            "-silent".to_string(),
            "-no-color".to_string(),
            "-timeout".to_string(),
            config.probe.timeout_seconds.to_string(),
            "-threads".to_string(),
            config.probe.threads.to_string(),
            "-retries".to_string(),
            config.probe.retries.to_string(),
        ];

        let output = run_command(&config.tools.httpx, &args, config.limits.httpx).await?;

        let results: Vec<String> = parse_jsonl(ctx, &output.stdout)
            .into_iter()
            .filter_map(|record| {
                record
                    .get("url")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            })
            .collect();

        Ok(json!({ "results": results }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::test_context;
    use std::fs;

    /// Install an executable stand-in for httpx that prints `body`.
    #[cfg(unix)]
    fn fake_httpx(dir: &std::path::Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("httpx");
        fs::write(&path, format!("#!/bin/sh\ncat <<'EOF'\n{body}\nEOF\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[tokio::test]
    async fn missing_hosts_fails_before_any_staging() {
        let root = tempfile::tempdir().unwrap();
        let mut ctx = test_context(root.path());

        let err = ProbeWorker
            .run(&mut ctx, ProbeParams { hosts: vec![] })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "No hosts received");
        assert_eq!(err.kind(), "validation");
        // No staged temp file was ever created
        assert!(fs::read_dir(root.path()).unwrap().next().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn parses_jsonl_and_skips_garbage() {
        let bin = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let httpx = fake_httpx(
            bin.path(),
            "{\"url\":\"http://a.example.com\"}\nthis line is garbage",
        );

        let base = test_context(root.path());
        let mut config = base.config().clone();
        config.tools.httpx = httpx;
        let mut ctx = RequestContext::new("testreq1".into(), std::sync::Arc::new(config));

        let payload = ProbeWorker
            .run(
                &mut ctx,
                ProbeParams {
                    hosts: vec!["a.example.com".into(), "b.example.com".into()],
                },
            )
            .await
            .unwrap();

        assert_eq!(payload["results"], json!(["http://a.example.com"]));
        assert_eq!(ctx.warning_count(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn empty_tool_output_is_empty_results() {
        let bin = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let httpx = fake_httpx(bin.path(), "");

        let base = test_context(root.path());
        let mut config = base.config().clone();
        config.tools.httpx = httpx;
        let mut ctx = RequestContext::new("testreq1".into(), std::sync::Arc::new(config));

        let payload = ProbeWorker
            .run(
                &mut ctx,
                ProbeParams {
                    hosts: vec!["a.example.com".into()],
                },
            )
            .await
            .unwrap();

        assert_eq!(payload["results"], json!([]));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn staged_host_file_is_gone_after_run() {
        let bin = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let httpx = fake_httpx(bin.path(), "");

        let base = test_context(root.path());
        let mut config = base.config().clone();
        config.tools.httpx = httpx;
        let mut ctx = RequestContext::new("testreq1".into(), std::sync::Arc::new(config));

        ProbeWorker
            .run(
                &mut ctx,
                ProbeParams {
                    hosts: vec!["a.example.com".into()],
                },
            )
            .await
            .unwrap();

        assert!(fs::read_dir(root.path()).unwrap().next().is_none());
    }
}
