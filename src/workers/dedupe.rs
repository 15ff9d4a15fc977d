//! URL de-duplication worker (urldedupe).
//!
//! Both the input list and the output file are staged; the tool always
//! writes its output file, so an absent file after a zero exit is a
//! total parse failure, not an empty result.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{RequestContext, Worker};
use crate::error::WorkerError;
use crate::exec::run_command;

#[derive(Debug, Deserialize)]
pub struct DedupeParams {
    #[serde(default)]
    pub urls: Vec<String>,
}

/// Long-lived worker wrapping the URL de-duplicator.
pub struct DedupeWorker;

#[async_trait]
impl Worker for DedupeWorker {
    type Params = DedupeParams;

    const KIND: &'static str = "dedupe";

    async fn run(
        &self,
        ctx: &mut RequestContext,
        params: DedupeParams,
    ) -> Result<Value, WorkerError> {
        if params.urls.is_empty() {
            return Err(WorkerError::Validation("No urls received".into()));
        }

        let staging = ctx.stage()?;
        let input_file = staging.write_lines("urls.txt", &params.urls)?;
        let output_file = staging.file_path("deduped.txt");

        let config = ctx.config();
        let args = vec![
            "-u".to_string(),
            input_file.display().to_string(),
            "-o".to_string(),
            output_file.display().to_string(),
        ];

        run_command(&config.tools.urldedupe, &args, config.limits.urldedupe).await?;

        let body = std::fs::read_to_string(&output_file).map_err(|_| {
            WorkerError::MissingOutput(format!(
                "deduplicated output file {}",
                output_file.display()
            ))
        })?;

        let urls: Vec<String> = body
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect();

        Ok(json!({ "urls": urls }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::{test_context, RequestContext};
    use std::fs;
    use std::sync::Arc;

    #[cfg(unix)]
    fn fake_urldedupe(dir: &std::path::Path, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("urldedupe");
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    fn ctx_with_tool(root: &std::path::Path, tool: String) -> RequestContext {
        let base = test_context(root);
        let mut config = base.config().clone();
        config.tools.urldedupe = tool;
        RequestContext::new("testreq1".into(), Arc::new(config))
    }

    #[tokio::test]
    async fn missing_urls_is_validation_error() {
        let root = tempfile::tempdir().unwrap();
        let mut ctx = test_context(root.path());
        let err = DedupeWorker
            .run(&mut ctx, DedupeParams { urls: vec![] })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No urls received");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dedupes_through_staged_files() {
        let bin = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        // Stand-in: sort -u the input into the output
        let tool = fake_urldedupe(
            bin.path(),
            "#!/bin/sh\nin=\"\"\nout=\"\"\nwhile [ $# -gt 0 ]; do\n  case \"$1\" in\n    -u) in=\"$2\"; shift 2 ;;\n    -o) out=\"$2\"; shift 2 ;;\n    *) shift ;;\n  esac\ndone\nsort -u \"$in\" > \"$out\"\n",
        );
        let mut ctx = ctx_with_tool(root.path(), tool);

        let payload = DedupeWorker
            .run(
                &mut ctx,
                DedupeParams {
                    urls: vec![
                        "http://a.example.com/".into(),
                        "http://a.example.com/".into(),
                        "http://b.example.com/".into(),
                    ],
                },
            )
            .await
            .unwrap();

        assert_eq!(
            payload["urls"],
            json!(["http://a.example.com/", "http://b.example.com/"])
        );
        assert!(fs::read_dir(root.path()).unwrap().next().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn absent_output_file_is_missing_output() {
        let bin = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        // Tool exits 0 without writing the output file
        let tool = fake_urldedupe(bin.path(), "#!/bin/sh\nexit 0\n");
        let mut ctx = ctx_with_tool(root.path(), tool);

        let err = DedupeWorker
            .run(
                &mut ctx,
                DedupeParams {
                    urls: vec!["http://a.example.com/".into()],
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::MissingOutput(_)));
        assert_eq!(err.kind(), "execution");
    }
}
