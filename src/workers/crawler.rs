//! Web-crawler worker (rad).
//!
//! Stages the URL list plus optional YAML rule files (crawl, form-fill,
//! field extraction), passes auth headers through, and archives raw
//! responses under the request's artifact directory. Discovered URLs are
//! read back from the tool's text output file, which is consumed and
//! deleted with the rest of the staging directory.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{RequestContext, Worker};
use crate::error::WorkerError;
use crate::exec::run_command;
use crate::staging::discard_artifacts;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerParams {
    #[serde(default)]
    pub urls: Vec<String>,

    /// Crawl behavior rules, serialized to YAML for the tool.
    #[serde(default)]
    pub crawl_rules: Option<Value>,

    /// Form-fill rules.
    #[serde(default)]
    pub form_rules: Option<Value>,

    /// Field extraction rules.
    #[serde(default)]
    pub field_rules: Option<Value>,

    /// Extra request headers (authentication).
    #[serde(default)]
    pub auth_headers: BTreeMap<String, String>,

    /// Whether the response archive survives the request.
    /// Defaults from config when absent.
    #[serde(default)]
    pub retain_output: Option<bool>,
}

/// Long-lived worker wrapping the crawler.
pub struct CrawlerWorker;

#[async_trait]
impl Worker for CrawlerWorker {
    type Params = CrawlerParams;

    const KIND: &'static str = "crawler";

    async fn run(
        &self,
        ctx: &mut RequestContext,
        params: CrawlerParams,
    ) -> Result<Value, WorkerError> {
        if params.urls.is_empty() {
            return Err(WorkerError::Validation("No urls received".into()));
        }

        let staging = ctx.stage()?;
        let url_file = staging.write_lines("urls.txt", &params.urls)?;
        let result_file = staging.file_path("result.txt");
        let archive = ctx.artifacts()?;

        let config = ctx.config();
        let mut args = vec![
            "--url-file".to_string(),
            url_file.display().to_string(),
            "--text-output".to_string(),
            result_file.display().to_string(),
            "--archive-dir".to_string(),
            archive.display().to_string(),
        ];

        // Each rule set gets its own YAML file; the flag is omitted
        // entirely when the rule set is absent.
        if let Some(rules) = &params.crawl_rules {
            let path = staging.write_yaml("crawl.yaml", rules)?;
            args.push("--config".to_string());
            args.push(path.display().to_string());
        }
        if let Some(rules) = &params.form_rules {
            let path = staging.write_yaml("form.yaml", rules)?;
            args.push("--form-config".to_string());
            args.push(path.display().to_string());
        }
        if let Some(rules) = &params.field_rules {
            let path = staging.write_yaml("field.yaml", rules)?;
            args.push("--field-config".to_string());
            args.push(path.display().to_string());
        }
        for (name, value) in &params.auth_headers {
            args.push("--http-header".to_string());
            args.push(format!("{name}: {value}"));
        }

        let command = run_command(&config.tools.rad, &args, config.limits.rad).await;
        let retain = params.retain_output.unwrap_or(config.retain_output);

        if let Err(err) = command {
            discard_artifacts(&archive);
            return Err(err);
        }

        // A missing result file means the crawl found nothing.
        let results: Vec<String> = match std::fs::read_to_string(&result_file) {
            Ok(body) => body
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_owned)
                .collect(),
            Err(_) => Vec::new(),
        };

        if retain {
            Ok(json!({
                "results": results,
                "archiveDir": archive.display().to_string(),
            }))
        } else {
            discard_artifacts(&archive);
            Ok(json!({ "results": results }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::{test_context, RequestContext};
    use std::fs;
    use std::sync::Arc;

    /// Stand-in crawler: writes one discovered URL to the --text-output
    /// path and one archived response under --archive-dir.
    #[cfg(unix)]
    fn fake_rad(dir: &std::path::Path) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("rad");
        let script = r#"#!/bin/sh
out=""
archive=""
while [ $# -gt 0 ]; do
  case "$1" in
    --text-output) out="$2"; shift 2 ;;
    --archive-dir) archive="$2"; shift 2 ;;
    *) shift ;;
  esac
done
echo "http://a.example.com/login" > "$out"
echo "response body" > "$archive/0001.txt"
"#;
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    fn ctx_with_rad(root: &std::path::Path, rad: String) -> RequestContext {
        let base = test_context(root);
        let mut config = base.config().clone();
        config.tools.rad = rad;
        RequestContext::new("testreq1".into(), Arc::new(config))
    }

    #[tokio::test]
    async fn missing_urls_is_validation_error() {
        let root = tempfile::tempdir().unwrap();
        let mut ctx = test_context(root.path());
        let err = CrawlerWorker
            .run(
                &mut ctx,
                serde_json::from_str::<CrawlerParams>("{}").unwrap(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No urls received");
        assert!(fs::read_dir(root.path()).unwrap().next().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reads_results_and_discards_archive_by_default() {
        let bin = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let mut ctx = ctx_with_rad(root.path(), fake_rad(bin.path()));

        let params: CrawlerParams =
            serde_json::from_str(r#"{"urls":["http://a.example.com"]}"#).unwrap();
        let payload = CrawlerWorker.run(&mut ctx, params).await.unwrap();

        assert_eq!(payload["results"], json!(["http://a.example.com/login"]));
        assert!(payload.get("archiveDir").is_none());
        // Archive was discarded, staging removed
        assert!(!root.path().join("artifacts").join("testreq1").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn retained_archive_is_reported_by_path() {
        let bin = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let mut ctx = ctx_with_rad(root.path(), fake_rad(bin.path()));

        let params: CrawlerParams = serde_json::from_str(
            r#"{"urls":["http://a.example.com"],"retainOutput":true}"#,
        )
        .unwrap();
        let payload = CrawlerWorker.run(&mut ctx, params).await.unwrap();

        let archive = payload["archiveDir"].as_str().unwrap();
        assert!(std::path::Path::new(archive).join("0001.txt").exists());
    }

    #[test]
    fn rule_params_deserialize_camel_case() {
        let params: CrawlerParams = serde_json::from_str(
            r#"{"urls":["u"],"crawlRules":{"depth":3},"authHeaders":{"Cookie":"s=1"}}"#,
        )
        .unwrap();
        assert!(params.crawl_rules.is_some());
        assert_eq!(params.auth_headers["Cookie"], "s=1");
        assert!(params.form_rules.is_none());
    }
}
