//! Screenshot worker (gowitness).
//!
//! Stages the URL list, points the tool's image directory at the
//! request's artifact directory, and reads the JSON-lines report back
//! from staging. The report file is consumed and deleted; the images
//! survive or not per the retention flag.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_jsonl, RequestContext, Worker};
use crate::error::WorkerError;
use crate::exec::run_command;
use crate::staging::discard_artifacts;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotParams {
    #[serde(default)]
    pub urls: Vec<String>,

    /// Whether the image directory survives the request.
    /// Defaults from config when absent.
    #[serde(default)]
    pub retain_output: Option<bool>,
}

/// Long-lived worker wrapping the screenshot tool.
pub struct ScreenshotWorker;

#[async_trait]
impl Worker for ScreenshotWorker {
    type Params = ScreenshotParams;

    const KIND: &'static str = "screenshot";

    async fn run(
        &self,
        ctx: &mut RequestContext,
        params: ScreenshotParams,
    ) -> Result<Value, WorkerError> {
        if params.urls.is_empty() {
            return Err(WorkerError::Validation("No urls received".into()));
        }

        let staging = ctx.stage()?;
        let url_file = staging.write_lines("urls.txt", &params.urls)?;
        let report_file = staging.file_path("report.jsonl");
        let image_dir = ctx.artifacts()?;

        let config = ctx.config();
        let args = vec![
            "file".to_string(),
            "-f".to_string(),
            url_file.display().to_string(),
            "--threads".to_string(),
            config.screenshot.threads.to_string(),
            "--delay".to_string(),
            config.screenshot.delay_seconds.to_string(),
            "--timeout".to_string(),
            config.screenshot.timeout_seconds.to_string(),
            "-P".to_string(),
            image_dir.display().to_string(),
            "--write-jsonl".to_string(),
            "--write-jsonl-file".to_string(),
            report_file.display().to_string(),
        ];

        let command = run_command(
            &config.tools.gowitness,
            &args,
            config.limits.gowitness,
        )
        .await;
        let retain = params.retain_output.unwrap_or(config.retain_output);

        if let Err(err) = command {
            discard_artifacts(&image_dir);
            return Err(err);
        }

        // A missing report means no page could be captured.
        let report = std::fs::read(&report_file).unwrap_or_default();
        let screenshots: Vec<Value> = parse_jsonl(ctx, &report)
            .into_iter()
            .filter_map(|record| {
                let url = record.get("url").and_then(Value::as_str)?;
                let file = record.get("filename").and_then(Value::as_str)?;
                Some(json!({ "url": url, "file": file }))
            })
            .collect();

        if retain {
            Ok(json!({
                "screenshots": screenshots,
                "imageDir": image_dir.display().to_string(),
            }))
        } else {
            discard_artifacts(&image_dir);
            Ok(json!({ "screenshots": screenshots }))
        }
    }
}
