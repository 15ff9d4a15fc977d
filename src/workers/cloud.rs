//! Cloud-resource export worker (cloudlist).
//!
//! Credential material arrives inline in the request, is written to a
//! 0600 provider-config file scoped to the request, and is removed the
//! moment the external command returns, success or not. The credentials
//! are never logged.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_jsonl, RequestContext, Worker};
use crate::error::WorkerError;
use crate::exec::run_command;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudParams {
    #[serde(default)]
    pub provider: String,

    /// Restrict the export to one resource type (e.g. "dns-record").
    #[serde(default)]
    pub resource_type: Option<String>,

    /// Provider credential fields, passed through to the config file.
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
}

/// Long-lived worker wrapping the cloud-resource exporter.
pub struct CloudWorker;

#[async_trait]
impl Worker for CloudWorker {
    type Params = CloudParams;

    const KIND: &'static str = "cloud";

    async fn run(
        &self,
        ctx: &mut RequestContext,
        params: CloudParams,
    ) -> Result<Value, WorkerError> {
        if params.provider.is_empty() {
            return Err(WorkerError::Validation("No provider received".into()));
        }
        if params.credentials.is_empty() {
            return Err(WorkerError::Validation("No credentials received".into()));
        }

        let staging = ctx.stage()?;

        // cloudlist takes a provider block list; one entry per request.
        let mut block = BTreeMap::new();
        block.insert("provider".to_string(), params.provider.clone());
        block.extend(params.credentials.clone());
        let cred_file = staging.write_credentials("provider.yaml", &[block])?;

        let config = ctx.config();
        let mut args = vec![
            "-provider".to_string(),
            params.provider.clone(),
            "-config".to_string(),
            cred_file.display().to_string(),
            "-json".to_string(),
        ];
        if let Some(resource_type) = &params.resource_type {
            args.push("-id".to_string());
            args.push(resource_type.clone());
        }

        let command = run_command(&config.tools.cloudlist, &args, config.limits.cloudlist).await;

        // Scrub the credential file before anything else, including the
        // error path. Staging Drop covers paths that never reach here.
        staging.remove(&cred_file);

        let output = command?;
        let resources = parse_jsonl(ctx, &output.stdout);

        Ok(json!({ "provider": params.provider, "resources": resources }))
    }
}
