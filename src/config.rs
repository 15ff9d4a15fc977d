//! Worker configuration.
//!
//! The supervisor passes configuration via the `RECON_WORKER_CONFIG`
//! environment variable as JSON. Every field has a default, so a partial
//! object (or no variable at all) works.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level configuration for a worker process.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Program paths for the external tools, resolved via PATH by default.
    pub tools: ToolPaths,

    /// Per-tool execution ceilings.
    pub limits: Limits,

    /// Root directory for per-request staging directories.
    pub temp_root: PathBuf,

    /// Root directory for per-request output artifacts (screenshots,
    /// crawl archives).
    pub artifact_root: PathBuf,

    /// Default for whether output artifacts survive the request.
    /// Requests can override this per call.
    pub retain_output: bool,

    /// HTTP prober tuning.
    pub probe: ProbeTuning,

    /// Screenshot tool tuning.
    pub screenshot: ScreenshotTuning,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tools: ToolPaths::default(),
            limits: Limits::default(),
            temp_root: std::env::temp_dir(),
            artifact_root: std::env::temp_dir().join("recon-artifacts"),
            retain_output: false,
            probe: ProbeTuning::default(),
            screenshot: ScreenshotTuning::default(),
        }
    }
}

impl Config {
    /// Load configuration from the `RECON_WORKER_CONFIG` environment
    /// variable. An unset variable means all defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var("RECON_WORKER_CONFIG") {
            Ok(json) => {
                serde_json::from_str(&json).context("Failed to parse RECON_WORKER_CONFIG")
            }
            Err(_) => Ok(Self::default()),
        }
    }

    /// Create a config from a JSON string (for testing).
    #[cfg(test)]
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse JSON")
    }
}

/// Program path per external tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolPaths {
    pub nmap: String,
    pub httpx: String,
    pub rad: String,
    pub gowitness: String,
    pub cloudlist: String,
    pub urldedupe: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            nmap: "nmap".into(),
            httpx: "httpx".into(),
            rad: "rad".into(),
            gowitness: "gowitness".into(),
            cloudlist: "cloudlist".into(),
            urldedupe: "urldedupe".into(),
        }
    }
}

/// Wall-clock and output ceilings for one tool invocation.
#[derive(Debug, Clone, Copy)]
pub struct ExecLimits {
    /// Maximum wall-clock duration in seconds; the tool is killed beyond it.
    pub timeout_seconds: u64,

    /// Combined stdout+stderr ceiling in bytes; the tool is killed beyond it.
    pub max_output_bytes: u64,
}

const MB: u64 = 1024 * 1024;

const fn limits(timeout_seconds: u64, max_output_bytes: u64) -> ExecLimits {
    ExecLimits {
        timeout_seconds,
        max_output_bytes,
    }
}

/// Per-tool execution ceilings.
///
/// Broad scans and crawls get long ceilings and large output caps; tools
/// with small bounded output keep a generous default. Deserialized through
/// an overlay so a partial object overrides one ceiling and keeps the
/// tool's default for the other.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "LimitsOverlay")]
pub struct Limits {
    pub nmap: ExecLimits,
    pub httpx: ExecLimits,
    pub rad: ExecLimits,
    pub gowitness: ExecLimits,
    pub cloudlist: ExecLimits,
    pub urldedupe: ExecLimits,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ExecLimitsOverlay {
    timeout_seconds: Option<u64>,
    max_output_bytes: Option<u64>,
}

impl ExecLimitsOverlay {
    fn over(self, base: ExecLimits) -> ExecLimits {
        ExecLimits {
            timeout_seconds: self.timeout_seconds.unwrap_or(base.timeout_seconds),
            max_output_bytes: self.max_output_bytes.unwrap_or(base.max_output_bytes),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LimitsOverlay {
    nmap: ExecLimitsOverlay,
    httpx: ExecLimitsOverlay,
    rad: ExecLimitsOverlay,
    gowitness: ExecLimitsOverlay,
    cloudlist: ExecLimitsOverlay,
    urldedupe: ExecLimitsOverlay,
}

impl From<LimitsOverlay> for Limits {
    fn from(overlay: LimitsOverlay) -> Self {
        let base = Self::default();
        Self {
            nmap: overlay.nmap.over(base.nmap),
            httpx: overlay.httpx.over(base.httpx),
            rad: overlay.rad.over(base.rad),
            gowitness: overlay.gowitness.over(base.gowitness),
            cloudlist: overlay.cloudlist.over(base.cloudlist),
            urldedupe: overlay.urldedupe.over(base.urldedupe),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            nmap: limits(600, 16 * MB),
            httpx: limits(300, 64 * MB),
            rad: limits(900, 64 * MB),
            gowitness: limits(600, 16 * MB),
            cloudlist: limits(120, 16 * MB),
            urldedupe: limits(60, 64 * MB),
        }
    }
}

/// Flags passed through to the HTTP prober.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbeTuning {
    pub threads: u32,
    pub timeout_seconds: u64,
    pub retries: u32,
}

impl Default for ProbeTuning {
    fn default() -> Self {
        Self {
            threads: 50,
            timeout_seconds: 10,
            retries: 1,
        }
    }
}

/// Flags passed through to the screenshot tool.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScreenshotTuning {
    pub threads: u32,
    pub delay_seconds: u64,
    pub timeout_seconds: u64,
}

impl Default for ScreenshotTuning {
    fn default() -> Self {
        Self {
            threads: 4,
            delay_seconds: 2,
            timeout_seconds: 15,
        }
    }
}
