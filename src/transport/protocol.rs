//! Envelope types exchanged between the supervisor and a worker.
//!
//! Length-prefixed JSON protocol; messages are framed as
//! [4-byte BE length][JSON payload]. Field names are camelCase on the
//! wire to match the platform's existing supervisor.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

/// Request sent from supervisor to worker.
///
/// Tool-specific parameter fields ride alongside the optional correlation
/// id; they are deserialized into the worker's own parameter type after
/// the id has been secured, so even a malformed request can be answered
/// with a correlated error envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Correlation id. Generated worker-side when absent.
    #[serde(
        default,
        rename = "requestId",
        skip_serializing_if = "Option::is_none"
    )]
    pub request_id: Option<String>,

    /// Tool-specific parameter fields.
    #[serde(flatten)]
    pub params: serde_json::Value,
}

/// Response sent from worker to supervisor.
///
/// Exactly one `Success` or `Error` is produced per request; `Ready` is
/// sent once at startup before any request is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WorkerResponse {
    /// Worker is ready to accept requests (sent on startup).
    Ready,
    /// The request completed and produced a payload.
    Success { metadata: ResponseMetadata },
    /// The request failed; the worker stays usable.
    Error {
        error: ErrorDetail,
        #[serde(rename = "requestId")]
        request_id: String,
    },
}

/// Metadata block of a success envelope. The tool payload is flattened
/// into it alongside the timing fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    /// End-to-end handling time in seconds.
    pub execution_time: f64,

    /// Correlation id of the request this answers.
    pub request_id: String,

    /// Number of output records skipped with a warning (partial parse
    /// failures never abort a batch).
    #[serde(default)]
    pub warnings: u32,

    /// Tool-specific payload fields.
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

/// Structured error block of an error envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    /// Rendered error-source chain.
    pub stack: String,
    /// Taxonomy kind: validation | launch | execution | internal.
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<&WorkerError> for ErrorDetail {
    fn from(err: &WorkerError) -> Self {
        Self {
            message: err.to_string(),
            stack: err.stack(),
            kind: err.kind().to_string(),
        }
    }
}

impl WorkerResponse {
    /// Build a success envelope from a handled request.
    pub fn success(
        request_id: String,
        elapsed: Duration,
        warnings: u32,
        payload: serde_json::Value,
    ) -> Self {
        Self::Success {
            metadata: ResponseMetadata {
                execution_time: elapsed.as_secs_f64(),
                request_id,
                warnings,
                payload,
            },
        }
    }

    /// Build an error envelope from a request-level failure.
    pub fn error(request_id: String, err: &WorkerError) -> Self {
        Self::Error {
            error: ErrorDetail::from(err),
            request_id,
        }
    }

    /// Correlation id carried by this response, if any.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Ready => None,
            Self::Success { metadata } => Some(&metadata.request_id),
            Self::Error { request_id, .. } => Some(request_id),
        }
    }
}

/// Generate a short correlation id for requests that arrived without one.
pub fn generate_request_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}
