//! Request-level error taxonomy.
//!
//! Every failure during request handling is converted into one of these
//! variants and then into an error envelope correlated by request id.
//! No request-level failure terminates the worker process.

use thiserror::Error;

/// Errors that can occur while handling a single request.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Malformed or incomplete request parameters. Detected before any
    /// external command runs and before any file is staged.
    #[error("{0}")]
    Validation(String),

    /// The external command could not be started at all.
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The external command ran but exited nonzero.
    #[error("{program} exited with code {exit_code}: {stderr_prefix}")]
    Execution {
        program: String,
        exit_code: i32,
        stderr_prefix: String,
    },

    /// The external command exceeded its wall-clock ceiling and was killed.
    #[error("{program} timed out after {seconds}s")]
    Timeout { program: String, seconds: u64 },

    /// The external command exceeded the combined stdout+stderr byte
    /// ceiling and was killed.
    #[error("{program} exceeded the output limit of {limit_bytes} bytes")]
    OutputLimit { program: String, limit_bytes: u64 },

    /// A required output file or stream was entirely absent or unreadable.
    #[error("expected output missing: {0}")]
    MissingOutput(String),

    /// Anything else: staging I/O failure, a caught panic in a handler.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl WorkerError {
    /// Taxonomy kind as it appears in the error envelope's `type` field.
    ///
    /// Timeout, output-limit, and missing-output failures surface as
    /// `execution`: the parent treats them identically to a nonzero exit.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Launch { .. } => "launch",
            Self::Execution { .. }
            | Self::Timeout { .. }
            | Self::OutputLimit { .. }
            | Self::MissingOutput(_) => "execution",
            Self::Internal(_) => "internal",
        }
    }

    /// Render the error with its full source chain, for the envelope's
    /// `stack` field.
    pub fn stack(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str("\n    caused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}
