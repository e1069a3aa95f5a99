//! Error types for dronebench.
//!
//! `InferenceError` covers a single request to a model endpoint and is always
//! handled locally by the runner. `BenchError` is what escapes to the caller:
//! configuration problems, a missing dataset, or a ledger that cannot be written.

use std::path::PathBuf;

/// Top-level error type for the dronebench core library.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("Dataset file not found: {}", path.display())]
    DatasetNotFound { path: PathBuf },

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ledger error at {}: {source}", path.display())]
    Ledger {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl BenchError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub(crate) fn ledger(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Ledger {
            path: path.into(),
            source,
        }
    }
}

/// Transient failure of a single inference request.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Endpoint connection failed: {message}")]
    Connection { message: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Endpoint returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Backend misconfigured: {message}")]
    Config { message: String },
}

impl InferenceError {
    /// Classify a reqwest failure.
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout { timeout_secs }
        } else if err.is_decode() {
            Self::ResponseParse {
                message: err.to_string(),
            }
        } else {
            Self::Connection {
                message: err.to_string(),
            }
        }
    }
}
