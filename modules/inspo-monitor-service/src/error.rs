//! Error taxonomy for the ingestion-and-publication pipeline.
//!
//! Item-level failures are captured as values inside batch outcomes and never
//! escalate to run-level errors; everything in this enum is a run-level (or
//! caller-facing) condition.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unknown account, handle, or post id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Provider quota exhausted. Retry later; no data was lost.
    #[error("rate limited by provider")]
    RateLimited,

    /// Credential problem. Fatal to the run, never retried.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The operation was called before its prerequisites were met.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A stored record or provider reply failed to parse.
    #[error("malformed data: {0}")]
    MalformedData(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("network error: {0}")]
    Network(String),

    /// Generic provider-side failure.
    #[error("provider error: {0}")]
    Api(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PipelineError::RateLimited)
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, PipelineError::Auth(_))
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        PipelineError::Network(e.to_string())
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(e: rusqlite::Error) -> Self {
        PipelineError::Store(e.to_string())
    }
}
