//! Unified error type for the waxvalue client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error (status={status}): {message}")]
    Api { status: u16, message: String },

    /// HTTP 401 - the caller must clear the local session and direct the
    /// user back to authentication.
    #[error("session rejected by the server (401)")]
    Unauthorized,

    #[error("rate limited - retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// An equivalent analysis is already running server-side. Non-fatal;
    /// ingestion continues by polling.
    #[error("analysis already running: {0}")]
    AnalysisRunning(String),

    #[error("suggestion stream failed: {0}")]
    Stream(String),

    /// The ingestion request was cancelled locally. Benign, never shown.
    #[error("request aborted")]
    Aborted,

    #[error("apply rejected: {0}")]
    ApplyRejected(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error is benign and should be swallowed rather than
    /// surfaced to the user.
    pub fn is_benign(&self) -> bool {
        matches!(self, Error::Aborted)
    }
}
