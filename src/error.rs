use std::fmt;

/// Which half of an upstream call ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    Connect,
    Read,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutPhase::Connect => f.write_str("could not connect to the upstream service in time"),
            TimeoutPhase::Read => f.write_str("the upstream service stopped responding (read timeout)"),
        }
    }
}

/// Error taxonomy shared by ingestion, retrieval and synthesis.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Unrecognised document type. Fatal to that ingestion only.
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// Lexical or vector index cannot be built or queried.
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("{phase}")]
    UpstreamTimeout { phase: TimeoutPhase },

    /// Non-2xx reply (status set) or transport failure (status absent).
    #[error("{}", upstream_message(.status, .message))]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    #[error("failed to parse structured output: {0}")]
    ParseFailure(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage error: {0}")]
    Storage(String),
}

fn upstream_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("upstream service returned {code}: {message}"),
        None => format!("upstream request failed: {message}"),
    }
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;

impl RagError {
    pub fn upstream_status(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Whether a stream that hit this error must stop.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RagError::ParseFailure(_))
    }
}

impl From<reqwest::Error> for RagError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            let phase = if e.is_connect() {
                TimeoutPhase::Connect
            } else {
                TimeoutPhase::Read
            };
            return RagError::UpstreamTimeout { phase };
        }
        if let Some(status) = e.status() {
            return RagError::upstream_status(status.as_u16(), status.to_string());
        }
        // Strip the URL so internal endpoints don't leak into user-facing text.
        RagError::Upstream {
            status: None,
            message: e.without_url().to_string(),
        }
    }
}

impl From<tantivy::TantivyError> for RagError {
    fn from(e: tantivy::TantivyError) -> Self {
        RagError::IndexUnavailable(e.to_string())
    }
}

impl From<std::io::Error> for RagError {
    fn from(e: std::io::Error) -> Self {
        RagError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for RagError {
    fn from(e: serde_json::Error) -> Self {
        RagError::Storage(e.to_string())
    }
}
