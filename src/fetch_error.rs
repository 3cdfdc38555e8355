use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Rate limited (429) by {url}")]
    RateLimited { url: String },
    #[error("Unexpected status {status} from {url}")]
    Status { status: StatusCode, url: String },
    #[error("Failed to parse JSON body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
    #[error("Conflicting metadata name: {0}")]
    ConflictingMetadata(String),
    #[error("Failed to build frame: {0}")]
    Frame(#[from] polars::prelude::PolarsError),
}

impl FetchError {
    /// True for responses the range helper waits out and retries.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FetchError::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Request(e) => e.status(),
            _ => None,
        }
    }
}
