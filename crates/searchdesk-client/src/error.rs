use thiserror::Error;

/// Errors raised while talking to the search backend.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Core(#[from] searchdesk_core::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Stream failed: {0}")]
    Stream(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Status { status: 404, .. })
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
