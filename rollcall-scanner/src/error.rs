use thiserror::Error;

/// Per-profile failures. The `Display` text is what lands in a failed
/// result's `error` field.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Rate limited")]
    RateLimited,

    #[error("HTTP_{0}")]
    HttpStatus(u16),

    #[error("{0}")]
    Transport(String),

    #[error("Invalid response structure")]
    InvalidResponseShape,

    #[error("No user id could be resolved from the profile record")]
    MissingIdentifier,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScanError {
    /// Only transport-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScanError::RateLimited | ScanError::HttpStatus(_) | ScanError::Transport(_)
        )
    }
}

impl From<reqwest::Error> for ScanError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.as_u16() == 429 => ScanError::RateLimited,
            Some(status) => ScanError::HttpStatus(status.as_u16()),
            None => ScanError::Transport(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
