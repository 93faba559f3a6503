use rollcall_scanner::ScanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid profile data format: {0}")]
    MalformedProfileInput(String),

    #[error("Invalid JSON format for {field}: {source}")]
    InvalidConfigJson {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("A scrape run is in progress")]
    RunInProgress,

    #[error("Scrape task failed: {0}")]
    TaskFailed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
