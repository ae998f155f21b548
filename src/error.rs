/// Token store failures.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("token store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("token store encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Session lifecycle failures (refresh or code exchange).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error("no refresh token available")]
    MissingRefreshToken,
    #[error("{operation} rejected (HTTP {status}): {detail}")]
    Rejected {
        operation: &'static str,
        status: u16,
        detail: String,
    },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Station-data failures.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FetchError {
    #[error("station data request rejected (HTTP {status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("station data is not valid JSON of the expected shape: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("malformed station data for device {device}: {reason}")]
    Malformed { device: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
