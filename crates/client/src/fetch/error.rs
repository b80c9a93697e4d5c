//! Page fetch error types.

use std::sync::Arc;

/// Errors from retrieving a page.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// URL could not be parsed or uses an unsupported scheme.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Non-success HTTP status.
    #[error("HTTP error: {status}")]
    HttpStatus { status: u16 },

    /// Body exceeded the configured byte limit.
    #[error("response too large: {size} bytes exceeds {limit}")]
    TooLarge { size: u64, limit: usize },

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Headless browser failure.
    #[error("render error: {0}")]
    Render(String),

    /// Client could not be constructed.
    #[error("client setup failed: {0}")]
    Setup(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { FetchError::Timeout } else { FetchError::Network(Arc::new(err)) }
    }
}
