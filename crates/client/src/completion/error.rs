//! Completion client error types.

use std::sync::Arc;

/// Errors from the text-completion service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompletionError {
    /// No API key configured.
    #[error("missing API key: PAGEWISE_API_KEY not set")]
    MissingApiKey,

    /// Authentication failed (invalid API key).
    #[error("authentication failed: invalid API key")]
    AuthError,

    /// Rate limited by the service.
    #[error("rate limited: too many requests")]
    RateLimited,

    /// HTTP error response.
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),

    /// The service answered without any message content.
    #[error("no response content from API")]
    EmptyResponse,
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { CompletionError::Timeout } else { CompletionError::Network(Arc::new(err)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CompletionError::MissingApiKey;
        assert!(err.to_string().contains("API key"));

        let err = CompletionError::HttpError { status: 502 };
        assert!(err.to_string().contains("502"));

        assert_eq!(CompletionError::EmptyResponse.to_string(), "no response content from API");
    }
}
