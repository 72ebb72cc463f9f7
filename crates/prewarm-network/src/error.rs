//! Error types for network operations

use prewarm::PrewarmError;
use thiserror::Error;

/// Result type for network operations
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Errors that can occur during network operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    /// HTTP request failed
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// Network connection failed
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Request timeout
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// All retries exhausted
    #[error("All retries exhausted: {0}")]
    RetriesExhausted(String),

    /// Rate limited
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Client configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Cancelled
    #[error("Request cancelled")]
    Cancelled,
}

impl NetworkError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            NetworkError::Connection(_) => true,
            NetworkError::Timeout(_) => true,
            NetworkError::RateLimited { .. } => true,
            NetworkError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Get retry delay if rate limited
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        if let NetworkError::RateLimited { retry_after_ms } = self {
            Some(std::time::Duration::from_millis(*retry_after_ms))
        } else {
            None
        }
    }

    /// Convert at the fetcher boundary, attaching the URL being fetched
    pub fn into_prewarm(self, url: &str) -> PrewarmError {
        match self {
            NetworkError::InvalidUrl(_) | NetworkError::Configuration(_) => {
                PrewarmError::Configuration(self.to_string())
            }
            NetworkError::Cancelled => PrewarmError::Aborted(url.to_string()),
            NetworkError::Timeout(ms) => PrewarmError::Timeout {
                key: url.to_string(),
                ms,
            },
            other => PrewarmError::asset(url, other.to_string()),
        }
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            NetworkError::Timeout(30000)
        } else if e.is_connect() {
            NetworkError::Connection(e.to_string())
        } else if let Some(status) = e.status() {
            NetworkError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_builder() {
            NetworkError::Configuration(e.to_string())
        } else {
            NetworkError::Connection(e.to_string())
        }
    }
}

impl From<url::ParseError> for NetworkError {
    fn from(e: url::ParseError) -> Self {
        NetworkError::InvalidUrl(e.to_string())
    }
}

impl From<NetworkError> for PrewarmError {
    fn from(e: NetworkError) -> Self {
        e.into_prewarm("")
    }
}
