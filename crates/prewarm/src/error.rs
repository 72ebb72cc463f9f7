//! Error types for deferred loading and prefetching

use thiserror::Error;

/// Result type for prewarm operations
pub type Result<T> = std::result::Result<T, PrewarmError>;

/// Errors that can occur while loading or prefetching resources.
///
/// Cloneable because a single failed load is observed by every caller
/// that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrewarmError {
    /// Module factory rejected
    #[error("Failed to load '{key}': {message}")]
    Load { key: String, message: String },

    /// Load did not settle in time
    #[error("Load of '{key}' timed out after {ms}ms")]
    Timeout { key: String, ms: u64 },

    /// Asset fetch failed
    #[error("Failed to fetch asset '{url}': {message}")]
    AssetFetch { url: String, message: String },

    /// Key not present in the registry or table
    #[error("Unknown resource key: {0}")]
    UnknownKey(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Background load task went away before settling
    #[error("Load aborted: {0}")]
    Aborted(String),

    /// JSON decoding error
    #[error("JSON error: {0}")]
    Json(String),
}

impl PrewarmError {
    /// Build a load failure for a key
    pub fn load(key: impl Into<String>, message: impl Into<String>) -> Self {
        PrewarmError::Load {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Build an asset fetch failure for a URL
    pub fn asset(url: impl Into<String>, message: impl Into<String>) -> Self {
        PrewarmError::AssetFetch {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Whether a later attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PrewarmError::Load { .. }
                | PrewarmError::Timeout { .. }
                | PrewarmError::AssetFetch { .. }
                | PrewarmError::Aborted(_)
        )
    }
}

impl From<serde_json::Error> for PrewarmError {
    fn from(e: serde_json::Error) -> Self {
        PrewarmError::Json(e.to_string())
    }
}
