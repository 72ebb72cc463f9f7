//! Network configuration

use crate::{NetworkError, Result};
use prewarm::ResourceKey;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retry attempts
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Add jitter to backoff
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// No retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Base URL relative keys are resolved against
    pub base_url: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Maximum concurrent requests
    pub max_concurrent: usize,
    /// Retry configuration
    pub retry: RetryConfig,
    /// Enable compression
    pub compression: bool,
    /// User agent string
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_concurrent: 6,
            retry: RetryConfig::default(),
            compression: true,
            user_agent: format!("prewarm-network/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl NetworkConfig {
    /// Set the base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set retry configuration
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set maximum concurrent requests
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    /// Resolve a key to an absolute URL. Absolute keys pass through;
    /// relative keys need a base URL.
    pub fn resolve(&self, key: &ResourceKey) -> Result<Url> {
        match Url::parse(key.as_str()) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.base_url.as_deref().ok_or_else(|| {
                    NetworkError::InvalidUrl(format!("{} (no base URL configured)", key))
                })?;
                Ok(Url::parse(base)?.join(key.as_str())?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// What the resource prefetcher warms at startup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Endpoints probed with HEAD to open connections and warm server caches
    pub probe_endpoints: Vec<ResourceKey>,
    /// Static assets fetched through the asset prefetch cache
    pub static_assets: Vec<ResourceKey>,
}

impl PrefetchConfig {
    /// Parse from JSON
    pub fn from_json(json: &str) -> prewarm::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Add a probe endpoint
    pub fn with_probe(mut self, endpoint: impl Into<ResourceKey>) -> Self {
        self.probe_endpoints.push(endpoint.into());
        self
    }

    /// Add a static asset
    pub fn with_asset(mut self, asset: impl Into<ResourceKey>) -> Self {
        self.static_assets.push(asset.into());
        self
    }

    /// Probes and assets for the education platform
    pub fn education_platform() -> Self {
        Self::default()
            .with_probe("/api/health")
            .with_probe("/api/auth/session")
            .with_probe("/api/quizzes")
            .with_probe("/api/meetings")
            .with_asset("/images/logo.svg")
            .with_asset("/images/classroom-hero.webp")
            .with_asset("/fonts/inter-var.woff2")
            .with_asset("/styles/app.css")
    }
}
