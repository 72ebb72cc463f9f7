//! HTTP client used as the asset fetcher

use crate::{NetworkConfig, NetworkError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use prewarm::{AssetFetcher, ResourceKey};
use reqwest::{header, Client, Method, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

/// reqwest-backed fetcher with retry and backoff
pub struct HttpAssetFetcher {
    client: Client,
    config: NetworkConfig,
    semaphore: Arc<Semaphore>,
}

impl HttpAssetFetcher {
    /// Create a new fetcher
    pub fn new(config: NetworkConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .pool_max_idle_per_host(config.max_concurrent);

        if config.compression {
            builder = builder.gzip(true).brotli(true);
        }

        let client = builder
            .build()
            .map_err(|e| NetworkError::Configuration(e.to_string()))?;
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));

        Ok(Self {
            client,
            config,
            semaphore,
        })
    }

    /// Configuration
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// GET a resource and return its body
    pub async fn get(&self, key: &ResourceKey) -> Result<Bytes> {
        let url = self.config.resolve(key)?;
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| NetworkError::Cancelled)?;

        debug!("Fetching: {}", url);
        let response = self.send_with_retry(Method::GET, &url).await?;
        Ok(response.bytes().await?)
    }

    /// HEAD a resource; only the status matters
    pub async fn head(&self, key: &ResourceKey) -> Result<StatusCode> {
        let url = self.config.resolve(key)?;
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| NetworkError::Cancelled)?;

        debug!("Probing: {}", url);
        let response = self.send_with_retry(Method::HEAD, &url).await?;
        Ok(response.status())
    }

    /// Send with retry logic
    async fn send_with_retry(&self, method: Method, url: &Url) -> Result<Response> {
        let retry = &self.config.retry;
        let mut last_error = NetworkError::Connection("No attempts made".into());
        let mut backoff = retry.initial_backoff;

        for attempt in 0..=retry.max_retries {
            if attempt > 0 {
                debug!("Retry attempt {} after {:?}", attempt, backoff);
                tokio::time::sleep(backoff).await;

                // Exponential backoff with jitter
                backoff = Duration::from_secs_f64(
                    (backoff.as_secs_f64() * retry.multiplier).min(retry.max_backoff.as_secs_f64()),
                );

                if retry.jitter {
                    let jitter = rand::random::<f64>() * 0.3;
                    backoff = Duration::from_secs_f64(backoff.as_secs_f64() * (1.0 + jitter));
                }
            }

            match self.send_once(method.clone(), url).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }

                    if let Some(retry_after) = e.retry_after() {
                        backoff = retry_after;
                    }

                    warn!("{} {} failed (attempt {}): {}", method, url, attempt + 1, e);
                    last_error = e;
                }
            }
        }

        Err(NetworkError::RetriesExhausted(last_error.to_string()))
    }

    /// Single attempt
    async fn send_once(&self, method: Method, url: &Url) -> Result<Response> {
        let response = self.client.request(method, url.clone()).send().await?;
        Self::check_status(response, url)
    }

    fn check_status(response: Response, url: &Url) -> Result<Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::NOT_FOUND => Err(NetworkError::NotFound(url.to_string())),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_ms = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(|secs| secs * 1000)
                    .unwrap_or(1000);
                Err(NetworkError::RateLimited { retry_after_ms })
            }
            _ => Err(NetworkError::Http {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string(),
            }),
        }
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &ResourceKey) -> prewarm::Result<()> {
        // Body is discarded; the fetch exists to warm the transport cache
        self.get(url)
            .await
            .map(|body| debug!("Fetched {} ({} bytes)", url, body.len()))
            .map_err(|e| e.into_prewarm(url.as_str()))
    }
}
