//! Best-effort resource prefetcher
//!
//! Opens connections and warms server-side caches at startup. Nothing
//! here is load-bearing: every failure is logged and swallowed.

use crate::{HttpAssetFetcher, PrefetchConfig};
use futures::future::join_all;
use prewarm::{AssetFetcher, AssetPrefetchCache, ResourceKey};
use std::sync::Arc;
use tracing::{debug, info};

/// Counts from one warm pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchSummary {
    /// Probes answered
    pub probes_ok: usize,
    /// Probes that failed
    pub probes_failed: usize,
    /// Assets fetched
    pub assets_ok: usize,
    /// Assets that failed
    pub assets_failed: usize,
}

impl PrefetchSummary {
    /// Total requests attempted
    pub fn attempted(&self) -> usize {
        self.probes_ok + self.probes_failed + self.assets_ok + self.assets_failed
    }
}

/// HEAD probes plus static asset prefetch
pub struct ResourcePrefetcher {
    fetcher: Arc<HttpAssetFetcher>,
    assets: AssetPrefetchCache,
    config: PrefetchConfig,
}

impl ResourcePrefetcher {
    /// Create a prefetcher with its own asset cache
    pub fn new(fetcher: Arc<HttpAssetFetcher>, config: PrefetchConfig) -> Self {
        let assets = AssetPrefetchCache::new(fetcher.clone() as Arc<dyn AssetFetcher>);
        Self {
            fetcher,
            assets,
            config,
        }
    }

    /// Route static assets through an existing cache (e.g. a session's)
    pub fn with_cache(mut self, assets: AssetPrefetchCache) -> Self {
        self.assets = assets;
        self
    }

    /// Asset cache in use
    pub fn assets(&self) -> &AssetPrefetchCache {
        &self.assets
    }

    /// Configuration
    pub fn config(&self) -> &PrefetchConfig {
        &self.config
    }

    /// Probe every endpoint and prefetch every static asset concurrently
    pub async fn warm(&self) -> PrefetchSummary {
        let probes = join_all(self.config.probe_endpoints.iter().map(|key| self.probe(key)));
        let assets = self
            .assets
            .prefetch_many(self.config.static_assets.iter().cloned());

        let (probes, assets) = futures::join!(probes, assets);

        let mut summary = PrefetchSummary::default();
        for ok in probes {
            if ok {
                summary.probes_ok += 1;
            } else {
                summary.probes_failed += 1;
            }
        }
        for (key, result) in self.config.static_assets.iter().zip(assets) {
            match result {
                Ok(()) => summary.assets_ok += 1,
                Err(e) => {
                    debug!("Ignoring prefetch failure for {}: {}", key, e);
                    summary.assets_failed += 1;
                }
            }
        }

        info!(
            "Prefetch pass: {}/{} probes, {}/{} assets",
            summary.probes_ok,
            summary.probes_ok + summary.probes_failed,
            summary.assets_ok,
            summary.assets_ok + summary.assets_failed
        );
        summary
    }

    async fn probe(&self, key: &ResourceKey) -> bool {
        match self.fetcher.head(key).await {
            Ok(status) => {
                debug!("Probe {} -> {}", key, status);
                true
            }
            Err(e) => {
                debug!("Ignoring probe failure for {}: {}", key, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::TestServer;
    use crate::{NetworkConfig, RetryConfig};
    use prewarm::AssetStatus;

    fn prefetcher(base_url: String, config: PrefetchConfig) -> ResourcePrefetcher {
        let network = NetworkConfig::default()
            .with_base_url(base_url)
            .with_retry(RetryConfig::none());
        ResourcePrefetcher::new(Arc::new(HttpAssetFetcher::new(network).unwrap()), config)
    }

    #[tokio::test]
    async fn test_warm_education_preset() {
        let server = TestServer::start().await;
        let prefetcher = prefetcher(server.base_url(), PrefetchConfig::education_platform());

        let summary = prefetcher.warm().await;
        assert_eq!(summary.probes_ok, 4);
        assert_eq!(summary.assets_ok, 4);
        assert_eq!(server.total_hits(), 8);
        assert_eq!(
            prefetcher.assets().status("/fonts/inter-var.woff2"),
            Some(AssetStatus::Completed)
        );
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let server = TestServer::start().await;
        let config = PrefetchConfig::default()
            .with_probe("/missing/api/health")
            .with_asset("/missing.png")
            .with_asset("/img/ok.png");
        let prefetcher = prefetcher(server.base_url(), config);

        let summary = prefetcher.warm().await;
        assert_eq!(summary.probes_failed, 1);
        assert_eq!(summary.assets_failed, 1);
        assert_eq!(summary.assets_ok, 1);
        assert_eq!(prefetcher.assets().status("/missing.png"), None);
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        // Nothing listens on port 1
        let prefetcher = prefetcher(
            "http://127.0.0.1:1/".to_string(),
            PrefetchConfig::education_platform(),
        );

        let summary = prefetcher.warm().await;
        assert_eq!(summary.probes_failed, 4);
        assert_eq!(summary.assets_failed, 4);
        assert_eq!(summary.attempted(), 8);
    }

    #[tokio::test]
    async fn test_second_pass_reuses_assets() {
        let server = TestServer::start().await;
        let config = PrefetchConfig::default().with_asset("/img/a.png");
        let prefetcher = prefetcher(server.base_url(), config);

        prefetcher.warm().await;
        prefetcher.warm().await;
        assert_eq!(server.hits("/img/a.png"), 1);
    }
}
