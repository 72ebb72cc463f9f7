//! Session wiring all prewarm components together

use crate::{
    AssetFetcher, AssetPrefetchCache, CacheJanitor, ElementHandle, HoverDebouncer,
    ModuleRegistry, ObserverBackend, PredictivePreloader, PreloadReport, PrewarmConfig,
    ResourceKey, Result, Role, RoutePreloadTable, TransientCache, ViewportLoader,
};
use crate::{AssetCacheStats, PreloaderStats};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Combined statistics
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    /// Preloader counters
    pub preloader: PreloaderStats,
    /// Asset cache counters
    pub assets: AssetCacheStats,
    /// Registered modules
    pub modules: usize,
    /// Resolved modules
    pub resolved_modules: usize,
    /// Pending viewport registrations
    pub viewport_pending: usize,
}

/// Everything a long-lived client session needs to warm code and assets
pub struct PrewarmSession {
    config: PrewarmConfig,
    preloader: PredictivePreloader,
    hover: HoverDebouncer,
    assets: AssetPrefetchCache,
    viewport: Arc<ViewportLoader>,
    janitor: Arc<CacheJanitor>,
}

impl PrewarmSession {
    /// Wire a session. Fails if the table names keys the registry lacks.
    ///
    /// Modules are built before the session exists, so `config.loader` is
    /// not applied here: pass it to [`DeferredModule::with_config`] when
    /// registering them.
    ///
    /// [`DeferredModule::with_config`]: crate::DeferredModule::with_config
    pub fn new(
        config: PrewarmConfig,
        table: RoutePreloadTable,
        registry: Arc<ModuleRegistry>,
        fetcher: Arc<dyn AssetFetcher>,
        observer: Option<Arc<dyn ObserverBackend>>,
    ) -> Result<Self> {
        let preloader = PredictivePreloader::validated(Arc::new(table), registry)?;
        let hover = HoverDebouncer::new(preloader.clone(), &config.hover);
        let assets = AssetPrefetchCache::new(fetcher);
        let viewport = Arc::new(ViewportLoader::new(config.visibility.clone(), observer));

        let janitor = Arc::new(CacheJanitor::new());
        janitor.register(Arc::new(assets.clone()) as Arc<dyn TransientCache>);

        Ok(Self {
            config,
            preloader,
            hover,
            assets,
            viewport,
            janitor,
        })
    }

    /// Replace the janitor (e.g. to use a custom memory probe)
    pub fn with_janitor(mut self, janitor: CacheJanitor) -> Self {
        janitor.register(Arc::new(self.assets.clone()) as Arc<dyn TransientCache>);
        self.janitor = Arc::new(janitor);
        self
    }

    /// Configuration
    pub fn config(&self) -> &PrewarmConfig {
        &self.config
    }

    /// Predictive preloader
    pub fn preloader(&self) -> &PredictivePreloader {
        &self.preloader
    }

    /// Hover debouncer
    pub fn hover(&self) -> &HoverDebouncer {
        &self.hover
    }

    /// Asset prefetch cache
    pub fn assets(&self) -> &AssetPrefetchCache {
        &self.assets
    }

    /// Viewport visibility loader
    pub fn viewport(&self) -> &Arc<ViewportLoader> {
        &self.viewport
    }

    /// Cache janitor
    pub fn janitor(&self) -> &Arc<CacheJanitor> {
        &self.janitor
    }

    /// Process start: warm role-independent modules
    pub async fn start(&self) -> PreloadReport {
        self.preloader.preload_critical().await
    }

    /// Navigation layer reported a role
    pub async fn on_role_changed(&self, role: Role) -> PreloadReport {
        self.preloader.preload_for_role(role).await
    }

    /// Navigation layer reported a location change
    pub async fn on_location_changed(&self, location: &str, role: Option<Role>) -> PreloadReport {
        self.preloader.smart_preload(location, role).await
    }

    /// Warm a module once `element` scrolls into view
    pub fn preload_when_visible(&self, element: ElementHandle, key: impl Into<ResourceKey>) {
        let key = key.into();
        let registry = self.preloader.registry().clone();

        self.viewport.observe(element, move |_| {
            match registry.get(key.as_str()) {
                // Spawned by the loader; dropping the future does not cancel it
                Some(module) => drop(module.warm()),
                None => debug!("Visible element wants unknown module '{}'", key),
            }
        });
    }

    /// Prefetch an asset once `element` scrolls into view
    pub fn prefetch_when_visible(&self, element: ElementHandle, url: impl Into<ResourceKey>) {
        let url = url.into();
        let assets = self.assets.clone();

        self.viewport.observe(element, move |_| {
            drop(assets.prefetch(url));
        });
    }

    /// Start the periodic cache sweep
    pub fn start_janitor(&self) -> JoinHandle<()> {
        self.janitor.clone().spawn_periodic(&self.config.janitor)
    }

    /// Statistics snapshot
    pub fn stats(&self) -> SessionStats {
        let statuses = self.preloader.registry().statuses();
        SessionStats {
            preloader: self.preloader.stats(),
            assets: self.assets.stats(),
            modules: statuses.len(),
            resolved_modules: statuses
                .iter()
                .filter(|(_, s)| *s == crate::ModuleStatus::Resolved)
                .count(),
            viewport_pending: self.viewport.len(),
        }
    }

    /// Teardown: cancel hover timers and drop viewport registrations
    pub fn shutdown(&self) {
        self.hover.cancel_all();
        self.viewport.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::tests::CountingFetcher;
    use crate::{DeferredModule, ModuleStatus, RecordingBackend, VisibilityEntry};

    fn session() -> (PrewarmSession, Arc<CountingFetcher>) {
        let registry = Arc::new(ModuleRegistry::new());
        for key in RoutePreloadTable::education_platform().all_keys() {
            registry.register_module(DeferredModule::new(key, || async { Ok(()) }));
        }
        let fetcher = Arc::new(CountingFetcher::default());
        let session = PrewarmSession::new(
            PrewarmConfig::default(),
            RoutePreloadTable::education_platform(),
            registry,
            fetcher.clone(),
            Some(Arc::new(RecordingBackend::new())),
        )
        .unwrap();
        (session, fetcher)
    }

    #[tokio::test]
    async fn test_role_then_location() {
        let (session, _) = session();

        let critical = session.start().await;
        assert_eq!(critical.warmed.len(), 3);

        let report = session.on_role_changed(Role::Student).await;
        assert_eq!(report.warmed.len(), 4);

        session.on_location_changed("/dashboard", Some(Role::Student)).await;
        let stats = session.stats();
        assert_eq!(stats.preloader.batches, 3);
        assert!(stats.resolved_modules >= 7);
    }

    #[tokio::test]
    async fn test_visible_element_warms_module() {
        let (session, _) = session();
        let el = ElementHandle(7);

        session.preload_when_visible(el, "ClassAnalytics");
        assert_eq!(session.stats().viewport_pending, 1);

        session
            .viewport()
            .on_intersection(&[VisibilityEntry::new(el, 0.5)]);

        let module = session.preloader().registry().get("ClassAnalytics").unwrap();
        module.warm().await.unwrap();
        assert_eq!(module.status(), ModuleStatus::Resolved);
        assert_eq!(session.stats().viewport_pending, 0);
    }

    #[tokio::test]
    async fn test_visible_element_prefetches_asset() {
        let (session, fetcher) = session();
        let el = ElementHandle(8);

        session.prefetch_when_visible(el, "/img/course-hero.webp");
        session
            .viewport()
            .on_intersection(&[VisibilityEntry::new(el, 1.0)]);

        session.assets().prefetch("/img/course-hero.webp").await.unwrap();
        assert_eq!(fetcher.count("/img/course-hero.webp"), 1);
    }

    #[tokio::test]
    async fn test_janitor_clears_assets_not_modules() {
        let (session, _) = session();

        session.on_role_changed(Role::Teacher).await;
        session.assets().prefetch("/img/a.png").await.unwrap();

        let report = session.janitor().clear_caches();
        assert_eq!(report.total(), 1);
        assert!(session.assets().is_empty());

        let module = session.preloader().registry().get("QuizBuilder").unwrap();
        assert_eq!(module.status(), ModuleStatus::Resolved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loader_config_applies_through_modules() {
        let config = PrewarmConfig::from_json(r#"{ "loader": { "load_timeout_ms": 20 } }"#).unwrap();
        let registry = Arc::new(ModuleRegistry::new());
        for key in RoutePreloadTable::education_platform().all_keys() {
            let module = DeferredModule::new(key, || async {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                Ok(())
            })
            .with_config(&config.loader);
            registry.register_module(module);
        }
        let session = PrewarmSession::new(
            config,
            RoutePreloadTable::education_platform(),
            registry,
            Arc::new(CountingFetcher::default()),
            None,
        )
        .unwrap();

        let report = session.start().await;
        assert!(report.warmed.is_empty());
        assert_eq!(report.failed.len(), 3);
        assert!(report
            .failed
            .iter()
            .all(|(_, e)| matches!(e, crate::PrewarmError::Timeout { ms: 20, .. })));
        assert_eq!(session.config().loader.load_timeout_ms, Some(20));
    }

    #[test]
    fn test_rejects_unregistered_table_keys() {
        let result = PrewarmSession::new(
            PrewarmConfig::default(),
            RoutePreloadTable::education_platform(),
            Arc::new(ModuleRegistry::new()),
            Arc::new(CountingFetcher::default()),
            None,
        );
        assert!(matches!(result, Err(crate::PrewarmError::UnknownKey(_))));
    }
}
