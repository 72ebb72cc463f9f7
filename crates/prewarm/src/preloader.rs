//! Predictive preloader
//!
//! Turns "user has role X" / "user is at location Y" signals into batches
//! of warm-ups against the module registry. Every entry point is
//! advisory: individual failures are collected into a report and never
//! propagated to the caller.

use crate::{ModuleRegistry, PrewarmError, ResourceKey, Result, Role, RoutePreloadTable};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a preload batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreloadReport {
    /// Keys that resolved
    pub warmed: Vec<ResourceKey>,
    /// Keys whose load failed (each caught individually)
    pub failed: Vec<(ResourceKey, PrewarmError)>,
    /// Keys in the table with no registered module
    pub skipped: Vec<ResourceKey>,
}

impl PreloadReport {
    /// Number of keys a warm-up was issued for
    pub fn issued(&self) -> usize {
        self.warmed.len() + self.failed.len()
    }

    /// Whether every issued warm-up succeeded
    pub fn all_warmed(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Preloader statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloaderStats {
    /// Batches issued
    pub batches: u64,
    /// Keys warmed successfully
    pub warmed: u64,
    /// Keys that failed to warm
    pub failed: u64,
    /// Hover lookups that matched a target
    pub hover_hits: u64,
    /// Hover lookups for unknown targets
    pub hover_misses: u64,
}

#[derive(Default)]
struct StatsInner {
    batches: AtomicU64,
    warmed: AtomicU64,
    failed: AtomicU64,
    hover_hits: AtomicU64,
    hover_misses: AtomicU64,
}

/// Predictive preloader
#[derive(Clone)]
pub struct PredictivePreloader {
    table: Arc<RoutePreloadTable>,
    registry: Arc<ModuleRegistry>,
    stats: Arc<StatsInner>,
}

impl PredictivePreloader {
    /// Create a preloader over a table and registry
    pub fn new(table: Arc<RoutePreloadTable>, registry: Arc<ModuleRegistry>) -> Self {
        Self {
            table,
            registry,
            stats: Arc::new(StatsInner::default()),
        }
    }

    /// Create a preloader, rejecting tables that name unregistered keys
    pub fn validated(table: Arc<RoutePreloadTable>, registry: Arc<ModuleRegistry>) -> Result<Self> {
        table.validate(&registry)?;
        Ok(Self::new(table, registry))
    }

    /// Route table
    pub fn table(&self) -> &RoutePreloadTable {
        &self.table
    }

    /// Module registry
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Warm every module configured for a role
    pub async fn preload_for_role(&self, role: Role) -> PreloadReport {
        let keys = self.table.keys_for_role(role).to_vec();
        debug!("Preloading {} modules for role '{}'", keys.len(), role);
        self.preload_keys(keys).await
    }

    /// Warm the modules likely to be visited next from `location`
    pub async fn smart_preload(&self, location: &str, role: Option<Role>) -> PreloadReport {
        let keys = self.table.keys_for_location(location, role).to_vec();
        if keys.is_empty() {
            debug!("No adjacency rule for '{}'", location);
        }
        self.preload_keys(keys).await
    }

    /// Warm modules needed regardless of role; meant to run once at start
    pub async fn preload_critical(&self) -> PreloadReport {
        let keys = self.table.critical_keys().to_vec();
        let report = self.preload_keys(keys).await;
        info!(
            "Critical preload: {}/{} warmed",
            report.warmed.len(),
            report.issued()
        );
        report
    }

    /// Warm the module behind a hover target.
    ///
    /// Returns `None` for unknown targets or keys without a module. The
    /// returned future may be dropped; the load continues regardless.
    pub fn preload_on_hover(&self, target: &str) -> Option<BoxFuture<'static, Result<()>>> {
        let module = self
            .table
            .hover_target(target)
            .and_then(|key| self.registry.get(key.as_str()));

        match module {
            Some(module) => {
                self.stats.hover_hits.fetch_add(1, Ordering::Relaxed);
                debug!("Hover warm-up for '{}' -> '{}'", target, module.key());
                Some(module.warm())
            }
            None => {
                self.stats.hover_misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Issue warm-ups for a set of keys and wait for all to settle
    pub fn preload_keys(&self, keys: Vec<ResourceKey>) -> BoxFuture<'static, PreloadReport> {
        let mut report = PreloadReport::default();
        let mut pending = Vec::with_capacity(keys.len());

        for key in dedup_preserving_order(keys) {
            match self.registry.get(key.as_str()) {
                // Started here, before the first poll, so every load is in flight together
                Some(module) => pending.push(module.warm().map(move |r| (key, r))),
                None => report.skipped.push(key),
            }
        }

        let stats = self.stats.clone();
        async move {
            for (key, result) in join_all(pending).await {
                match result {
                    Ok(()) => report.warmed.push(key),
                    Err(e) => {
                        warn!("Preload of '{}' failed: {}", key, e);
                        report.failed.push((key, e));
                    }
                }
            }

            stats.batches.fetch_add(1, Ordering::Relaxed);
            stats
                .warmed
                .fetch_add(report.warmed.len() as u64, Ordering::Relaxed);
            stats
                .failed
                .fetch_add(report.failed.len() as u64, Ordering::Relaxed);

            report
        }
        .boxed()
    }

    /// Statistics snapshot
    pub fn stats(&self) -> PreloaderStats {
        PreloaderStats {
            batches: self.stats.batches.load(Ordering::Relaxed),
            warmed: self.stats.warmed.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            hover_hits: self.stats.hover_hits.load(Ordering::Relaxed),
            hover_misses: self.stats.hover_misses.load(Ordering::Relaxed),
        }
    }
}

fn dedup_preserving_order(keys: Vec<ResourceKey>) -> Vec<ResourceKey> {
    let mut seen = std::collections::HashSet::with_capacity(keys.len());
    keys.into_iter().filter(|k| seen.insert(k.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeferredModule, ModuleStatus};

    fn registry_with(keys: &[&str], failing: &[&str]) -> Arc<ModuleRegistry> {
        let registry = ModuleRegistry::new();
        for key in keys {
            let fails = failing.contains(key);
            let name = key.to_string();
            registry.register_module(DeferredModule::new(*key, move || {
                let name = name.clone();
                async move {
                    if fails {
                        Err(PrewarmError::load(name, "offline"))
                    } else {
                        Ok(name)
                    }
                }
            }));
        }
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_failure_does_not_block_batch() {
        let table = RoutePreloadTable::new().with_role(Role::Teacher, ["A", "B", "C"]);
        let registry = registry_with(&["A", "B", "C"], &["B"]);
        let preloader = PredictivePreloader::new(Arc::new(table), registry.clone());

        let report = preloader.preload_for_role(Role::Teacher).await;

        assert_eq!(report.warmed, vec![ResourceKey::new("A"), ResourceKey::new("C")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0.as_str(), "B");
        assert!(!report.all_warmed());
        assert_eq!(registry.get("B").unwrap().status(), ModuleStatus::Failed);
    }

    #[tokio::test]
    async fn test_unregistered_keys_skipped() {
        let table = RoutePreloadTable::new().with_critical(["Login", "Missing", "Login"]);
        let preloader =
            PredictivePreloader::new(Arc::new(table), registry_with(&["Login"], &[]));

        let report = preloader.preload_critical().await;

        assert_eq!(report.warmed, vec![ResourceKey::new("Login")]);
        assert_eq!(report.skipped, vec![ResourceKey::new("Missing")]);
        assert_eq!(report.issued(), 1);
    }

    #[tokio::test]
    async fn test_hover_unknown_target_is_none() {
        let table = RoutePreloadTable::new().with_hover("quizzes", "QuizList");
        let preloader =
            PredictivePreloader::new(Arc::new(table), registry_with(&["QuizList"], &[]));

        assert!(preloader.preload_on_hover("unknown-key").is_none());
        preloader.preload_on_hover("quizzes").unwrap().await.unwrap();

        let stats = preloader.stats();
        assert_eq!(stats.hover_hits, 1);
        assert_eq!(stats.hover_misses, 1);
    }

    #[tokio::test]
    async fn test_validated_rejects_bad_table() {
        let table = RoutePreloadTable::new().with_role(Role::Admin, ["Nope"]);
        let result = PredictivePreloader::validated(Arc::new(table), registry_with(&[], &[]));

        assert!(matches!(result, Err(PrewarmError::UnknownKey(_))));
    }

    #[tokio::test]
    async fn test_stats_accumulate() {
        let table = RoutePreloadTable::new()
            .with_adjacency("/dashboard", ["A", "B"])
            .with_critical(["A"]);
        let preloader =
            PredictivePreloader::new(Arc::new(table), registry_with(&["A", "B"], &["B"]));

        preloader.smart_preload("/dashboard", None).await;
        preloader.preload_critical().await;

        let stats = preloader.stats();
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.warmed, 2);
        assert_eq!(stats.failed, 1);
    }
}
