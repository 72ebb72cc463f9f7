//! Property-based tests for load deduplication.
//!
//! - Any number of concurrent resolves runs the factory once
//! - Any mix of duplicate URLs fetches each distinct URL once
//! - A preload batch settles every issued key, whatever fails
//!
//! Run with: cargo test -p prewarm --test proptest_dedup

use async_trait::async_trait;
use parking_lot::Mutex;
use proptest::prelude::*;
use prewarm::{
    AssetFetcher, AssetPrefetchCache, DeferredModule, ModuleRegistry, PredictivePreloader,
    PrewarmError, ResourceKey, Result, RoutePreloadTable,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_time()
        .build()
        .unwrap()
}

#[derive(Default)]
struct CountingFetcher(Mutex<HashMap<String, usize>>);

#[async_trait]
impl AssetFetcher for CountingFetcher {
    async fn fetch(&self, url: &ResourceKey) -> Result<()> {
        *self.0.lock().entry(url.to_string()).or_default() += 1;
        tokio::time::sleep(Duration::from_millis(1)).await;
        Ok(())
    }
}

/// Strategy for URL lists drawn from a small pool, so duplicates are common.
fn url_list_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(0usize..6, 1..24)
        .prop_map(|ids| ids.into_iter().map(|i| format!("/img/{}.png", i)).collect())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        max_shrink_iters: 50,
        ..ProptestConfig::default()
    })]

    /// Property: N concurrent resolves before settlement invoke the factory exactly once.
    #[test]
    fn prop_concurrent_resolves_single_factory_call(callers in 1usize..48) {
        let calls = Arc::new(AtomicUsize::new(0));
        let factory_calls = calls.clone();
        let module = DeferredModule::new("QuizTaker", move || {
            let calls = factory_calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(3)).await;
                Ok(7u64)
            }
        });

        let values = runtime().block_on(async {
            let tasks: Vec<_> = (0..callers)
                .map(|_| {
                    let module = module.clone();
                    tokio::spawn(async move { module.resolve().await })
                })
                .collect();

            let mut values = Vec::with_capacity(callers);
            for task in tasks {
                values.push(task.await.unwrap().unwrap());
            }
            values
        });

        prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
        prop_assert!(values.iter().all(|v| *v == 7));
    }

    /// Property: each distinct URL is fetched exactly once, however often it repeats.
    #[test]
    fn prop_duplicate_urls_fetch_once(urls in url_list_strategy()) {
        let fetcher = Arc::new(CountingFetcher::default());
        let cache = AssetPrefetchCache::new(fetcher.clone());

        let results = runtime().block_on(cache.prefetch_many(urls.clone()));

        prop_assert_eq!(results.len(), urls.len());
        prop_assert!(results.iter().all(|r| r.is_ok()));

        let distinct: HashSet<_> = urls.iter().cloned().collect();
        let counts = fetcher.0.lock();
        prop_assert_eq!(counts.len(), distinct.len());
        prop_assert!(counts.values().all(|n| *n == 1));
    }

    /// Property: every issued key lands in exactly one of warmed/failed.
    #[test]
    fn prop_batch_settles_every_key(failing in prop::collection::vec(any::<bool>(), 6)) {
        let keys: Vec<String> = (0..failing.len()).map(|i| format!("View{}", i)).collect();
        let registry = Arc::new(ModuleRegistry::new());
        for (key, fails) in keys.iter().zip(&failing) {
            let fails = *fails;
            let name = key.clone();
            registry.register_module(DeferredModule::new(key.as_str(), move || {
                let name = name.clone();
                async move {
                    if fails {
                        Err(PrewarmError::load(name, "rejected"))
                    } else {
                        Ok(())
                    }
                }
            }));
        }
        let preloader = PredictivePreloader::new(Arc::new(RoutePreloadTable::new()), registry);

        let batch: Vec<ResourceKey> = keys.iter().map(ResourceKey::new).collect();
        // Loads start when preload_keys is called, so call it inside the runtime
        let report = runtime().block_on(async { preloader.preload_keys(batch).await });

        let expected_failures = failing.iter().filter(|f| **f).count();
        prop_assert_eq!(report.failed.len(), expected_failures);
        prop_assert_eq!(report.warmed.len(), keys.len() - expected_failures);
        prop_assert!(report.skipped.is_empty());
    }
}
