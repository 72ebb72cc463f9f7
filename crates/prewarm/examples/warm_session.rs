//! Walk a simulated session through every warm-up trigger.
//!
//! Usage:
//! ```bash
//! RUST_LOG=prewarm=debug cargo run --example warm_session -p prewarm
//! ```

use async_trait::async_trait;
use prewarm::prelude::*;
use prewarm::{ElementHandle, RecordingBackend, VisibilityEntry};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fetcher standing in for the browser's network stack
struct SimulatedFetcher;

#[async_trait]
impl AssetFetcher for SimulatedFetcher {
    async fn fetch(&self, _url: &ResourceKey) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(15)).await;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = PrewarmConfig::from_json(r#"{ "hover": { "debounce_ms": 80 } }"#)?;
    let table = RoutePreloadTable::education_platform();

    // Every view in the table is a chunk that takes a while to load
    let registry = Arc::new(ModuleRegistry::new());
    for key in table.all_keys() {
        let name = key.to_string();
        let module = DeferredModule::new(key, move || {
            let name = name.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                Ok(format!("<{} chunk>", name))
            }
        })
        .with_config(&config.loader);
        registry.register_module(module);
    }

    let session = PrewarmSession::new(
        config,
        table,
        registry.clone(),
        Arc::new(SimulatedFetcher),
        Some(Arc::new(RecordingBackend::new())),
    )?;

    println!("Prewarm Session Walkthrough");
    println!("===========================\n");

    let start = Instant::now();
    let report = session.start().await;
    println!("critical:  {:>2} warmed in {:?}", report.warmed.len(), start.elapsed());

    let start = Instant::now();
    let report = session.on_role_changed(Role::Teacher).await;
    println!("teacher:   {:>2} warmed in {:?}", report.warmed.len(), start.elapsed());

    let start = Instant::now();
    let report = session
        .on_location_changed("/quizzes", Some(Role::Teacher))
        .await;
    println!(
        "/quizzes:  {:>2} warmed in {:?} (already resolved modules return at once)",
        report.warmed.len(),
        start.elapsed()
    );

    // A pointer sweep across the nav: only the item it rests on warms
    session.hover().pointer_enter("meetings");
    tokio::time::sleep(Duration::from_millis(20)).await;
    session.hover().pointer_leave("meetings");
    session.hover().pointer_enter("settings");
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Below-the-fold analytics panel and hero image scroll into view
    let panel = ElementHandle(1);
    let hero = ElementHandle(2);
    session.preload_when_visible(panel, "PlatformAnalytics");
    session.prefetch_when_visible(hero, "/images/classroom-hero.webp");
    session.viewport().on_intersection(&[
        VisibilityEntry::new(panel, 0.4),
        VisibilityEntry::new(hero, 1.0),
    ]);
    session
        .assets()
        .prefetch("/images/classroom-hero.webp")
        .await?;

    println!("\n{:24} {:>12}", "Module", "Status");
    println!("{}", "-".repeat(37));
    for (key, status) in registry.statuses() {
        println!("{:24} {:>12}", key.as_str(), format!("{:?}", status));
    }

    let stats = session.stats();
    println!(
        "\n{} of {} modules resolved, {} asset fetches, memory: {:?}",
        stats.resolved_modules,
        stats.modules,
        stats.assets.fetches,
        session.janitor().get_memory_usage()
    );

    let cleared = session.janitor().clear_caches();
    println!("janitor cleared {} cache entries", cleared.total());

    session.shutdown();
    Ok(())
}
