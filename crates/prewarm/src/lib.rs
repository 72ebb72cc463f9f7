//! Deferred Module Loading and Predictive Prefetch
//!
//! Keeps perceived navigation latency low in a long-lived client session:
//! - Deferred modules load on first use, exactly once, even under concurrency
//! - Predictive warm-up by role, location and hover intent
//! - Viewport-triggered loads for below-the-fold content
//! - Deduplicated asset prefetching
//! - Memory reporting and transient cache clearing
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Prewarm Session                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  role / location ──> Predictive Preloader ──> Module Registry│
//! │  pointer-enter ───> Hover Debouncer ──────┘        │         │
//! │  element visible ─> Viewport Loader ───────────────┤         │
//! │                                                    ↓         │
//! │                                          Deferred Modules    │
//! │                                          (single-flight)     │
//! │                                                              │
//! │  element visible ─> Asset Prefetch Cache ──> AssetFetcher    │
//! │                            ↑                                 │
//! │                      Cache Janitor (memory pressure sweep)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod asset;
mod config;
mod deferred;
mod error;
mod flight;
mod hover;
mod janitor;
mod key;
mod preloader;
mod registry;
mod session;
mod table;
mod visibility;

pub use asset::{AssetCacheStats, AssetFetcher, AssetPrefetchCache, AssetStatus};
pub use config::{HoverConfig, JanitorConfig, LoaderConfig, PrewarmConfig, VisibilityConfig};
pub use deferred::{DeferredModule, ModuleFactory, ModuleStatus, Warmable};
pub use error::{PrewarmError, Result};
pub use hover::HoverDebouncer;
pub use janitor::{
    CacheJanitor, ClearReport, MemoryProbe, MemorySnapshot, ProcessMemoryProbe, TransientCache,
};
pub use key::{ResourceKey, ResourceKind};
pub use preloader::{PredictivePreloader, PreloadReport, PreloaderStats};
pub use registry::ModuleRegistry;
pub use session::{PrewarmSession, SessionStats};
pub use table::{Role, RoutePreloadTable};
pub use visibility::{
    BackendCall, ElementHandle, ObserverBackend, RecordingBackend, ViewportLoader,
    VisibilityCallback, VisibilityEntry,
};

/// Default delay between pointer-enter and a hover warm-up (ms)
pub const DEFAULT_HOVER_DEBOUNCE_MS: u64 = 100;

/// Default visible fraction that triggers a viewport load
pub const DEFAULT_VISIBILITY_THRESHOLD: f32 = 0.1;

/// Default margin around the viewport (logical pixels)
pub const DEFAULT_ROOT_MARGIN_PX: u32 = 50;

/// Default per-attempt module load timeout (ms)
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 30_000;

/// Shortest janitor sweep interval (ms)
pub const MIN_JANITOR_INTERVAL_MS: u64 = 1_000;

/// Prelude for common imports
pub mod prelude {
    pub use super::{
        AssetFetcher, AssetPrefetchCache, CacheJanitor, DeferredModule, ModuleRegistry,
        PredictivePreloader, PrewarmConfig, PrewarmSession, ResourceKey, Result, Role,
        RoutePreloadTable, ViewportLoader,
    };
}
