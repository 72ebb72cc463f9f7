//! HTTP transport for prewarm
//!
//! - **Asset Fetcher**: reqwest GET with retry and exponential backoff,
//!   plugged into [`prewarm::AssetPrefetchCache`]
//! - **Resource Prefetcher**: best-effort HEAD probes and static asset
//!   prefetch at session start
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 ResourcePrefetcher                    │
//! ├──────────────────────────────────────────────────────┤
//! │  probe_endpoints ──> HEAD ─────┐                     │
//! │                                ↓                     │
//! │                         HttpAssetFetcher ──> server  │
//! │                                ↑                     │
//! │  static_assets ──> AssetPrefetchCache (dedup)        │
//! └──────────────────────────────────────────────────────┘
//! ```

mod client;
mod config;
mod error;
mod prefetcher;

#[cfg(test)]
mod test_server;

pub use client::HttpAssetFetcher;
pub use config::{NetworkConfig, PrefetchConfig, RetryConfig};
pub use error::{NetworkError, Result};
pub use prefetcher::{PrefetchSummary, ResourcePrefetcher};

/// Prelude for common imports
pub mod prelude {
    pub use super::{
        HttpAssetFetcher, NetworkConfig, PrefetchConfig, PrefetchSummary, ResourcePrefetcher,
        Result,
    };
}
