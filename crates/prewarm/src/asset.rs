//! Asset prefetch cache
//!
//! Deduplicates concurrent asset fetches by URL. The cache holds no asset
//! bytes: a completed entry is only a marker that the fetch already
//! happened, so the transport's own cache is warm.

use crate::flight::{self, Flight, FlightSender};
use crate::janitor::TransientCache;
use crate::{PrewarmError, ResourceKey, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Performs the actual asset load
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch an asset, discarding its body
    async fn fetch(&self, url: &ResourceKey) -> Result<()>;
}

/// Status of a cached asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetStatus {
    /// Fetch in flight
    Pending,
    /// Fetched at least once
    Completed,
}

enum AssetEntry {
    Pending { id: u64, flight: Flight<()> },
    Completed,
}

/// Asset cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetCacheStats {
    /// Entries currently held
    pub entries: usize,
    /// Underlying fetches issued
    pub fetches: u64,
    /// Callers that joined an in-flight fetch
    pub pending_hits: u64,
    /// Callers served by a completed entry
    pub completed_hits: u64,
    /// Fetches that failed
    pub failures: u64,
}

#[derive(Default)]
struct StatsInner {
    fetches: AtomicU64,
    pending_hits: AtomicU64,
    completed_hits: AtomicU64,
    failures: AtomicU64,
}

struct CacheInner {
    fetcher: Arc<dyn AssetFetcher>,
    entries: DashMap<ResourceKey, AssetEntry>,
    next_id: AtomicU64,
    stats: StatsInner,
}

/// Deduplicating prefetch cache for assets such as images
#[derive(Clone)]
pub struct AssetPrefetchCache {
    inner: Arc<CacheInner>,
}

enum Begin {
    Done,
    Waiting(Flight<()>),
    Start {
        id: u64,
        sender: FlightSender<()>,
        flight: Flight<()>,
    },
}

impl AssetPrefetchCache {
    /// Create a cache over a fetcher
    pub fn new(fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                fetcher,
                entries: DashMap::new(),
                next_id: AtomicU64::new(0),
                stats: StatsInner::default(),
            }),
        }
    }

    /// Prefetch one asset.
    ///
    /// A second caller for a URL already in flight awaits the same fetch;
    /// a completed URL is a no-op. A failed fetch is dropped from the
    /// cache so a later call retries. The fetch is issued before this
    /// returns, so dropping the future does not cancel it.
    pub fn prefetch(
        &self,
        url: impl Into<ResourceKey>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let url = url.into();
        let outcome = match self.begin(&url) {
            Begin::Done => Ok(None),
            Begin::Waiting(flight) => Ok(Some(flight)),
            Begin::Start { id, sender, flight } => self
                .spawn_fetch(url.clone(), id, sender)
                .map(|()| Some(flight)),
        };

        async move {
            match outcome {
                Ok(None) => Ok(()),
                Ok(Some(flight)) => flight.wait(&url).await,
                Err(e) => Err(e),
            }
        }
    }

    /// Prefetch many assets concurrently; duplicates share one fetch
    pub async fn prefetch_many<I, K>(&self, urls: I) -> Vec<Result<()>>
    where
        I: IntoIterator<Item = K>,
        K: Into<ResourceKey>,
    {
        let pending: Vec<_> = urls.into_iter().map(|url| self.prefetch(url)).collect();
        join_all(pending).await
    }

    /// Status of a URL, if cached
    pub fn status(&self, url: &str) -> Option<AssetStatus> {
        self.inner.entries.get(url).map(|e| match e.value() {
            AssetEntry::Pending { .. } => AssetStatus::Pending,
            AssetEntry::Completed => AssetStatus::Completed,
        })
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Drop every entry. In-flight fetches finish but are not recorded.
    pub fn clear(&self) -> usize {
        let count = self.inner.entries.len();
        self.inner.entries.clear();
        count
    }

    /// Statistics snapshot
    pub fn stats(&self) -> AssetCacheStats {
        let stats = &self.inner.stats;
        AssetCacheStats {
            entries: self.inner.entries.len(),
            fetches: stats.fetches.load(Ordering::Relaxed),
            pending_hits: stats.pending_hits.load(Ordering::Relaxed),
            completed_hits: stats.completed_hits.load(Ordering::Relaxed),
            failures: stats.failures.load(Ordering::Relaxed),
        }
    }

    fn begin(&self, url: &ResourceKey) -> Begin {
        let inner = &self.inner;
        match inner.entries.entry(url.clone()) {
            Entry::Occupied(entry) => match entry.get() {
                AssetEntry::Completed => {
                    inner.stats.completed_hits.fetch_add(1, Ordering::Relaxed);
                    Begin::Done
                }
                AssetEntry::Pending { flight, .. } => {
                    inner.stats.pending_hits.fetch_add(1, Ordering::Relaxed);
                    debug!("Joining in-flight prefetch of '{}'", url);
                    Begin::Waiting(flight.clone())
                }
            },
            Entry::Vacant(entry) => {
                let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
                let (sender, flight) = flight::channel();
                entry.insert(AssetEntry::Pending {
                    id,
                    flight: flight.clone(),
                });
                inner.stats.fetches.fetch_add(1, Ordering::Relaxed);
                Begin::Start { id, sender, flight }
            }
        }
    }

    /// Own the fetch on a task so it completes even if every caller gives up
    fn spawn_fetch(&self, url: ResourceKey, id: u64, sender: FlightSender<()>) -> Result<()> {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                let err = PrewarmError::Aborted(format!("{}: no async runtime", url));
                self.inner.entries.remove_if(&url, |_, e| e.is_pending(id));
                sender.complete(Err(err.clone()));
                return Err(err);
            }
        };

        let inner = self.inner.clone();
        handle.spawn(async move {
            // A panicking fetcher still drops its entry so the URL stays retryable
            let guard = sender.guard(url.clone(), {
                let inner = inner.clone();
                let url = url.clone();
                move |err| inner.settle(&url, id, &Err(err.clone()))
            });

            let result = inner.fetcher.fetch(&url).await;
            inner.settle(&url, id, &result);
            guard.complete(result);
        });
        Ok(())
    }
}

impl CacheInner {
    /// Record the outcome, unless the entry was cleared or replaced meanwhile
    fn settle(&self, url: &ResourceKey, id: u64, result: &Result<()>) {
        match result {
            Ok(()) => {
                if let Some(mut entry) = self.entries.get_mut(url) {
                    if entry.is_pending(id) {
                        *entry = AssetEntry::Completed;
                    }
                }
                debug!("Prefetched '{}'", url);
            }
            Err(e) => {
                self.entries.remove_if(url, |_, entry| entry.is_pending(id));
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!("Prefetch of '{}' failed: {}", url, e);
            }
        }
    }
}

impl AssetEntry {
    fn is_pending(&self, id: u64) -> bool {
        matches!(self, AssetEntry::Pending { id: current, .. } if *current == id)
    }
}

impl TransientCache for AssetPrefetchCache {
    fn name(&self) -> &str {
        "asset-prefetch"
    }

    fn len(&self) -> usize {
        AssetPrefetchCache::len(self)
    }

    fn clear(&self) -> usize {
        AssetPrefetchCache::clear(self)
    }
}
