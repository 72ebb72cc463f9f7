//! Cache janitor
//!
//! Reports process memory pressure and clears transient caches that have
//! grown over a long session. Only caches of re-derivable data register
//! here; resolved modules are kept, since evicting loaded code only forces
//! a re-fetch.

use crate::JanitorConfig;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// A cache holding reclaimable data
pub trait TransientCache: Send + Sync {
    /// Name used in reports
    fn name(&self) -> &str;

    /// Number of entries
    fn len(&self) -> usize;

    /// Whether the cache is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry, returning how many were dropped
    fn clear(&self) -> usize;
}

/// Point-in-time memory measurement, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySnapshot {
    /// Memory in use
    pub used_units: u64,
    /// Memory reserved by the process
    pub total_units: u64,
    /// Upper bound the process may grow to
    pub limit_units: u64,
}

impl MemorySnapshot {
    /// Used / limit ratio
    pub fn pressure(&self) -> f32 {
        if self.limit_units == 0 {
            0.0
        } else {
            self.used_units as f32 / self.limit_units as f32
        }
    }
}

/// Source of memory counters
pub trait MemoryProbe: Send + Sync {
    /// Current counters, or `None` when the runtime exposes none
    fn snapshot(&self) -> Option<MemorySnapshot>;
}

/// Reads the current process' counters from procfs; `None` off Linux
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessMemoryProbe;

impl MemoryProbe for ProcessMemoryProbe {
    #[cfg(target_os = "linux")]
    fn snapshot(&self) -> Option<MemorySnapshot> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;

        let used = proc_field_kb(&status, "VmRSS:")? * 1024;
        let total = proc_field_kb(&status, "VmData:").map_or(used, |kb| kb * 1024);
        let system = proc_field_kb(&meminfo, "MemTotal:")? * 1024;

        let limit = std::fs::read_to_string("/proc/self/cgroup")
            .ok()
            .and_then(|cgroups| cgroup_memory_limit(&cgroups))
            .map_or(system, |cgroup| cgroup.min(system));

        Some(MemorySnapshot {
            used_units: used,
            total_units: total.max(used),
            limit_units: limit,
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn snapshot(&self) -> Option<MemorySnapshot> {
        None
    }
}

/// Limit file of the cgroup this process belongs to, from `/proc/self/cgroup`
#[cfg(any(target_os = "linux", test))]
fn cgroup_limit_path(cgroups: &str) -> Option<String> {
    // v2 unified hierarchy: "0::/path"
    if let Some(path) = cgroups.lines().find_map(|line| line.strip_prefix("0::")) {
        return Some(format!("/sys/fs/cgroup{}/memory.max", path.trim_end_matches('/')));
    }

    // v1: "N:memory:/path" (controllers may be comma-joined)
    cgroups.lines().find_map(|line| {
        let mut fields = line.splitn(3, ':');
        let _id = fields.next()?;
        let controllers = fields.next()?;
        let path = fields.next()?;
        controllers.split(',').any(|c| c == "memory").then(|| {
            format!(
                "/sys/fs/cgroup/memory{}/memory.limit_in_bytes",
                path.trim_end_matches('/')
            )
        })
    })
}

/// Tightest memory limit on this process' cgroup or any ancestor;
/// `None` when unlimited or unreadable
#[cfg(target_os = "linux")]
fn cgroup_memory_limit(cgroups: &str) -> Option<u64> {
    use std::path::Path;

    let path = cgroup_limit_path(cgroups)?;
    let path = Path::new(&path);
    let file = path.file_name()?;

    path.parent()?
        .ancestors()
        .take_while(|dir| dir.starts_with("/sys/fs/cgroup"))
        .filter_map(|dir| std::fs::read_to_string(dir.join(file)).ok())
        // "max" when unlimited under v2
        .filter_map(|limit| limit.trim().parse::<u64>().ok())
        .min()
}

#[cfg(target_os = "linux")]
fn proc_field_kb(contents: &str, field: &str) -> Option<u64> {
    contents
        .lines()
        .find(|line| line.starts_with(field))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse().ok())
}

/// Result of a cache sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    /// (cache name, entries dropped)
    pub cleared: Vec<(String, usize)>,
}

impl ClearReport {
    /// Total entries dropped
    pub fn total(&self) -> usize {
        self.cleared.iter().map(|(_, n)| n).sum()
    }
}

/// Memory reporter and transient cache sweeper
pub struct CacheJanitor {
    caches: RwLock<Vec<Arc<dyn TransientCache>>>,
    probe: Arc<dyn MemoryProbe>,
}

impl CacheJanitor {
    /// Create a janitor reading process memory counters
    pub fn new() -> Self {
        Self::with_probe(Arc::new(ProcessMemoryProbe))
    }

    /// Create a janitor with a custom memory probe
    pub fn with_probe(probe: Arc<dyn MemoryProbe>) -> Self {
        Self {
            caches: RwLock::new(Vec::new()),
            probe,
        }
    }

    /// Register a transient cache
    pub fn register(&self, cache: Arc<dyn TransientCache>) {
        debug!("Janitor tracking cache '{}'", cache.name());
        self.caches.write().push(cache);
    }

    /// Names of registered caches
    pub fn cache_names(&self) -> Vec<String> {
        self.caches.read().iter().map(|c| c.name().to_string()).collect()
    }

    /// Current memory counters, if available
    pub fn get_memory_usage(&self) -> Option<MemorySnapshot> {
        self.probe.snapshot()
    }

    /// Current used/limit ratio, if available
    pub fn pressure(&self) -> Option<f32> {
        self.get_memory_usage().map(|s| s.pressure())
    }

    /// Clear every registered transient cache
    pub fn clear_caches(&self) -> ClearReport {
        let caches = self.caches.read().clone();
        let report = ClearReport {
            cleared: caches
                .iter()
                .map(|c| (c.name().to_string(), c.clear()))
                .collect(),
        };
        info!(
            "Cleared {} entries from {} caches",
            report.total(),
            report.cleared.len()
        );
        report
    }

    /// Clear caches if pressure is at or above `threshold`
    pub fn sweep(&self, threshold: f32) -> Option<ClearReport> {
        let pressure = self.pressure()?;
        if pressure < threshold {
            debug!("Memory pressure {:.2} below {:.2}, nothing to do", pressure, threshold);
            return None;
        }
        info!("Memory pressure {:.2}, clearing caches", pressure);
        Some(self.clear_caches())
    }

    /// Sweep on a timer until the handle is aborted
    pub fn spawn_periodic(self: Arc<Self>, config: &JanitorConfig) -> JoinHandle<()> {
        let period = config.interval();
        let threshold = config.pressure_threshold;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                self.sweep(threshold);
            }
        })
    }
}

impl Default for CacheJanitor {
    fn default() -> Self {
        Self::new()
    }
}
