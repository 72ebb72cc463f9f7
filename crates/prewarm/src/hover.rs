//! Debounced hover-triggered warm-ups
//!
//! Pointer-enter schedules a warm-up after a short delay; pointer-leave
//! before the delay elapses cancels it, so sweeping the pointer across a
//! menu does not issue a burst of loads. Once a warm-up has been issued
//! it runs to completion.

use crate::{HoverConfig, PredictivePreloader};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Per-target debounce timers in front of [`PredictivePreloader::preload_on_hover`]
#[derive(Clone)]
pub struct HoverDebouncer {
    preloader: PredictivePreloader,
    delay: Duration,
    pending: Arc<DashMap<String, (u64, JoinHandle<()>)>>,
    next_id: Arc<AtomicU64>,
}

impl HoverDebouncer {
    /// Create a debouncer
    pub fn new(preloader: PredictivePreloader, config: &HoverConfig) -> Self {
        Self {
            preloader,
            delay: config.debounce(),
            pending: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Pointer entered `target`: schedule a warm-up, replacing any pending one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn pointer_enter(&self, target: &str) {
        let preloader = self.preloader.clone();
        let pending = self.pending.clone();
        let delay = self.delay;
        let name = target.to_string();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        // Hold the slot until the handle is stored, so a zero-delay timer
        // cannot fire and clear it before it is registered
        let slot = self.pending.entry(target.to_string());

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // A newer timer for the same target owns the slot
            pending.remove_if(&name, |_, (owner, _)| *owner == id);

            if let Some(warm) = preloader.preload_on_hover(&name) {
                // Hover preloading is advisory; the failure is already logged
                let _ = warm.await;
            }
        });

        let previous = match slot {
            Entry::Occupied(mut slot) => Some(slot.insert((id, handle))),
            Entry::Vacant(slot) => {
                slot.insert((id, handle));
                None
            }
        };
        if let Some((_, previous)) = previous {
            previous.abort();
        }
        debug!("Hover scheduled for '{}' in {:?}", target, self.delay);
    }

    /// Pointer left `target`: cancel its warm-up if it has not fired yet
    pub fn pointer_leave(&self, target: &str) -> bool {
        match self.pending.remove(target) {
            Some((_, (_, handle))) => {
                handle.abort();
                debug!("Hover cancelled for '{}'", target);
                true
            }
            None => false,
        }
    }

    /// Targets with a warm-up still waiting on its timer
    pub fn pending(&self) -> Vec<String> {
        let mut targets: Vec<_> = self.pending.iter().map(|e| e.key().clone()).collect();
        targets.sort();
        targets
    }

    /// Cancel every pending warm-up
    pub fn cancel_all(&self) {
        self.pending.retain(|_, (_, handle)| {
            handle.abort();
            false
        });
    }
}
