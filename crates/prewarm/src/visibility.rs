//! Viewport visibility loader
//!
//! One host observer multiplexes many one-shot registrations. The host
//! feeds intersection changes in through [`ViewportLoader::on_intersection`];
//! each registration fires at most once and is removed before its
//! callback runs, so a callback that re-registers the same element
//! cannot recurse into itself.

use crate::VisibilityConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Host-assigned handle of an observable element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementHandle(pub u64);

/// One intersection change reported by the host
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityEntry {
    /// Element whose visibility changed
    pub element: ElementHandle,
    /// Visible fraction (0.0 - 1.0), already expanded by the root margin
    pub intersection_ratio: f32,
}

impl VisibilityEntry {
    /// Create an entry
    pub fn new(element: ElementHandle, intersection_ratio: f32) -> Self {
        Self {
            element,
            intersection_ratio,
        }
    }
}

/// Native visibility primitive supplied by the host
pub trait ObserverBackend: Send + Sync {
    /// Start watching an element
    fn observe(&self, element: ElementHandle, config: &VisibilityConfig);

    /// Stop watching an element
    fn unobserve(&self, element: ElementHandle);

    /// Stop watching everything
    fn disconnect(&self);
}

/// One-shot callback fired when the element becomes visible
pub type VisibilityCallback = Box<dyn FnOnce(ElementHandle) + Send>;

/// Shared one-shot visibility loader
pub struct ViewportLoader {
    config: VisibilityConfig,
    backend: Option<Arc<dyn ObserverBackend>>,
    registrations: Mutex<HashMap<ElementHandle, VisibilityCallback>>,
}

impl ViewportLoader {
    /// Create a loader. A `None` backend means the host has no visibility
    /// primitive; the loader then accepts registrations but never fires.
    pub fn new(config: VisibilityConfig, backend: Option<Arc<dyn ObserverBackend>>) -> Self {
        if backend.is_none() {
            warn!("Visibility observer unsupported by host; viewport loads disabled");
        }
        Self {
            config,
            backend,
            registrations: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the host supports visibility observation
    pub fn is_supported(&self) -> bool {
        self.backend.is_some()
    }

    /// Configuration
    pub fn config(&self) -> &VisibilityConfig {
        &self.config
    }

    /// Register a one-shot callback for an element. Re-registering an
    /// element replaces its pending callback.
    pub fn observe<F>(&self, element: ElementHandle, callback: F)
    where
        F: FnOnce(ElementHandle) + Send + 'static,
    {
        let Some(backend) = &self.backend else {
            return;
        };

        let replaced = self
            .registrations
            .lock()
            .insert(element, Box::new(callback))
            .is_some();
        if !replaced {
            backend.observe(element, &self.config);
        }
    }

    /// Remove a registration without firing it. Idempotent.
    pub fn unobserve(&self, element: ElementHandle) {
        let removed = self.registrations.lock().remove(&element).is_some();
        if removed {
            if let Some(backend) = &self.backend {
                backend.unobserve(element);
            }
        }
    }

    /// Remove every registration and stop watching
    pub fn disconnect(&self) {
        self.registrations.lock().clear();
        if let Some(backend) = &self.backend {
            backend.disconnect();
        }
    }

    /// Handle intersection changes from the host; returns how many callbacks fired
    pub fn on_intersection(&self, entries: &[VisibilityEntry]) -> usize {
        let mut fired = 0;

        for entry in entries {
            if entry.intersection_ratio < self.config.threshold {
                continue;
            }

            // Remove first; the lock is released before the callback runs
            let removed = self.registrations.lock().remove(&entry.element);
            let Some(callback) = removed else {
                continue;
            };
            let element = entry.element;

            if let Some(backend) = &self.backend {
                backend.unobserve(element);
            }

            debug!(
                "Element {:?} visible ({:.2}), firing load",
                element, entry.intersection_ratio
            );
            callback(element);
            fired += 1;
        }

        fired
    }

    /// Number of pending registrations
    pub fn len(&self) -> usize {
        self.registrations.lock().len()
    }

    /// Whether no registrations are pending
    pub fn is_empty(&self) -> bool {
        self.registrations.lock().is_empty()
    }

    /// Whether an element has a pending registration
    pub fn is_observing(&self, element: ElementHandle) -> bool {
        self.registrations.lock().contains_key(&element)
    }
}

/// Backend call recorded by [`RecordingBackend`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendCall {
    /// `observe(element)`
    Observe(ElementHandle),
    /// `unobserve(element)`
    Unobserve(ElementHandle),
    /// `disconnect()`
    Disconnect,
}

/// Backend that records calls; for hosts without a real observer in tests
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<BackendCall>>,
}

impl RecordingBackend {
    /// Create a recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls so far
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }
}

impl ObserverBackend for RecordingBackend {
    fn observe(&self, element: ElementHandle, _config: &VisibilityConfig) {
        self.calls.lock().push(BackendCall::Observe(element));
    }

    fn unobserve(&self, element: ElementHandle) {
        self.calls.lock().push(BackendCall::Unobserve(element));
    }

    fn disconnect(&self) {
        self.calls.lock().push(BackendCall::Disconnect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn loader() -> (Arc<ViewportLoader>, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend::new());
        let loader = ViewportLoader::new(VisibilityConfig::default(), Some(backend.clone()));
        (Arc::new(loader), backend)
    }

    fn counter(count: &Arc<AtomicUsize>) -> impl FnOnce(ElementHandle) + Send + 'static {
        let count = count.clone();
        move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_fires_once_past_threshold() {
        let (loader, backend) = loader();
        let count = Arc::new(AtomicUsize::new(0));
        let el = ElementHandle(1);

        loader.observe(el, counter(&count));
        assert_eq!(loader.on_intersection(&[VisibilityEntry::new(el, 0.05)]), 0);
        assert_eq!(loader.on_intersection(&[VisibilityEntry::new(el, 0.5)]), 1);
        assert_eq!(loader.on_intersection(&[VisibilityEntry::new(el, 1.0)]), 0);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(loader.is_empty());
        assert_eq!(
            backend.calls(),
            vec![BackendCall::Observe(el), BackendCall::Unobserve(el)]
        );
    }

    #[test]
    fn test_unobserve_prevents_fire() {
        let (loader, _) = loader();
        let count = Arc::new(AtomicUsize::new(0));
        let el = ElementHandle(2);

        loader.observe(el, counter(&count));
        loader.unobserve(el);
        loader.unobserve(el);
        loader.on_intersection(&[VisibilityEntry::new(el, 1.0)]);

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reregister_from_callback_does_not_recurse() {
        let (loader, _) = loader();
        let count = Arc::new(AtomicUsize::new(0));
        let el = ElementHandle(3);

        let inner_loader = loader.clone();
        let inner_count = count.clone();
        loader.observe(el, move |element| {
            inner_count.fetch_add(1, Ordering::SeqCst);
            let again = inner_count.clone();
            inner_loader.observe(element, move |_| {
                again.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert_eq!(loader.on_intersection(&[VisibilityEntry::new(el, 1.0)]), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(loader.is_observing(el));

        // The new registration fires on the next crossing
        loader.on_intersection(&[VisibilityEntry::new(el, 1.0)]);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_disconnect_clears() {
        let (loader, backend) = loader();
        let count = Arc::new(AtomicUsize::new(0));

        for i in 0..4 {
            loader.observe(ElementHandle(i), counter(&count));
        }
        loader.disconnect();
        let entries: Vec<_> = (0..4).map(|i| VisibilityEntry::new(ElementHandle(i), 1.0)).collect();

        assert_eq!(loader.on_intersection(&entries), 0);
        assert_eq!(backend.calls().last(), Some(&BackendCall::Disconnect));
    }

    #[test]
    fn test_unsupported_host_is_noop() {
        let loader = ViewportLoader::new(VisibilityConfig::default(), None);
        let count = Arc::new(AtomicUsize::new(0));
        let el = ElementHandle(9);

        loader.observe(el, counter(&count));
        loader.on_intersection(&[VisibilityEntry::new(el, 1.0)]);
        loader.unobserve(el);
        loader.disconnect();

        assert!(!loader.is_supported());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
