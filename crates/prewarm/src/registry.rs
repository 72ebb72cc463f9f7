//! Module registry keyed by resource identity

use crate::{DeferredModule, ModuleStatus, ResourceKey, Warmable};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Process-wide table of deferred modules.
///
/// Registering the same key twice keeps the first module, so every
/// caller that asks for a key warms the same underlying load.
/// Resolved modules are never evicted from here.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: DashMap<ResourceKey, Arc<dyn Warmable>>,
}

impl ModuleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module, returning whichever module now owns the key
    pub fn register(&self, module: Arc<dyn Warmable>) -> Arc<dyn Warmable> {
        let key = module.key().clone();
        let entry = self.modules.entry(key).or_insert_with(|| {
            debug!("Registered module '{}'", module.key());
            module
        });
        entry.value().clone()
    }

    /// Wrap and register a factory-backed module
    pub fn register_module<T>(&self, module: DeferredModule<T>) -> Arc<dyn Warmable>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.register(Arc::new(module))
    }

    /// Look up a module
    pub fn get(&self, key: &str) -> Option<Arc<dyn Warmable>> {
        self.modules.get(key).map(|m| m.value().clone())
    }

    /// Whether a key is registered
    pub fn contains(&self, key: &str) -> bool {
        self.modules.contains_key(key)
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<_> = self.modules.iter().map(|m| m.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Status of every module, sorted by key
    pub fn statuses(&self) -> Vec<(ResourceKey, ModuleStatus)> {
        let mut statuses: Vec<_> = self
            .modules
            .iter()
            .map(|m| (m.key().clone(), m.value().status()))
            .collect();
        statuses.sort_by(|a, b| a.0.cmp(&b.0));
        statuses
    }

    /// Number of registered modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
