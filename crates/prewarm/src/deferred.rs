//! Deferred module loader
//!
//! Wraps a module factory so it runs at most once per successful load.
//! Concurrent callers share the in-flight attempt; a failure is not
//! sticky and the next call retries, while a resolved value is kept for
//! the life of the process.

use crate::flight::{self, Flight, FlightSender};
use crate::{LoaderConfig, PrewarmError, ResourceKey, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Factory producing the module on demand
pub type ModuleFactory<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Observable state of a deferred module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    /// Factory never invoked
    NotStarted,
    /// Factory invoked, waiting to settle
    Loading,
    /// Value available, permanent
    Resolved,
    /// Last attempt failed, next call retries
    Failed,
}

enum LoadState<T> {
    NotStarted,
    Loading { generation: u64, flight: Flight<T> },
    Resolved(T),
    Failed(PrewarmError),
}

struct ModuleInner<T> {
    state: LoadState<T>,
    /// Bumped on every attempt so a stale completion cannot overwrite a newer one
    generation: u64,
    attempts: u32,
}

enum Begin<T> {
    Settled(Result<T>),
    Waiting(Flight<T>),
}

/// A lazily loaded unit of code or data
pub struct DeferredModule<T> {
    key: ResourceKey,
    factory: ModuleFactory<T>,
    timeout: Option<Duration>,
    inner: Arc<Mutex<ModuleInner<T>>>,
}

impl<T> Clone for DeferredModule<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            factory: self.factory.clone(),
            timeout: self.timeout,
            inner: self.inner.clone(),
        }
    }
}

impl<T> DeferredModule<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wrap a factory. No work happens until the first `resolve`/`preload`.
    pub fn new<F, Fut>(key: impl Into<ResourceKey>, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            key: key.into(),
            factory: Arc::new(move || factory().boxed()),
            timeout: LoaderConfig::default().load_timeout(),
            inner: Arc::new(Mutex::new(ModuleInner {
                state: LoadState::NotStarted,
                generation: 0,
                attempts: 0,
            })),
        }
    }

    /// Set per-attempt timeout (`None` disables it)
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Apply loader configuration
    pub fn with_config(self, config: &LoaderConfig) -> Self {
        self.with_timeout(config.load_timeout())
    }

    /// Resource key of this module
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Get the module, loading it if necessary.
    ///
    /// The load is started before this returns, so dropping the returned
    /// future does not cancel it.
    pub fn resolve(&self) -> impl Future<Output = Result<T>> + Send + 'static {
        let begun = self.begin();
        let key = self.key.clone();

        async move {
            match begun {
                Begin::Settled(result) => result,
                Begin::Waiting(flight) => flight.wait(&key).await,
            }
        }
    }

    /// Warm the module ahead of need. Same semantics as [`resolve`](Self::resolve).
    pub fn preload(&self) -> impl Future<Output = Result<T>> + Send + 'static {
        self.resolve()
    }

    /// Current status
    pub fn status(&self) -> ModuleStatus {
        match self.inner.lock().state {
            LoadState::NotStarted => ModuleStatus::NotStarted,
            LoadState::Loading { .. } => ModuleStatus::Loading,
            LoadState::Resolved(_) => ModuleStatus::Resolved,
            LoadState::Failed(_) => ModuleStatus::Failed,
        }
    }

    /// Resolved value, if any, without triggering a load
    pub fn peek(&self) -> Option<T> {
        match &self.inner.lock().state {
            LoadState::Resolved(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Error from the last failed attempt, if the module is currently failed
    pub fn last_error(&self) -> Option<PrewarmError> {
        match &self.inner.lock().state {
            LoadState::Failed(e) => Some(e.clone()),
            _ => None,
        }
    }

    /// Number of times the factory has been invoked
    pub fn attempts(&self) -> u32 {
        self.inner.lock().attempts
    }

    /// Check-then-set under one lock: either hand back the settled value,
    /// join the in-flight attempt, or start a new one.
    fn begin(&self) -> Begin<T> {
        let (generation, sender, flight) = {
            let mut inner = self.inner.lock();
            match &inner.state {
                LoadState::Resolved(value) => return Begin::Settled(Ok(value.clone())),
                LoadState::Loading { flight, .. } => return Begin::Waiting(flight.clone()),
                LoadState::NotStarted | LoadState::Failed(_) => {}
            }

            inner.generation += 1;
            inner.attempts += 1;
            let generation = inner.generation;
            let (sender, flight) = flight::channel();
            inner.state = LoadState::Loading {
                generation,
                flight: flight.clone(),
            };
            (generation, sender, flight)
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                let err = PrewarmError::Aborted(format!("{}: no async runtime", self.key));
                settle(&self.inner, generation, &Err(err.clone()));
                sender.complete(Err(err.clone()));
                return Begin::Settled(Err(err));
            }
        };

        debug!("Loading module '{}'", self.key);
        handle.spawn(drive(
            self.key.clone(),
            self.inner.clone(),
            generation,
            self.factory.clone(),
            self.timeout,
            sender,
        ));

        Begin::Waiting(flight)
    }
}

/// Run one load attempt to completion, regardless of caller interest.
///
/// The factory runs here, outside the state lock, so a factory that
/// touches this module cannot deadlock. If the attempt panics or the task
/// is torn down, the guard fails this generation so the next call retries.
async fn drive<T: Clone>(
    key: ResourceKey,
    inner: Arc<Mutex<ModuleInner<T>>>,
    generation: u64,
    factory: ModuleFactory<T>,
    timeout: Option<Duration>,
    sender: FlightSender<T>,
) {
    let guard = sender.guard(key.clone(), {
        let inner = inner.clone();
        let key = key.clone();
        move |err| {
            warn!("Module '{}' load aborted: {}", key, err);
            settle(&inner, generation, &Err(err.clone()));
        }
    });

    let load = factory();
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, load).await {
            Ok(result) => result,
            Err(_) => Err(PrewarmError::Timeout {
                key: key.to_string(),
                ms: limit.as_millis() as u64,
            }),
        },
        None => load.await,
    };

    match &result {
        Ok(_) => debug!("Module '{}' resolved", key),
        Err(e) => warn!("Module '{}' failed, will retry on next request: {}", key, e),
    }

    settle(&inner, generation, &result);
    guard.complete(result);
}

fn settle<T: Clone>(inner: &Mutex<ModuleInner<T>>, generation: u64, result: &Result<T>) {
    let mut inner = inner.lock();
    let current = matches!(
        inner.state,
        LoadState::Loading { generation: g, .. } if g == generation
    );
    if current {
        inner.state = match result {
            Ok(value) => LoadState::Resolved(value.clone()),
            Err(e) => LoadState::Failed(e.clone()),
        };
    }
}

/// Type-erased face of a deferred module, so modules of different value
/// types can share one registry
pub trait Warmable: Send + Sync {
    /// Resource key
    fn key(&self) -> &ResourceKey;

    /// Current status
    fn status(&self) -> ModuleStatus;

    /// Start (or join) a load, discarding the value
    fn warm(&self) -> BoxFuture<'static, Result<()>>;
}

impl<T> Warmable for DeferredModule<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn key(&self) -> &ResourceKey {
        DeferredModule::key(self)
    }

    fn status(&self) -> ModuleStatus {
        DeferredModule::status(self)
    }

    fn warm(&self) -> BoxFuture<'static, Result<()>> {
        self.preload().map(|r| r.map(|_| ())).boxed()
    }
}
