//! Shared completion slot for in-flight work
//!
//! One producer settles the slot exactly once; any number of waiters
//! observe the same outcome. Used by both the deferred module loader and
//! the asset prefetch cache so concurrent callers never duplicate work.

use crate::{PrewarmError, ResourceKey, Result};
use tokio::sync::watch;

/// Producer half of an in-flight operation
pub(crate) struct FlightSender<T> {
    tx: watch::Sender<Option<Result<T>>>,
}

/// Waiter half of an in-flight operation
#[derive(Clone)]
pub(crate) struct Flight<T> {
    rx: watch::Receiver<Option<Result<T>>>,
}

/// Create a new unsettled flight
pub(crate) fn channel<T>() -> (FlightSender<T>, Flight<T>) {
    let (tx, rx) = watch::channel(None);
    (FlightSender { tx }, Flight { rx })
}

impl<T> FlightSender<T> {
    /// Settle the flight; waiters that arrive later still see the value
    pub(crate) fn complete(self, result: Result<T>) {
        self.tx.send_replace(Some(result));
    }

    /// Arm a guard that settles the flight with `Aborted` if dropped
    /// unsettled (the owning task panicked or was cancelled). `on_abort`
    /// runs first so the owner can roll back its own bookkeeping.
    pub(crate) fn guard<F>(self, key: ResourceKey, on_abort: F) -> FlightGuard<T, F>
    where
        F: FnOnce(&PrewarmError),
    {
        FlightGuard {
            sender: Some(self),
            key,
            on_abort: Some(on_abort),
        }
    }
}

/// Producer half that cannot be lost without settling
pub(crate) struct FlightGuard<T, F: FnOnce(&PrewarmError)> {
    sender: Option<FlightSender<T>>,
    key: ResourceKey,
    on_abort: Option<F>,
}

impl<T, F: FnOnce(&PrewarmError)> FlightGuard<T, F> {
    /// Settle normally and disarm
    pub(crate) fn complete(mut self, result: Result<T>) {
        self.on_abort = None;
        if let Some(sender) = self.sender.take() {
            sender.complete(result);
        }
    }
}

impl<T, F: FnOnce(&PrewarmError)> Drop for FlightGuard<T, F> {
    fn drop(&mut self) {
        let Some(sender) = self.sender.take() else {
            return;
        };
        let err = PrewarmError::Aborted(format!("{}: task ended without settling", self.key));
        if let Some(on_abort) = self.on_abort.take() {
            on_abort(&err);
        }
        sender.complete(Err(err));
    }
}

impl<T: Clone> Flight<T> {
    /// Wait for the flight to settle
    pub(crate) async fn wait(mut self, key: &ResourceKey) -> Result<T> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(settled) => match &*settled {
                Some(result) => result.clone(),
                None => Err(PrewarmError::Aborted(key.to_string())),
            },
            // Producer dropped without settling (task panicked or runtime shut down)
            Err(_) => Err(PrewarmError::Aborted(key.to_string())),
        }
    }
}
