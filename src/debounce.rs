//! Trailing-edge debouncing on the tokio runtime.
//!
//! A [`Debouncer`] collapses a burst of calls into a single trailing call
//! made once `wait` has elapsed since the most recent call. At most one
//! timer is pending at a time; each call replaces it.
//!
//! Only the waiting phase can be cancelled. Once the quiet period elapses
//! the callback is detached onto the runtime and runs to completion, so a
//! later call never aborts work that has already started.

use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type Callback<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

pub struct Debouncer<T> {
    wait: Duration,
    callback: Callback<T>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F>(wait: Duration, callback: F) -> Self
    where
        F: Fn(T) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Self {
            wait,
            callback: Arc::new(callback),
            pending: Mutex::new(None),
        }
    }

    /// Schedules `callback(arg)` after the quiet period, replacing any
    /// call that is still waiting.
    ///
    /// Must be called from within a tokio runtime.
    pub fn call(&self, arg: T) {
        // The quiet period starts now, not when the runtime first polls the timer.
        let deadline = Instant::now() + self.wait;
        let callback = self.callback.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            // No await between waking and detaching: an abort can only land
            // while the timer is still sleeping.
            tokio::spawn(callback(arg));
        });

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.replace(handle) {
            previous.abort();
        }
    }

    /// Discards the pending call, if any.
    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.take() {
            previous.abort();
        }
    }

    /// Whether a call is still waiting for its quiet period to elapse.
    pub fn is_pending(&self) -> bool {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(handle) = pending.take() {
                handle.abort();
            }
        }
    }
}
