//! Memoized per-resource cache slots.
//!
//! One [`CacheSlot`] exists per resource kind. A slot issues at most one
//! fetch between invalidations: concurrent callers before resolution wait on
//! the in-flight fetch and observe the same `Arc` payload. Refreshes are
//! serialized per slot, so a forced refresh issued while a fetch is in
//! flight waits for it and then refetches instead of racing it. A failed
//! fetch leaves the slot re-fetchable rather than poisoned.

use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;

enum SlotState<T> {
    Empty,
    /// A fetch is in flight; waiters queue on the refresh lock.
    Pending,
    Ready(Arc<T>),
    /// Last fetch failed. Kept for observability only; the next `get`
    /// retries as if the slot were empty.
    Failed(String),
}

pub struct CacheSlot<T> {
    name: &'static str,
    state: RwLock<SlotState<T>>,
    refresh: Mutex<()>,
}

impl<T: Send + Sync> CacheSlot<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: RwLock::new(SlotState::Empty),
            refresh: Mutex::new(()),
        }
    }

    /// Resolved value, if any. Pending and failed states read as empty.
    pub fn peek(&self) -> Option<Arc<T>> {
        match &*self.state.read() {
            SlotState::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn last_error(&self) -> Option<String> {
        match &*self.state.read() {
            SlotState::Failed(message) => Some(message.clone()),
            _ => None,
        }
    }

    pub fn invalidate(&self) {
        *self.state.write() = SlotState::Empty;
    }

    /// Returns the cached value or runs `fetch` to populate the slot.
    ///
    /// With `force` the fetch always runs, regardless of slot state; it still
    /// queues behind any in-flight refresh of the same slot.
    pub async fn get_with<F, Fut>(&self, force: bool, fetch: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send,
    {
        if !force && let Some(value) = self.peek() {
            return Ok(value);
        }

        let _guard = self.refresh.lock().await;

        // Re-check after acquiring the lock: a concurrent caller may have
        // resolved the slot while we waited.
        if !force && let Some(value) = self.peek() {
            return Ok(value);
        }

        *self.state.write() = SlotState::Pending;
        debug!(slot = self.name, force, "refreshing cache slot");

        match fetch().await {
            Ok(value) => {
                let value = Arc::new(value);
                *self.state.write() = SlotState::Ready(value.clone());
                Ok(value)
            }
            Err(e) => {
                warn!(slot = self.name, error = %e, "cache slot fetch failed");
                *self.state.write() = SlotState::Failed(e.to_string());
                Err(e)
            }
        }
    }
}
