//! Observer handles.
//!
//! Every observer is an async callback behind a cloneable handle. Synchronous
//! callbacks are wrapped so the dispatcher treats all of them the same way.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::state::StateValue;

/// Completion signal returned by an observer callback
pub type ObserverFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

type Callback = dyn Fn(StateValue) -> ObserverFuture + Send + Sync;

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ObserverId(u64);

struct ObserverInner {
    id: ObserverId,
    name: String,
    alive: AtomicBool,
    callback: Box<Callback>,
}

/// Cloneable reference to a registered callback.
///
/// Clones share identity, so registering a clone under a key that already
/// holds the original is a duplicate.
#[derive(Clone)]
pub struct ObserverHandle {
    inner: Arc<ObserverInner>,
}

impl ObserverHandle {
    /// Wrap an async callback
    pub fn new<F, Fut>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(StateValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let callback: Box<Callback> =
            Box::new(move |value| -> ObserverFuture { Box::pin(callback(value)) });
        Self::from_boxed(name.into(), callback)
    }

    /// Wrap a synchronous callback
    pub fn from_fn<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(StateValue) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let callback: Box<Callback> = Box::new(move |value| -> ObserverFuture {
            Box::pin(std::future::ready(callback(value)))
        });
        Self::from_boxed(name.into(), callback)
    }

    fn from_boxed(name: String, callback: Box<Callback>) -> Self {
        let id = ObserverId(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            inner: Arc::new(ObserverInner {
                id,
                name,
                alive: AtomicBool::new(true),
                callback,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// False once the owning component has been torn down
    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::Acquire)
    }

    /// Mark the owning component as gone; pending deliveries are skipped
    pub fn retire(&self) {
        self.inner.alive.store(false, Ordering::Release);
    }

    pub(crate) fn invoke(&self, value: StateValue) -> ObserverFuture {
        (self.inner.callback)(value)
    }
}

impl PartialEq for ObserverHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ObserverHandle {}

impl fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverHandle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_shared_by_clones() {
        let a = ObserverHandle::from_fn("a", |_| Ok(()));
        let b = ObserverHandle::from_fn("a", |_| Ok(()));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_retire_is_visible_through_clones() {
        let handle = ObserverHandle::from_fn("card", |_| Ok(()));
        let clone = handle.clone();
        assert!(clone.is_alive());
        handle.retire();
        assert!(!clone.is_alive());
    }

    #[tokio::test]
    async fn test_invoke_sync_and_async() {
        let sync = ObserverHandle::from_fn("sync", |value| {
            anyhow::ensure!(value == StateValue::Flag(true), "unexpected value");
            Ok(())
        });
        assert!(sync.invoke(true.into()).await.is_ok());
        assert!(sync.invoke(false.into()).await.is_err());

        let asynchronous = ObserverHandle::new("async", |value| async move {
            tokio::task::yield_now().await;
            anyhow::ensure!(value.as_text() == Some("Paris"), "unexpected value");
            Ok(())
        });
        assert!(asynchronous.invoke("Paris".into()).await.is_ok());
    }
}
