//! Notification fan-out.
//!
//! Each registration owns an unbounded queue drained by its own task, so a
//! slow or failing observer never holds up the writer or another observer.
//! Values for one registration are delivered in the order they were queued.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use nimbus_core::StateError;

use crate::observer::ObserverHandle;
use crate::state::{StateValue, Topic};

struct Registration {
    observer: ObserverHandle,
    queue: mpsc::UnboundedSender<StateValue>,
}

/// Registry of observers keyed by topic
pub struct NotificationDispatcher {
    runtime: Handle,
    registry: Mutex<HashMap<Topic, Vec<Registration>>>,
}

impl NotificationDispatcher {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Register `observer` for `topic`. Returns false if it was already registered.
    pub fn register(&self, topic: Topic, observer: ObserverHandle) -> bool {
        let mut registry = self.registry.lock();
        let registrations = registry.entry(topic).or_default();

        if registrations.iter().any(|r| r.observer == observer) {
            tracing::debug!("Observer '{}' already registered for {}", observer.name(), topic);
            return false;
        }

        let (queue, rx) = mpsc::unbounded_channel();
        self.runtime
            .spawn(deliver_in_order(topic, observer.clone(), rx));

        tracing::debug!("Observer '{}' registered for {}", observer.name(), topic);
        registrations.push(Registration { observer, queue });
        true
    }

    /// Remove `observer` from `topic`. Returns false if it wasn't registered.
    ///
    /// Values already queued for it are still delivered (subject to liveness).
    pub fn unregister(&self, topic: Topic, observer: &ObserverHandle) -> bool {
        let mut registry = self.registry.lock();
        let Some(registrations) = registry.get_mut(&topic) else {
            return false;
        };

        let before = registrations.len();
        registrations.retain(|r| r.observer != *observer);
        let removed = registrations.len() != before;

        if registrations.is_empty() {
            registry.remove(&topic);
        }
        if removed {
            tracing::debug!("Observer '{}' unregistered from {}", observer.name(), topic);
        }
        removed
    }

    /// Queue `value` for every observer of `topic`. Never blocks.
    ///
    /// Returns the number of observers the value was queued for.
    pub fn dispatch(&self, topic: Topic, value: &StateValue) -> usize {
        let registry = self.registry.lock();
        let Some(registrations) = registry.get(&topic) else {
            return 0;
        };

        registrations
            .iter()
            .filter(|r| r.queue.send(value.clone()).is_ok())
            .count()
    }

    pub fn observer_count(&self, topic: Topic) -> usize {
        self.registry.lock().get(&topic).map_or(0, Vec::len)
    }

    /// Drop every registration; delivery tasks end once their queues drain
    pub fn clear(&self) {
        self.registry.lock().clear();
    }
}

async fn deliver_in_order(
    topic: Topic,
    observer: ObserverHandle,
    mut rx: mpsc::UnboundedReceiver<StateValue>,
) {
    while let Some(value) = rx.recv().await {
        if !observer.is_alive() {
            tracing::debug!("Skipping retired observer '{}' on {}", observer.name(), topic);
            continue;
        }

        // Run the callback as its own task so a panic is contained
        let target = observer.clone();
        let outcome = tokio::spawn(async move { target.invoke(value).await }).await;

        let failure = match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => format!("{:#}", e),
            Err(join) if join.is_panic() => "callback panicked".to_string(),
            Err(_) => "callback was cancelled".to_string(),
        };

        let error = StateError::ObserverFailure {
            observer: observer.name().to_string(),
            topic: topic.to_string(),
            message: failure,
        };
        tracing::warn!("{}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateKey;
    use std::time::Duration;

    fn recording(name: &str) -> (ObserverHandle, mpsc::UnboundedReceiver<StateValue>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ObserverHandle::from_fn(name, move |value| {
            tx.send(value)?;
            Ok(())
        });
        (handle, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<StateValue>) -> Option<StateValue> {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_dispatch_reaches_each_observer() {
        let dispatcher = NotificationDispatcher::new(Handle::current());
        let (a, mut rx_a) = recording("a");
        let (b, mut rx_b) = recording("b");
        let topic = Topic::from(StateKey::City);

        assert!(dispatcher.register(topic, a));
        assert!(dispatcher.register(topic, b));
        assert_eq!(dispatcher.dispatch(topic, &"Oslo".into()), 2);

        assert_eq!(next(&mut rx_a).await, Some("Oslo".into()));
        assert_eq!(next(&mut rx_b).await, Some("Oslo".into()));
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_ignored() {
        let dispatcher = NotificationDispatcher::new(Handle::current());
        let (a, mut rx) = recording("a");
        let topic = Topic::from(StateKey::Unit);

        assert!(dispatcher.register(topic, a.clone()));
        assert!(!dispatcher.register(topic, a));
        assert_eq!(dispatcher.observer_count(topic), 1);

        dispatcher.dispatch(topic, &true.into());
        assert_eq!(next(&mut rx).await, Some(true.into()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregister_unknown_is_noop() {
        let dispatcher = NotificationDispatcher::new(Handle::current());
        let (a, _rx) = recording("a");
        assert!(!dispatcher.unregister(Topic::from(StateKey::City), &a));
    }

    #[tokio::test]
    async fn test_failing_observer_does_not_affect_others() {
        let dispatcher = NotificationDispatcher::new(Handle::current());
        let topic = Topic::from(StateKey::Language);
        let failing = ObserverHandle::from_fn("failing", |_| anyhow::bail!("render failed"));
        let panicking = ObserverHandle::from_fn("panicking", |_| -> anyhow::Result<()> {
            panic!("widget destroyed")
        });
        let (healthy, mut rx) = recording("healthy");

        dispatcher.register(topic, failing);
        dispatcher.register(topic, panicking);
        dispatcher.register(topic, healthy);

        dispatcher.dispatch(topic, &"fr".into());
        dispatcher.dispatch(topic, &"de".into());

        assert_eq!(next(&mut rx).await, Some("fr".into()));
        assert_eq!(next(&mut rx).await, Some("de".into()));
    }

    #[tokio::test]
    async fn test_retired_observer_is_skipped() {
        let dispatcher = NotificationDispatcher::new(Handle::current());
        let topic = Topic::from(StateKey::City);
        let (a, mut rx) = recording("a");

        dispatcher.register(topic, a.clone());
        a.retire();
        dispatcher.dispatch(topic, &"Rome".into());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_delivery_preserves_write_order() {
        let dispatcher = NotificationDispatcher::new(Handle::current());
        let topic = Topic::from(StateKey::CurrentLat);
        let (a, mut rx) = recording("a");
        dispatcher.register(topic, a);

        for i in 0..20 {
            dispatcher.dispatch(topic, &Some(f64::from(i)).into());
        }
        for i in 0..20 {
            assert_eq!(next(&mut rx).await, Some(Some(f64::from(i)).into()));
        }
    }

    #[tokio::test]
    async fn test_dispatch_without_observers() {
        let dispatcher = NotificationDispatcher::new(Handle::current());
        assert_eq!(dispatcher.dispatch(Topic::from(StateKey::City), &"x".into()), 0);
    }
}
