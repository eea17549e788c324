//! The single source of truth for shared application state.
//!
//! Writes are linearized by one lock. Notifications are queued while that
//! lock is still held, so observers of a key see values in write order and
//! always find the new value already stored.

use parking_lot::RwLock;
use tokio::runtime::Handle;

use nimbus_weather::{Coordinates, ThemeMode, Units};

use crate::dispatcher::NotificationDispatcher;
use crate::observer::ObserverHandle;
use crate::state::{ApplicationState, StateKey, StateValue, Topic};

pub struct StateStore {
    state: RwLock<ApplicationState>,
    dispatcher: NotificationDispatcher,
}

impl StateStore {
    /// Create a store; notification tasks are spawned on `runtime`
    pub fn new(initial: ApplicationState, runtime: Handle) -> Self {
        Self {
            state: RwLock::new(initial),
            dispatcher: NotificationDispatcher::new(runtime),
        }
    }

    // =========== Reads ===========

    pub fn get(&self, key: StateKey) -> StateValue {
        self.state.read().get(key)
    }

    /// Look a value up by key name; `None` for names that aren't state keys
    pub fn get_by_name(&self, name: &str) -> Option<StateValue> {
        name.parse::<StateKey>().ok().map(|key| self.get(key))
    }

    pub fn snapshot(&self) -> ApplicationState {
        self.state.read().clone()
    }

    pub fn city(&self) -> String {
        self.state.read().city().to_string()
    }

    pub fn language(&self) -> String {
        self.state.read().language().to_string()
    }

    pub fn unit(&self) -> Units {
        self.state.read().unit()
    }

    pub fn using_location(&self) -> bool {
        self.state.read().using_location()
    }

    pub fn theme_mode(&self) -> ThemeMode {
        self.state.read().theme_mode()
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.state.read().coordinates()
    }

    // =========== Writes ===========

    /// Store `value` under `key` and notify its observers.
    ///
    /// Writing the current value is a no-op. Returns whether the value changed.
    pub fn set(&self, key: StateKey, value: impl Into<StateValue>) -> bool {
        let value = value.into();
        let mut state = self.state.write();

        match state.apply(key, value.clone()) {
            Ok(true) => {
                tracing::debug!("State {} changed to {:?}", key, value);
                self.dispatcher.dispatch(Topic::Field(key), &value);
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::warn!("Ignoring write: {}", e);
                false
            }
        }
    }

    /// Like [`StateStore::set`], silently ignoring unknown key names
    pub fn set_by_name(&self, name: &str, value: impl Into<StateValue>) -> bool {
        match name.parse::<StateKey>() {
            Ok(key) => self.set(key, value),
            Err(e) => {
                tracing::debug!("Ignoring write: {}", e);
                false
            }
        }
    }

    /// Apply several writes at once.
    ///
    /// All values are stored before any notification is queued. Each key
    /// whose final value differs from its value before the call is notified
    /// once, in the order keys first appear in `changes`. Returns those keys.
    pub fn update<I>(&self, changes: I) -> Vec<StateKey>
    where
        I: IntoIterator<Item = (StateKey, StateValue)>,
    {
        let mut state = self.state.write();
        let mut touched: Vec<(StateKey, StateValue)> = Vec::new();

        for (key, value) in changes {
            let previous = state.get(key);
            match state.apply(key, value) {
                Ok(_) => {
                    if !touched.iter().any(|(k, _)| *k == key) {
                        touched.push((key, previous));
                    }
                }
                Err(e) => tracing::warn!("Ignoring write: {}", e),
            }
        }

        let mut changed = Vec::with_capacity(touched.len());
        for (key, previous) in touched {
            let current = state.get(key);
            if current != previous {
                self.dispatcher.dispatch(Topic::Field(key), &current);
                changed.push(key);
            }
        }

        if !changed.is_empty() {
            tracing::debug!("State update changed {:?}", changed);
        }
        changed
    }

    /// Like [`StateStore::update`], silently skipping unknown key names
    pub fn update_by_name<'a, I>(&self, changes: I) -> Vec<StateKey>
    where
        I: IntoIterator<Item = (&'a str, StateValue)>,
    {
        let known: Vec<(StateKey, StateValue)> = changes
            .into_iter()
            .filter_map(|(name, value)| name.parse::<StateKey>().ok().map(|key| (key, value)))
            .collect();
        self.update(known)
    }

    /// Notify observers of `topic` without storing anything
    pub fn broadcast(&self, topic: impl Into<Topic>, value: impl Into<StateValue>) -> usize {
        let topic = topic.into();
        let value = value.into();
        // Same lock as writes so a broadcast is ordered against them
        let _order = self.state.read();
        let delivered = self.dispatcher.dispatch(topic, &value);
        tracing::debug!("Broadcast {} to {} observer(s)", topic, delivered);
        delivered
    }

    // =========== Observers ===========

    pub fn register_observer(&self, topic: impl Into<Topic>, observer: &ObserverHandle) -> bool {
        self.dispatcher.register(topic.into(), observer.clone())
    }

    /// Register by topic name; unknown names are ignored
    pub fn register_observer_by_name(&self, name: &str, observer: &ObserverHandle) -> bool {
        match name.parse::<Topic>() {
            Ok(topic) => self.register_observer(topic, observer),
            Err(e) => {
                tracing::debug!("Ignoring registration: {}", e);
                false
            }
        }
    }

    pub fn unregister_observer(&self, topic: impl Into<Topic>, observer: &ObserverHandle) -> bool {
        self.dispatcher.unregister(topic.into(), observer)
    }

    pub fn unregister_observer_by_name(&self, name: &str, observer: &ObserverHandle) -> bool {
        name.parse::<Topic>()
            .map(|topic| self.unregister_observer(topic, observer))
            .unwrap_or(false)
    }

    pub fn observer_count(&self, topic: impl Into<Topic>) -> usize {
        self.dispatcher.observer_count(topic.into())
    }

    /// Drop every observer registration
    pub fn clear_observers(&self) {
        self.dispatcher.clear();
    }
}
