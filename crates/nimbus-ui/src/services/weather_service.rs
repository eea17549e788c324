//! Weather refresh worker.
//!
//! Observers of the fields a report depends on request a refresh; requests
//! that arrive while a fetch is running collapse into one follow-up fetch.
//! Results are published on a watch channel for views to render.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;

use nimbus_core::AppError;
use nimbus_weather::{WeatherFetcher, WeatherQuery, WeatherReport};

use crate::observer::ObserverHandle;
use crate::state::StateKey;
use crate::store::StateStore;

/// Fields whose change makes the shown report outdated
const REFRESH_KEYS: [StateKey; 5] = [
    StateKey::City,
    StateKey::Language,
    StateKey::Unit,
    StateKey::CurrentLat,
    StateKey::CurrentLon,
];

/// What the weather views render
#[derive(Debug, Clone, Default)]
pub struct WeatherView {
    /// Last successful report; kept when a later fetch fails
    pub report: Option<Arc<WeatherReport>>,
    /// User-facing message for the most recent failed fetch, cleared on success
    pub last_error: Option<String>,
    pub loading: bool,
}

impl WeatherView {
    /// True when the shown report is older than a failed refresh
    pub fn is_stale(&self) -> bool {
        self.report.is_some() && self.last_error.is_some()
    }
}

/// Cloneable handle for asking the service to refetch
#[derive(Clone, Default)]
pub struct RefreshTrigger {
    notify: Arc<Notify>,
}

impl RefreshTrigger {
    pub fn request(&self) {
        self.notify.notify_one();
    }
}

pub struct WeatherService {
    trigger: RefreshTrigger,
    view: watch::Receiver<WeatherView>,
    observer: ObserverHandle,
    store: Arc<StateStore>,
}

impl WeatherService {
    /// Register the refresh observer and spawn the refresh loop.
    ///
    /// The loop ends when `cancel` fires.
    pub fn start(
        store: Arc<StateStore>,
        fetcher: Arc<dyn WeatherFetcher>,
        runtime: &Handle,
        cancel: CancellationToken,
    ) -> Self {
        let trigger = RefreshTrigger::default();
        let (view_tx, view) = watch::channel(WeatherView::default());

        let on_change = trigger.clone();
        let observer = ObserverHandle::from_fn("weather-refresh", move |_| {
            on_change.request();
            Ok(())
        });
        for key in REFRESH_KEYS {
            store.register_observer(key, &observer);
        }

        runtime.spawn(refresh_loop(
            store.clone(),
            fetcher,
            trigger.clone(),
            view_tx,
            cancel,
        ));

        Self {
            trigger,
            view,
            observer,
            store,
        }
    }

    pub fn trigger(&self) -> RefreshTrigger {
        self.trigger.clone()
    }

    pub fn request_refresh(&self) {
        self.trigger.request();
    }

    pub fn subscribe(&self) -> watch::Receiver<WeatherView> {
        self.view.clone()
    }

    /// Stop reacting to state changes
    pub fn detach(&self) {
        self.observer.retire();
        for key in REFRESH_KEYS {
            self.store.unregister_observer(key, &self.observer);
        }
    }
}

/// Query for the current state: live position when location mode has a fix,
/// the selected city otherwise
pub fn query_for(store: &StateStore) -> WeatherQuery {
    let snapshot = store.snapshot();
    match snapshot.coordinates() {
        Some(coordinates) if snapshot.using_location() => WeatherQuery::Position(coordinates),
        _ => WeatherQuery::City(snapshot.city().to_string()),
    }
}

async fn refresh_loop(
    store: Arc<StateStore>,
    fetcher: Arc<dyn WeatherFetcher>,
    trigger: RefreshTrigger,
    view: watch::Sender<WeatherView>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = trigger.notify.notified() => {}
        }

        let query = query_for(&store);
        let language = store.language();
        let unit = store.unit();
        view.send_modify(|v| v.loading = true);
        tracing::debug!("Fetching weather for {} ({}, {})", query, language, unit);

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = fetcher.fetch(&query, &language, unit) => result,
        };

        match result {
            Ok(report) => {
                tracing::info!("Weather updated for {}", report.place);
                view.send_modify(|v| {
                    v.report = Some(Arc::new(report));
                    v.last_error = None;
                    v.loading = false;
                });
            }
            Err(e) => {
                tracing::warn!("Weather fetch for {} failed: {}", query, e);
                let message = AppError::from(e).user_message();
                view.send_modify(|v| {
                    v.last_error = Some(message.to_string());
                    v.loading = false;
                });
            }
        }
    }
    tracing::debug!("Weather refresh loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ApplicationState;
    use nimbus_weather::{Coordinates, Units};

    #[tokio::test]
    async fn test_query_prefers_position_in_location_mode() {
        let store = StateStore::new(ApplicationState::default(), Handle::current());
        assert_eq!(query_for(&store), WeatherQuery::City(store.city()));

        store.update([
            (StateKey::CurrentLat, Some(52.52).into()),
            (StateKey::CurrentLon, Some(13.4).into()),
        ]);
        assert_eq!(query_for(&store), WeatherQuery::City(store.city()));

        store.set(StateKey::UsingLocation, true);
        assert_eq!(
            query_for(&store),
            WeatherQuery::Position(Coordinates::new(52.52, 13.4))
        );

        store.set(StateKey::Unit, Units::Imperial);
        store.set(StateKey::UsingLocation, false);
        assert!(matches!(query_for(&store), WeatherQuery::City(_)));
    }

    #[test]
    fn test_view_staleness() {
        let mut view = WeatherView::default();
        assert!(!view.is_stale());
        view.last_error = Some("offline".to_string());
        assert!(!view.is_stale());
    }
}
