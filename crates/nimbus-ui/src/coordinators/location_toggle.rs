//! Location toggle: turns the switch into state, tracking and refreshes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use nimbus_weather::{Coordinates, LocationError};

use crate::services::RefreshTrigger;
use crate::state::StateKey;
use crate::store::StateStore;
use crate::surface::WindowSurface;
use crate::tracker::{ChangeCallback, LocationTracker};

/// Result of [`LocationToggleCoordinator::initialize_tracking`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupOutcome {
    /// Location mode was off in the saved settings
    Skipped,
    Tracking,
    /// Tracking failed and location mode was switched off
    Failed,
    /// Startup gave up waiting; location mode was switched off
    TimedOut,
}

/// Permission flow and first fix of a new tracking session
pub type PendingStart = Pin<Box<dyn Future<Output = Result<Coordinates, LocationError>> + Send>>;

/// What is left to do after [`LocationToggleCoordinator::begin_enable`]
pub enum EnableStep {
    /// Location mode is on and the running session feeds it
    Ready,
    /// A session has to start; pass its result to `finish_enable`
    Start(PendingStart),
}

pub struct LocationToggleCoordinator {
    store: Arc<StateStore>,
    tracker: Arc<LocationTracker>,
    surface: Arc<dyn WindowSurface>,
    refresh: RefreshTrigger,
    startup_timeout: Duration,
}

impl LocationToggleCoordinator {
    pub fn new(
        store: Arc<StateStore>,
        tracker: Arc<LocationTracker>,
        surface: Arc<dyn WindowSurface>,
        refresh: RefreshTrigger,
        startup_timeout: Duration,
    ) -> Self {
        Self {
            store,
            tracker,
            surface,
            refresh,
            startup_timeout,
        }
    }

    /// Handle the location switch. Returns whether location mode ended up on.
    ///
    /// Waits for the whole permission flow. The UI loop uses
    /// [`begin_enable`](Self::begin_enable) instead so it keeps running meanwhile.
    pub async fn handle_toggle(&self, enabled: bool) -> bool {
        if enabled {
            self.enable().await
        } else {
            self.disable();
            false
        }
    }

    /// Resume location mode saved from the previous run, bounded by the
    /// startup timeout.
    pub async fn initialize_tracking(&self) -> StartupOutcome {
        if !self.store.using_location() {
            return StartupOutcome::Skipped;
        }

        match tokio::time::timeout(self.startup_timeout, self.enable()).await {
            Ok(true) => StartupOutcome::Tracking,
            Ok(false) => StartupOutcome::Failed,
            Err(_) => {
                tracing::warn!(
                    "Location startup did not finish within {:?}, continuing without live location",
                    self.startup_timeout
                );
                self.revert();
                StartupOutcome::TimedOut
            }
        }
    }

    /// Switch location mode on without waiting on the provider.
    ///
    /// A running session is reused as is. Otherwise any fix kept from an
    /// earlier session is shown right away and a new session is returned to
    /// be awaited. A stopped tracker produces no samples, so that session is
    /// started even when a fix is cached. Dropping the pending start puts
    /// the tracker back to Idle.
    pub fn begin_enable(&self) -> EnableStep {
        self.store.set(StateKey::UsingLocation, true);

        if self.tracker.is_tracking() {
            // Worker kept sampling while the switch was off
            if let Some(coordinates) = self.tracker.current_coordinates() {
                apply_coordinates(&self.store, coordinates);
            }
            self.tracker.set_change_callback(Some(self.change_callback()));
            self.refresh.request();
            tracing::debug!("Location mode resumed from the running session");
            return EnableStep::Ready;
        }

        if let Some(coordinates) = self.tracker.current_coordinates() {
            apply_coordinates(&self.store, coordinates);
            self.refresh.request();
        }

        let tracker = self.tracker.clone();
        let on_change = self.change_callback();
        EnableStep::Start(Box::pin(async move {
            tracker.start_tracking(Some(on_change)).await
        }))
    }

    /// Apply the outcome of a session started by `begin_enable`. Returns
    /// whether location mode stayed on.
    pub fn finish_enable(&self, result: Result<Coordinates, LocationError>) -> bool {
        match result {
            Ok(coordinates) => {
                apply_coordinates(&self.store, coordinates);
                self.refresh.request();
                true
            }
            Err(e) => {
                tracing::warn!("Could not enable location: {}", e);
                self.revert();
                false
            }
        }
    }

    async fn enable(&self) -> bool {
        match self.begin_enable() {
            EnableStep::Ready => true,
            EnableStep::Start(start) => self.finish_enable(start.await),
        }
    }

    /// The worker keeps running so switching back on needs no new permission
    fn disable(&self) {
        self.store.set(StateKey::UsingLocation, false);
        self.tracker.set_change_callback(None);
        tracing::debug!("Location mode off");
    }

    fn revert(&self) {
        self.store.set(StateKey::UsingLocation, false);
        self.surface.sync_location_toggle(false);
    }

    fn change_callback(&self) -> ChangeCallback {
        let store = Arc::downgrade(&self.store);
        Arc::new(move |coordinates| {
            if let Some(store) = store.upgrade() {
                apply_coordinates(&store, coordinates);
            }
        })
    }
}

fn apply_coordinates(store: &StateStore, coordinates: Coordinates) -> Vec<StateKey> {
    if !coordinates.is_valid() {
        tracing::warn!("Ignoring invalid location fix {}", coordinates);
        return Vec::new();
    }
    store.update([
        (StateKey::CurrentLat, Some(coordinates.latitude).into()),
        (StateKey::CurrentLon, Some(coordinates.longitude).into()),
    ])
}
