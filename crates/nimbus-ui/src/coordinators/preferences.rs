//! Language, unit and city selection.

use std::sync::Arc;

use nimbus_weather::Units;

use crate::coordinators::LocationToggleCoordinator;
use crate::services::RefreshTrigger;
use crate::state::{BroadcastEvent, StateKey};
use crate::store::StateStore;
use crate::surface::WindowSurface;

pub struct PreferenceCoordinator {
    store: Arc<StateStore>,
    location: Arc<LocationToggleCoordinator>,
    surface: Arc<dyn WindowSurface>,
    refresh: RefreshTrigger,
}

impl PreferenceCoordinator {
    pub fn new(
        store: Arc<StateStore>,
        location: Arc<LocationToggleCoordinator>,
        surface: Arc<dyn WindowSurface>,
        refresh: RefreshTrigger,
    ) -> Self {
        Self {
            store,
            location,
            surface,
            refresh,
        }
    }

    /// Returns whether the language changed; views hear about it on `language_event`
    pub fn language_changed(&self, language: &str) -> bool {
        let language = language.trim();
        if language.is_empty() {
            return false;
        }
        let changed = self.store.set(StateKey::Language, language);
        if changed {
            self.store.broadcast(BroadcastEvent::Language, language);
        }
        changed
    }

    pub fn unit_changed(&self, unit: Units) -> bool {
        self.store.set(StateKey::Unit, unit)
    }

    /// Show weather for `city`, leaving location mode if it was on
    pub async fn city_searched(&self, city: &str) -> bool {
        let city = city.trim();
        if city.is_empty() {
            return false;
        }

        let left_location_mode = self.store.using_location();
        if left_location_mode {
            self.location.handle_toggle(false).await;
            self.surface.sync_location_toggle(false);
        }

        let changed = self.store.set(StateKey::City, city);
        if !changed && left_location_mode {
            self.refresh.request();
        }
        tracing::info!("City set to {}", city);
        changed
    }
}
