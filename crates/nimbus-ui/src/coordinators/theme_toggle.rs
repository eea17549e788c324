use std::sync::Arc;

use nimbus_weather::ThemeMode;

use crate::state::{BroadcastEvent, StateKey};
use crate::store::StateStore;
use crate::surface::WindowSurface;

/// Dark mode switch
pub struct ThemeToggleCoordinator {
    store: Arc<StateStore>,
    surface: Arc<dyn WindowSurface>,
}

impl ThemeToggleCoordinator {
    pub fn new(store: Arc<StateStore>, surface: Arc<dyn WindowSurface>) -> Self {
        Self { store, surface }
    }

    /// Render the window in the stored mode, e.g. the one saved last run
    pub fn restore(&self) -> ThemeMode {
        let mode = self.store.theme_mode();
        self.surface.apply_theme(mode);
        mode
    }

    /// Store the mode, retheme the window, then tell every view on `theme_event`
    pub fn handle_toggle(&self, is_dark: bool) -> ThemeMode {
        let mode = ThemeMode::from_dark(is_dark);
        self.store.update([
            (StateKey::UsingTheme, is_dark.into()),
            (StateKey::ThemeMode, mode.into()),
        ]);
        self.surface.apply_theme(mode);

        let notified = self.store.broadcast(BroadcastEvent::Theme, mode);
        tracing::debug!("Theme {} sent to {} view(s)", mode, notified);
        mode
    }
}
