//! The window the core writes back to.

use nimbus_weather::ThemeMode;

/// Calls from the core toward the rendered window.
///
/// These are the only writes the core makes toward widgets; everything else
/// reaches views through state notifications.
pub trait WindowSurface: Send + Sync {
    /// Switch the page's rendering theme
    fn apply_theme(&self, mode: ThemeMode);

    /// Force the location toggle to show `enabled`
    fn sync_location_toggle(&self, enabled: bool);
}

/// Surface for running without a window
#[derive(Debug, Default, Clone)]
pub struct HeadlessSurface;

impl WindowSurface for HeadlessSurface {
    fn apply_theme(&self, mode: ThemeMode) {
        tracing::info!("Theme set to {}", mode);
    }

    fn sync_location_toggle(&self, enabled: bool) {
        tracing::info!("Location toggle shows {}", if enabled { "on" } else { "off" });
    }
}
