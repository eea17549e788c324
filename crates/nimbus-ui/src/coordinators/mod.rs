pub mod location_toggle;
pub mod preferences;
pub mod theme_toggle;

pub use location_toggle::{EnableStep, LocationToggleCoordinator, PendingStart, StartupOutcome};
pub use preferences::PreferenceCoordinator;
pub use theme_toggle::ThemeToggleCoordinator;
