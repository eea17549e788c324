//! Nimbus UI core
//!
//! Observable application state, notification fan-out, live location
//! tracking and the coordinators that turn window events into state
//! changes. Rendering lives elsewhere; this crate talks to the window only
//! through [`WindowSurface`] and state notifications.

pub mod app_services;
pub mod coordinators;
pub mod dispatcher;
pub mod event_loop;
pub mod observer;
pub mod services;
pub mod state;
pub mod store;
pub mod surface;
pub mod tracker;

pub use app_services::{fetcher_from_config, provider_from_config, AppServices, ServiceParts};
pub use coordinators::{
    EnableStep, LocationToggleCoordinator, PendingStart, PreferenceCoordinator, StartupOutcome,
    ThemeToggleCoordinator,
};
pub use dispatcher::NotificationDispatcher;
pub use event_loop::{UiEvent, UiLoop};
pub use observer::{ObserverFuture, ObserverHandle};
pub use services::{RefreshTrigger, SettingsPersister, WeatherService, WeatherView};
pub use state::{ApplicationState, BroadcastEvent, StateKey, StateValue, Topic};
pub use store::StateStore;
pub use surface::{HeadlessSurface, WindowSurface};
pub use tracker::{
    ChangeCallback, LocationSample, LocationTracker, SampleReceiver, TrackerConfig, TrackingState,
};
