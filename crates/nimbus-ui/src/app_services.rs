//! Application services context.
//!
//! `AppServices` is built once at startup and handed to the UI loop. It owns
//! the state store, the location tracker, the coordinators and the
//! background services, and knows how to shut them all down.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use nimbus_core::{App, Config, LocationConfig, ProviderKind, Settings, WeatherConfig};
use nimbus_weather::{
    Coordinates, DisabledLocationProvider, Endpoints, FixedLocationProvider, IpLocationProvider,
    LocationProvider, OpenMeteoClient, WeatherFetcher,
};

use crate::coordinators::{
    LocationToggleCoordinator, PreferenceCoordinator, StartupOutcome, ThemeToggleCoordinator,
};
use crate::services::{SettingsPersister, WeatherService, WeatherView};
use crate::state::ApplicationState;
use crate::store::StateStore;
use crate::surface::{HeadlessSurface, WindowSurface};
use crate::tracker::{LocationTracker, SampleReceiver, TrackerConfig};

/// Everything needed to assemble [`AppServices`]
pub struct ServiceParts {
    pub config: Arc<Config>,
    pub settings: Settings,
    /// Where preference changes are saved; `None` disables saving
    pub settings_path: Option<PathBuf>,
    pub provider: Arc<dyn LocationProvider>,
    pub fetcher: Arc<dyn WeatherFetcher>,
    pub surface: Arc<dyn WindowSurface>,
}

pub struct AppServices {
    store: Arc<StateStore>,
    tracker: Arc<LocationTracker>,
    location: Arc<LocationToggleCoordinator>,
    theme: ThemeToggleCoordinator,
    preferences: PreferenceCoordinator,
    weather: WeatherService,
    persister: Option<SettingsPersister>,
    cancel: CancellationToken,
}

impl AppServices {
    /// Wire every component together. Background tasks are spawned on `runtime`.
    pub fn build(parts: ServiceParts, runtime: Handle) -> (Arc<Self>, SampleReceiver) {
        let ServiceParts {
            config,
            settings,
            settings_path,
            provider,
            fetcher,
            surface,
        } = parts;

        let cancel = CancellationToken::new();
        let store = Arc::new(StateStore::new(
            ApplicationState::from_settings(&settings),
            runtime.clone(),
        ));

        let (tracker, samples) = LocationTracker::new(
            provider,
            TrackerConfig::from(&config.location),
            runtime.clone(),
        );
        let tracker = Arc::new(tracker);

        let weather = WeatherService::start(store.clone(), fetcher, &runtime, cancel.child_token());

        let location = Arc::new(LocationToggleCoordinator::new(
            store.clone(),
            tracker.clone(),
            surface.clone(),
            weather.trigger(),
            config.location.startup_timeout(),
        ));
        let theme = ThemeToggleCoordinator::new(store.clone(), surface.clone());
        theme.restore();
        let preferences =
            PreferenceCoordinator::new(store.clone(), location.clone(), surface, weather.trigger());

        let persister = settings_path.map(|path| SettingsPersister::attach(&store, path));

        tracing::info!(
            "Services ready (location provider: {})",
            tracker.provider_name()
        );

        let services = Arc::new(Self {
            store,
            tracker,
            location,
            theme,
            preferences,
            weather,
            persister,
            cancel,
        });
        (services, samples)
    }

    /// Build from loaded config and settings with the configured providers
    /// and a headless surface
    pub fn from_app(app: &App, runtime: Handle) -> anyhow::Result<(Arc<Self>, SampleReceiver)> {
        let config = app.shared_config();
        let parts = ServiceParts {
            provider: provider_from_config(&config.location)?,
            fetcher: fetcher_from_config(&config.weather)?,
            settings: app.settings().clone(),
            settings_path: Some(app.settings_path().to_path_buf()),
            surface: Arc::new(HeadlessSurface),
            config,
        };
        Ok(Self::build(parts, runtime))
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<LocationTracker> {
        &self.tracker
    }

    pub fn location(&self) -> &LocationToggleCoordinator {
        &self.location
    }

    pub fn theme(&self) -> &ThemeToggleCoordinator {
        &self.theme
    }

    pub fn preferences(&self) -> &PreferenceCoordinator {
        &self.preferences
    }

    pub fn weather(&self) -> &WeatherService {
        &self.weather
    }

    pub fn subscribe_weather(&self) -> watch::Receiver<WeatherView> {
        self.weather.subscribe()
    }

    /// Resume saved location mode and load the first report
    pub async fn initialize_tracking(&self) -> StartupOutcome {
        let outcome = self.location.initialize_tracking().await;
        tracing::info!("Location startup: {:?}", outcome);
        self.weather.request_refresh();
        outcome
    }

    /// Stop tracking within its bound, detach observers and end background tasks
    pub async fn shutdown(&self) {
        tracing::info!("AppServices shutdown initiated");

        if let Err(e) = self.tracker.stop_tracking().await {
            tracing::warn!("Location tracking did not stop cleanly: {}", e);
        }
        if let Some(persister) = &self.persister {
            persister.detach();
        }
        self.weather.detach();
        self.cancel.cancel();
        self.store.clear_observers();

        tracing::info!("AppServices shutdown complete");
    }
}

pub fn provider_from_config(config: &LocationConfig) -> anyhow::Result<Arc<dyn LocationProvider>> {
    let provider: Arc<dyn LocationProvider> = match config.provider {
        ProviderKind::Ip => Arc::new(
            IpLocationProvider::new(config.ip_lookup_url.clone(), config.permission_timeout())
                .context("failed to create IP location provider")?,
        ),
        ProviderKind::Fixed => {
            let (Some(latitude), Some(longitude)) = (config.latitude, config.longitude) else {
                anyhow::bail!("fixed location provider needs latitude and longitude");
            };
            Arc::new(FixedLocationProvider::new(Coordinates::new(latitude, longitude)))
        }
        ProviderKind::Disabled => Arc::new(DisabledLocationProvider),
    };
    Ok(provider)
}

pub fn fetcher_from_config(config: &WeatherConfig) -> anyhow::Result<Arc<dyn WeatherFetcher>> {
    let endpoints = Endpoints {
        forecast_url: config.forecast_url.clone(),
        air_quality_url: config.air_quality_url.clone(),
        geocoding_url: config.geocoding_url.clone(),
    };
    let client = OpenMeteoClient::new(endpoints, config.request_timeout())
        .context("failed to create weather client")?;
    Ok(Arc::new(client))
}
