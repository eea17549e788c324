//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use nimbus_core::{Config, Settings};
use nimbus_ui::{AppServices, SampleReceiver, ServiceParts, WindowSurface};
use nimbus_weather::{
    Condition, Coordinates, CurrentConditions, FetchFuture, LocationError, LocationFuture,
    LocationProvider, ThemeMode, Units, WeatherError, WeatherFetcher, WeatherQuery, WeatherReport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Grant,
    Deny,
    /// The permission dialog never answers
    Pending,
}

pub struct ScriptedProvider {
    permission: Mutex<Permission>,
    position: Mutex<Coordinates>,
    hang_reads: AtomicBool,
    pub permission_requests: AtomicUsize,
    pub reads: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(permission: Permission, position: Coordinates) -> Arc<Self> {
        Arc::new(Self {
            permission: Mutex::new(permission),
            position: Mutex::new(position),
            hang_reads: AtomicBool::new(false),
            permission_requests: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        })
    }

    pub fn granting(position: Coordinates) -> Arc<Self> {
        Self::new(Permission::Grant, position)
    }

    pub fn move_to(&self, position: Coordinates) {
        *self.position.lock() = position;
    }

    pub fn set_permission(&self, permission: Permission) {
        *self.permission.lock() = permission;
    }

    /// Make every later read wait forever
    pub fn hang_reads(&self) {
        self.hang_reads.store(true, Ordering::SeqCst);
    }

    pub fn permission_requests(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }
}

impl LocationProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn request_permission(&self) -> LocationFuture<'_, ()> {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        let permission = *self.permission.lock();
        Box::pin(async move {
            match permission {
                Permission::Grant => Ok(()),
                Permission::Deny => Err(LocationError::PermissionDenied),
                Permission::Pending => std::future::pending().await,
            }
        })
    }

    fn read_position(&self) -> LocationFuture<'_, Coordinates> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let position = *self.position.lock();
        let hang = self.hang_reads.load(Ordering::SeqCst);
        Box::pin(async move {
            if hang {
                std::future::pending::<()>().await;
            }
            Ok(position)
        })
    }
}

pub fn report_for(query: &WeatherQuery, language: &str, units: Units) -> WeatherReport {
    let coordinates = match query {
        WeatherQuery::Position(coordinates) => *coordinates,
        WeatherQuery::City(_) => Coordinates::new(51.51, -0.13),
    };
    WeatherReport {
        place: query.to_string(),
        coordinates,
        units,
        language: language.to_string(),
        current: CurrentConditions {
            temperature: 18.5,
            feels_like: 17.9,
            humidity: 60,
            wind_speed: 3.2,
            condition: Condition::PartlyCloudy,
            observed_at: None,
        },
        daily: Vec::new(),
        air_quality: None,
        fetched_at: chrono::Utc::now(),
    }
}

/// Records every query; fails while `failing` is set
#[derive(Default)]
pub struct ScriptedFetcher {
    pub queries: Mutex<Vec<(WeatherQuery, String, Units)>>,
    failing: AtomicBool,
}

impl ScriptedFetcher {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn last_query(&self) -> Option<WeatherQuery> {
        self.queries.lock().last().map(|(query, _, _)| query.clone())
    }

    pub fn count(&self) -> usize {
        self.queries.lock().len()
    }
}

impl WeatherFetcher for ScriptedFetcher {
    fn fetch<'a>(&'a self, query: &'a WeatherQuery, language: &'a str, units: Units) -> FetchFuture<'a> {
        self.queries
            .lock()
            .push((query.clone(), language.to_string(), units));
        let failing = self.failing.load(Ordering::SeqCst);
        Box::pin(async move {
            if failing {
                return Err(WeatherError::CityNotFound(query.to_string()));
            }
            Ok(report_for(query, language, units))
        })
    }
}

#[derive(Default)]
pub struct RecordingSurface {
    pub themes: Mutex<Vec<ThemeMode>>,
    pub toggles: Mutex<Vec<bool>>,
}

impl WindowSurface for RecordingSurface {
    fn apply_theme(&self, mode: ThemeMode) {
        self.themes.lock().push(mode);
    }

    fn sync_location_toggle(&self, enabled: bool) {
        self.toggles.lock().push(enabled);
    }
}

pub struct Harness {
    pub services: Arc<AppServices>,
    pub samples: Option<SampleReceiver>,
    pub provider: Arc<ScriptedProvider>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub surface: Arc<RecordingSurface>,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.location.poll_interval_secs = 1;
    config.location.stop_timeout_ms = 1000;
    config.location.startup_timeout_secs = 1;
    config.location.permission_timeout_secs = 30;
    config
}

pub fn harness(provider: Arc<ScriptedProvider>, settings: Settings) -> Harness {
    harness_with(provider, settings, test_config())
}

pub fn harness_with(provider: Arc<ScriptedProvider>, settings: Settings, config: Config) -> Harness {
    let fetcher = Arc::new(ScriptedFetcher::default());
    let surface = Arc::new(RecordingSurface::default());

    let parts = ServiceParts {
        config: Arc::new(config),
        settings,
        settings_path: None,
        provider: provider.clone(),
        fetcher: fetcher.clone(),
        surface: surface.clone(),
    };
    let (services, samples) = AppServices::build(parts, Handle::current());

    Harness {
        services,
        samples: Some(samples),
        provider,
        fetcher,
        surface,
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

pub const HELSINKI: Coordinates = Coordinates {
    latitude: 60.17,
    longitude: 24.94,
};

pub const OSLO: Coordinates = Coordinates {
    latitude: 59.91,
    longitude: 10.75,
};
