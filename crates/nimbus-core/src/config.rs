use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use nimbus_weather::location::DEFAULT_IP_LOOKUP_URL;
use nimbus_weather::provider::{DEFAULT_AIR_QUALITY_URL, DEFAULT_FORECAST_URL};
use nimbus_weather::geocode::DEFAULT_GEOCODING_URL;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding config.toml and settings.toml
    pub config_dir: PathBuf,

    /// Live location settings
    #[serde(default)]
    pub location: LocationConfig,

    /// Weather service endpoints
    #[serde(default)]
    pub weather: WeatherConfig,
}

/// Which location provider backs the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ip,
    Fixed,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    /// Seconds between two samples of the background worker
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upper bound for waiting on the worker when tracking stops
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// Overall bound for bringing up tracking at startup
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// Bound for a single permission request or one-shot fix
    #[serde(default = "default_permission_timeout_secs")]
    pub permission_timeout_secs: u64,

    /// Coordinates reported by the fixed provider
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    #[serde(default = "default_ip_lookup_url")]
    pub ip_lookup_url: String,
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_stop_timeout_ms() -> u64 {
    1000
}

fn default_startup_timeout_secs() -> u64 {
    10
}

fn default_permission_timeout_secs() -> u64 {
    30
}

fn default_ip_lookup_url() -> String {
    DEFAULT_IP_LOOKUP_URL.to_string()
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            poll_interval_secs: default_poll_interval_secs(),
            stop_timeout_ms: default_stop_timeout_ms(),
            startup_timeout_secs: default_startup_timeout_secs(),
            permission_timeout_secs: default_permission_timeout_secs(),
            latitude: None,
            longitude: None,
            ip_lookup_url: default_ip_lookup_url(),
        }
    }
}

impl LocationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn permission_timeout(&self) -> Duration {
        Duration::from_secs(self.permission_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,

    #[serde(default = "default_air_quality_url")]
    pub air_quality_url: String,

    #[serde(default = "default_geocoding_url")]
    pub geocoding_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_forecast_url() -> String {
    DEFAULT_FORECAST_URL.to_string()
}

fn default_air_quality_url() -> String {
    DEFAULT_AIR_QUALITY_URL.to_string()
}

fn default_geocoding_url() -> String {
    DEFAULT_GEOCODING_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            forecast_url: default_forecast_url(),
            air_quality_url: default_air_quality_url(),
            geocoding_url: default_geocoding_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl WeatherConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            location: LocationConfig::default(),
            weather: WeatherConfig::default(),
        }
    }
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nimbus")
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&default_config_dir().join("config.toml"))
    }

    /// Load configuration from `path`, writing defaults there if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let mut config = Self::default();
            if let Some(parent) = path.parent() {
                config.config_dir = parent.to_path_buf();
            }
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it.
    ///
    /// Returns an error if validation finds errors; warnings are logged.
    pub fn load_validated(path: &Path) -> Result<(Self, ValidationResult)> {
        let config = Self::load_from(path)?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        let location = &self.location;

        if location.poll_interval_secs == 0 {
            result.add_error("location.poll_interval_secs", "Poll interval must be greater than 0");
        }
        if location.stop_timeout_ms == 0 {
            result.add_error("location.stop_timeout_ms", "Stop timeout must be greater than 0");
        } else if location.poll_interval_secs > 0
            && location.stop_timeout_ms * 2 >= location.poll_interval_secs * 1000 * 3
        {
            result.add_warning(
                "location.stop_timeout_ms",
                "Stop timeout is at least 1.5x the poll interval",
            );
        }
        if location.startup_timeout_secs == 0 {
            result.add_error("location.startup_timeout_secs", "Startup timeout must be greater than 0");
        }
        if location.permission_timeout_secs == 0 {
            result.add_error(
                "location.permission_timeout_secs",
                "Permission timeout must be greater than 0",
            );
        }

        match location.provider {
            ProviderKind::Fixed => match (location.latitude, location.longitude) {
                (Some(lat), Some(lon)) => {
                    if !nimbus_weather::Coordinates::new(lat, lon).is_valid() {
                        result.add_error("location", "Fixed coordinates are out of range");
                    }
                }
                _ => result.add_error(
                    "location",
                    "Fixed provider requires latitude and longitude",
                ),
            },
            ProviderKind::Ip => {
                validate_url(&location.ip_lookup_url, "location.ip_lookup_url", &mut result)
            }
            ProviderKind::Disabled => {
                result.add_warning("location.provider", "Live location is disabled")
            }
        }

        validate_url(&self.weather.forecast_url, "weather.forecast_url", &mut result);
        validate_url(&self.weather.air_quality_url, "weather.air_quality_url", &mut result);
        validate_url(&self.weather.geocoding_url, "weather.geocoding_url", &mut result);
        if self.weather.request_timeout_secs == 0 {
            result.add_error("weather.request_timeout_secs", "Request timeout must be greater than 0");
        }

        result
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Path of the persisted user settings
    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join("settings.toml")
    }
}

fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
    match Url::parse(url_str) {
        Ok(url) => {
            if url.scheme() != "http" && url.scheme() != "https" {
                result.add_error(
                    field_name,
                    format!("URL must use http or https scheme, got: {}", url.scheme()),
                );
            }
            if url.host().is_none() {
                result.add_error(field_name, "URL must have a host");
            }
        }
        Err(e) => result.add_error(field_name, format!("Invalid URL: {}", e)),
    }
}
