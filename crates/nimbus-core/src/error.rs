//! Centralized error types for the Nimbus application.
//!
//! Every failure the core can observe maps to one of these variants, and
//! `user_message()` gives the text shown in the UI.

use thiserror::Error;

use nimbus_weather::{LocationError, WeatherError};

/// Top-level application error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Location error: {0}")]
    Location(#[from] LocationError),

    #[error("Weather service error: {0}")]
    Weather(#[from] WeatherError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a user-friendly message suitable for display in the UI.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Location(e) => location_message(e),
            AppError::Weather(e) => weather_message(e),
            AppError::State(_) => "Something went wrong. Please try again.",
            AppError::Config(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

fn location_message(e: &LocationError) -> &'static str {
    match e {
        LocationError::PermissionDenied => {
            "Location permission was denied. Search for a city instead."
        }
        LocationError::ProviderUnavailable(_) => "Location is not available on this device.",
        LocationError::Timeout => "Finding your location took too long. Please try again.",
        LocationError::Busy(_) => "Location is already being requested.",
        LocationError::Other(_) => "Your location could not be determined.",
    }
}

fn weather_message(e: &WeatherError) -> &'static str {
    match e {
        WeatherError::Network(_) => "Unable to reach the weather service. Check your connection.",
        WeatherError::Location(err) => location_message(err),
        WeatherError::CityNotFound(_) => "City not found. Check the spelling and try again.",
        WeatherError::Status(status) if *status >= 500 => {
            "The weather service is having trouble. Please try again later."
        }
        WeatherError::Status(_) => "The weather request failed. Please try again.",
        WeatherError::Parse(_) => "Received unexpected weather data.",
    }
}

/// Errors raised around the shared state store.
///
/// None of these escape to the writer of a value: unknown keys are ignored
/// and observer failures are logged per observer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("Unknown state key: {0}")]
    UnknownKey(String),

    #[error("Value for '{key}' must be {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("Observer '{observer}' failed on '{topic}': {message}")]
    ObserverFailure {
        observer: String,
        topic: String,
        message: String,
    },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
        }
    }
}
