pub mod app;
pub mod config;
pub mod error;
pub mod settings;

pub use app::App;
pub use config::{Config, LocationConfig, ProviderKind, ValidationResult, WeatherConfig};
pub use error::{AppError, ConfigError, StateError};
pub use settings::Settings;

use anyhow::Result;

/// Initialize logging.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init() -> Result<()> {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Nimbus core initialized");
    }
    Ok(())
}
