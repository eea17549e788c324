use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{Config, Settings};

/// Startup configuration and persisted settings, loaded once per process
pub struct App {
    config: Arc<Config>,
    settings: Settings,
    settings_path: PathBuf,
}

impl App {
    /// Load config and settings from the default config directory
    pub fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config)
    }

    /// Load config and settings from `config_dir`
    pub fn with_config_dir(config_dir: &Path) -> Result<Self> {
        let config = Config::load_from(&config_dir.join("config.toml"))?;
        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self> {
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

        let settings_path = config.settings_path();
        let settings = Settings::load_or_default(&settings_path);

        tracing::info!(
            "Loaded settings from {:?} (city: {}, language: {}, unit: {})",
            settings_path,
            settings.last_city,
            settings.language,
            settings.unit
        );

        Ok(Self {
            config: Arc::new(config),
            settings,
            settings_path,
        })
    }

    /// Get reference to application config
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shared_config(&self) -> Arc<Config> {
        self.config.clone()
    }

    /// Settings as read at startup
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }
}
