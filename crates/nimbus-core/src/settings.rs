//! User settings persisted between runs.
//!
//! Read once at startup and rewritten whenever one of the tracked values
//! changes. A missing or corrupted file falls back to the built-in defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use nimbus_weather::{ThemeMode, Units};

pub const DEFAULT_CITY: &str = "London";
pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub theme_mode: ThemeMode,
    pub language: String,
    pub unit: Units,
    pub last_city: String,
    pub using_location: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme_mode: ThemeMode::Light,
            language: DEFAULT_LANGUAGE.to_string(),
            unit: Units::Metric,
            last_city: DEFAULT_CITY.to_string(),
            using_location: false,
        }
    }
}

impl Settings {
    /// Load settings from `path`, using defaults when the file is missing or unreadable
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                tracing::debug!("No settings file at {:?}, using defaults", path);
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable settings file {:?}: {:#}", path, e);
                Self::default()
            }
        }
    }

    /// Load settings from `path`; `Ok(None)` when the file doesn't exist
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(path).context("Failed to read settings file")?;
        let settings: Settings =
            toml::from_str(&contents).context("Failed to parse settings file")?;

        Ok(Some(settings.sanitized()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create settings directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, contents).context("Failed to write settings file")?;

        tracing::debug!("Settings saved to {:?}", path);
        Ok(())
    }

    /// Replace blank strings with defaults
    fn sanitized(mut self) -> Self {
        if self.language.trim().is_empty() {
            self.language = DEFAULT_LANGUAGE.to_string();
        }
        if self.last_city.trim().is_empty() {
            self.last_city = DEFAULT_CITY.to_string();
        }
        self
    }
}
