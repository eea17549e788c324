pub mod settings_persister;
pub mod weather_service;

pub use settings_persister::SettingsPersister;
pub use weather_service::{query_for, RefreshTrigger, WeatherService, WeatherView};
