use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Measurement system used for fetched data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
    /// Kelvin and metres per second
    Standard,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Imperial => "imperial",
            Self::Standard => "standard",
        }
    }

    pub fn temperature_symbol(&self) -> &'static str {
        match self {
            Self::Metric => "°C",
            Self::Imperial => "°F",
            Self::Standard => "K",
        }
    }

    pub fn wind_speed_symbol(&self) -> &'static str {
        match self {
            Self::Metric => "km/h",
            Self::Imperial => "mph",
            Self::Standard => "m/s",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Units {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "metric" => Ok(Self::Metric),
            "imperial" => Ok(Self::Imperial),
            "standard" => Ok(Self::Standard),
            other => Err(format!("unknown unit system: {}", other)),
        }
    }
}

/// Color theme of the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

impl ThemeMode {
    pub fn from_dark(is_dark: bool) -> Self {
        if is_dark {
            Self::Dark
        } else {
            Self::Light
        }
    }

    pub fn is_dark(&self) -> bool {
        matches!(self, Self::Dark)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

impl fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThemeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(format!("unknown theme mode: {}", other)),
        }
    }
}

/// A position fix in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// True when both components are finite and inside the WGS84 range
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// What to fetch weather for
#[derive(Debug, Clone, PartialEq)]
pub enum WeatherQuery {
    City(String),
    Position(Coordinates),
}

impl fmt::Display for WeatherQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::City(name) => f.write_str(name),
            Self::Position(coords) => write!(f, "{}", coords),
        }
    }
}

/// Weather condition categories mapped from WMO codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    #[default]
    Clear,
    PartlyCloudy,
    Overcast,
    Fog,
    Drizzle,
    Rain,
    Snow,
    Thunderstorm,
    Unknown,
}

impl Condition {
    /// See: https://open-meteo.com/en/docs#weathervariables
    pub fn from_wmo_code(code: i32) -> Self {
        match code {
            0 => Self::Clear,
            1 | 2 => Self::PartlyCloudy,
            3 => Self::Overcast,
            45 | 48 => Self::Fog,
            51..=57 => Self::Drizzle,
            61..=67 | 80..=82 => Self::Rain,
            71..=77 | 85 | 86 => Self::Snow,
            95..=99 => Self::Thunderstorm,
            _ => Self::Unknown,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::PartlyCloudy => "Partly Cloudy",
            Self::Overcast => "Overcast",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::Snow => "Snow",
            Self::Thunderstorm => "Thunderstorm",
            Self::Unknown => "Unknown",
        }
    }
}

/// Current conditions at the queried place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: u8,
    pub wind_speed: f64,
    pub condition: Condition,
    /// Local observation time reported by the provider
    pub observed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub high: f64,
    pub low: f64,
    pub condition: Condition,
    pub precipitation_chance: u8,
}

/// European air quality index bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AirQualityLevel {
    Good,
    Fair,
    Moderate,
    Poor,
    VeryPoor,
    ExtremelyPoor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQuality {
    pub european_aqi: u16,
    pub pm2_5: Option<f64>,
    pub pm10: Option<f64>,
}

impl AirQuality {
    pub fn level(&self) -> AirQualityLevel {
        match self.european_aqi {
            0..=20 => AirQualityLevel::Good,
            21..=40 => AirQualityLevel::Fair,
            41..=60 => AirQualityLevel::Moderate,
            61..=80 => AirQualityLevel::Poor,
            81..=100 => AirQualityLevel::VeryPoor,
            _ => AirQualityLevel::ExtremelyPoor,
        }
    }
}

/// Complete weather bundle returned by a fetcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    /// Display name of the place ("Paris, France" or formatted coordinates)
    pub place: String,
    pub coordinates: Coordinates,
    pub units: Units,
    pub language: String,
    pub current: CurrentConditions,
    pub daily: Vec<DailyForecast>,
    pub air_quality: Option<AirQuality>,
    pub fetched_at: DateTime<Utc>,
}

/// Location service errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Location provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("Location request timed out")]
    Timeout,
    #[error("Location tracker is busy ({0})")]
    Busy(String),
    #[error("Location error: {0}")]
    Other(String),
}

/// Weather provider errors
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Location error: {0}")]
    Location(#[from] LocationError),
    #[error("City not found: {0}")]
    CityNotFound(String),
    #[error("Unexpected status: {0}")]
    Status(u16),
    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wmo_code_ranges() {
        assert_eq!(Condition::from_wmo_code(0), Condition::Clear);
        assert_eq!(Condition::from_wmo_code(2), Condition::PartlyCloudy);
        assert_eq!(Condition::from_wmo_code(48), Condition::Fog);
        assert_eq!(Condition::from_wmo_code(56), Condition::Drizzle);
        assert_eq!(Condition::from_wmo_code(81), Condition::Rain);
        assert_eq!(Condition::from_wmo_code(86), Condition::Snow);
        assert_eq!(Condition::from_wmo_code(96), Condition::Thunderstorm);
    }

    #[test]
    fn test_wmo_code_unknown() {
        assert_eq!(Condition::from_wmo_code(999), Condition::Unknown);
        assert_eq!(Condition::from_wmo_code(-1), Condition::Unknown);
    }

    #[test]
    fn test_units_parse_and_display() {
        assert_eq!("Imperial".parse::<Units>(), Ok(Units::Imperial));
        assert_eq!(" standard ".parse::<Units>(), Ok(Units::Standard));
        assert!("kelvin".parse::<Units>().is_err());
        assert_eq!(Units::Metric.to_string(), "metric");
        assert_eq!(Units::Standard.temperature_symbol(), "K");
    }

    #[test]
    fn test_theme_mode_from_dark() {
        assert_eq!(ThemeMode::from_dark(true), ThemeMode::Dark);
        assert_eq!(ThemeMode::from_dark(false), ThemeMode::Light);
        assert!(ThemeMode::Dark.is_dark());
        assert_eq!("DARK".parse::<ThemeMode>(), Ok(ThemeMode::Dark));
    }

    #[test]
    fn test_coordinates_validity() {
        assert!(Coordinates::new(48.85, 2.35).is_valid());
        assert!(!Coordinates::new(91.0, 0.0).is_valid());
        assert!(!Coordinates::new(0.0, f64::NAN).is_valid());
    }

    #[test]
    fn test_air_quality_levels() {
        let aq = |aqi| AirQuality {
            european_aqi: aqi,
            pm2_5: None,
            pm10: None,
        };
        assert_eq!(aq(10).level(), AirQualityLevel::Good);
        assert_eq!(aq(55).level(), AirQualityLevel::Moderate);
        assert_eq!(aq(140).level(), AirQualityLevel::ExtremelyPoor);
    }

    #[test]
    fn test_units_serde_lowercase() {
        let json = serde_json::to_string(&Units::Imperial).unwrap();
        assert_eq!(json, "\"imperial\"");
    }
}
