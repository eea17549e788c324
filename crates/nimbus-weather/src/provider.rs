use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::geocode::{self, Place};
use crate::types::{
    AirQuality, Condition, Coordinates, CurrentConditions, DailyForecast, Units, WeatherError,
    WeatherQuery, WeatherReport,
};

pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const DEFAULT_AIR_QUALITY_URL: &str = "https://air-quality-api.open-meteo.com/v1/air-quality";

const KELVIN_OFFSET: f64 = 273.15;
const FORECAST_DAYS: &str = "7";

/// Boxed future returned by [`WeatherFetcher::fetch`]
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<WeatherReport, WeatherError>> + Send + 'a>>;

/// Anything able to produce a weather report for a query
pub trait WeatherFetcher: Send + Sync {
    fn fetch<'a>(&'a self, query: &'a WeatherQuery, language: &'a str, units: Units) -> FetchFuture<'a>;
}

/// Endpoints used by [`OpenMeteoClient`]
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub forecast_url: String,
    pub air_quality_url: String,
    pub geocoding_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            forecast_url: DEFAULT_FORECAST_URL.to_string(),
            air_quality_url: DEFAULT_AIR_QUALITY_URL.to_string(),
            geocoding_url: geocode::DEFAULT_GEOCODING_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// All three services rooted at one base URL (used against mock servers)
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            forecast_url: format!("{}/v1/forecast", base),
            air_quality_url: format!("{}/v1/air-quality", base),
            geocoding_url: format!("{}/v1/search", base),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: ForecastCurrent,
    daily: Option<ForecastDaily>,
}

#[derive(Debug, Deserialize)]
struct ForecastCurrent {
    time: Option<String>,
    temperature_2m: f64,
    apparent_temperature: Option<f64>,
    relative_humidity_2m: Option<f64>,
    wind_speed_10m: Option<f64>,
    weather_code: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct ForecastDaily {
    time: Vec<String>,
    weather_code: Vec<Option<i32>>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AirQualityResponse {
    current: AirQualityCurrent,
}

#[derive(Debug, Deserialize)]
struct AirQualityCurrent {
    european_aqi: Option<f64>,
    pm2_5: Option<f64>,
    pm10: Option<f64>,
}

/// Weather, forecast and air quality from Open-Meteo
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    client: Arc<Client>,
    endpoints: Endpoints,
}

impl OpenMeteoClient {
    pub fn new(endpoints: Endpoints, timeout: Duration) -> Result<Self, WeatherError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client: Arc::new(client),
            endpoints,
        })
    }

    async fn fetch_report(
        &self,
        query: &WeatherQuery,
        language: &str,
        units: Units,
    ) -> Result<WeatherReport, WeatherError> {
        let place = match query {
            WeatherQuery::City(name) => {
                geocode::resolve_city(&self.client, &self.endpoints.geocoding_url, name, language)
                    .await?
            }
            WeatherQuery::Position(coordinates) => Place {
                name: format!("{:.2}, {:.2}", coordinates.latitude, coordinates.longitude),
                coordinates: *coordinates,
            },
        };

        let forecast = self.fetch_forecast(place.coordinates, units).await?;
        let air_quality = match self.fetch_air_quality(place.coordinates).await {
            Ok(aq) => aq,
            Err(e) => {
                tracing::warn!("Air quality unavailable for {}: {}", place.name, e);
                None
            }
        };

        let report = build_report(place, forecast, air_quality, language, units);
        tracing::info!("Fetched weather for {} ({})", report.place, units);
        Ok(report)
    }

    async fn fetch_forecast(
        &self,
        coordinates: Coordinates,
        units: Units,
    ) -> Result<ForecastResponse, WeatherError> {
        let (temperature_unit, wind_speed_unit) = match units {
            Units::Metric => ("celsius", "kmh"),
            Units::Imperial => ("fahrenheit", "mph"),
            Units::Standard => ("celsius", "ms"),
        };
        let latitude = coordinates.latitude.to_string();
        let longitude = coordinates.longitude.to_string();

        let url = Url::parse_with_params(
            &self.endpoints.forecast_url,
            &[
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                (
                    "current",
                    "temperature_2m,apparent_temperature,relative_humidity_2m,wind_speed_10m,weather_code",
                ),
                (
                    "daily",
                    "weather_code,temperature_2m_max,temperature_2m_min,precipitation_probability_max",
                ),
                ("temperature_unit", temperature_unit),
                ("wind_speed_unit", wind_speed_unit),
                ("forecast_days", FORECAST_DAYS),
                ("timezone", "auto"),
            ],
        )
        .map_err(|e| WeatherError::Parse(format!("invalid forecast URL: {}", e)))?;

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(WeatherError::Status(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| WeatherError::Parse(e.to_string()))
    }

    async fn fetch_air_quality(
        &self,
        coordinates: Coordinates,
    ) -> Result<Option<AirQuality>, WeatherError> {
        let latitude = coordinates.latitude.to_string();
        let longitude = coordinates.longitude.to_string();

        let url = Url::parse_with_params(
            &self.endpoints.air_quality_url,
            &[
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                ("current", "european_aqi,pm2_5,pm10"),
            ],
        )
        .map_err(|e| WeatherError::Parse(format!("invalid air quality URL: {}", e)))?;

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(WeatherError::Status(response.status().as_u16()));
        }

        let body: AirQualityResponse = response
            .json()
            .await
            .map_err(|e| WeatherError::Parse(e.to_string()))?;

        Ok(body.current.european_aqi.map(|aqi| AirQuality {
            european_aqi: aqi.round().clamp(0.0, f64::from(u16::MAX)) as u16,
            pm2_5: body.current.pm2_5,
            pm10: body.current.pm10,
        }))
    }
}

impl WeatherFetcher for OpenMeteoClient {
    fn fetch<'a>(&'a self, query: &'a WeatherQuery, language: &'a str, units: Units) -> FetchFuture<'a> {
        Box::pin(self.fetch_report(query, language, units))
    }
}

fn build_report(
    place: Place,
    forecast: ForecastResponse,
    air_quality: Option<AirQuality>,
    language: &str,
    units: Units,
) -> WeatherReport {
    let temperature = |celsius_or_native: f64| match units {
        Units::Standard => celsius_or_native + KELVIN_OFFSET,
        _ => celsius_or_native,
    };

    let current = &forecast.current;
    let current = CurrentConditions {
        temperature: temperature(current.temperature_2m),
        feels_like: temperature(current.apparent_temperature.unwrap_or(current.temperature_2m)),
        humidity: current
            .relative_humidity_2m
            .map(|h| h.round().clamp(0.0, 100.0) as u8)
            .unwrap_or(0),
        wind_speed: current.wind_speed_10m.unwrap_or(0.0),
        condition: current
            .weather_code
            .map(Condition::from_wmo_code)
            .unwrap_or(Condition::Unknown),
        observed_at: current
            .time
            .as_deref()
            .and_then(|t| NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M").ok()),
    };

    let daily = forecast
        .daily
        .map(|daily| {
            daily
                .time
                .iter()
                .enumerate()
                .filter_map(|(i, day)| {
                    let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;
                    let high = daily.temperature_2m_max.get(i).copied().flatten()?;
                    let low = daily.temperature_2m_min.get(i).copied().flatten()?;
                    Some(DailyForecast {
                        date,
                        high: temperature(high),
                        low: temperature(low),
                        condition: daily
                            .weather_code
                            .get(i)
                            .copied()
                            .flatten()
                            .map(Condition::from_wmo_code)
                            .unwrap_or(Condition::Unknown),
                        precipitation_chance: daily
                            .precipitation_probability_max
                            .get(i)
                            .copied()
                            .flatten()
                            .map(|p| p.round().clamp(0.0, 100.0) as u8)
                            .unwrap_or(0),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    WeatherReport {
        place: place.name,
        coordinates: place.coordinates,
        units,
        language: language.to_string(),
        current,
        daily,
        air_quality,
        fetched_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn forecast_body() -> serde_json::Value {
        serde_json::json!({
            "current": {
                "time": "2026-10-19T14:00",
                "temperature_2m": 12.4,
                "apparent_temperature": 10.9,
                "relative_humidity_2m": 81,
                "wind_speed_10m": 14.2,
                "weather_code": 3
            },
            "daily": {
                "time": ["2026-10-19", "2026-10-20"],
                "weather_code": [3, 61],
                "temperature_2m_max": [14.0, 12.5],
                "temperature_2m_min": [8.0, null],
                "precipitation_probability_max": [10, 80]
            }
        })
    }

    async fn mount_forecast(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetch_by_city() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .and(query_param("name", "Oslo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{ "name": "Oslo", "latitude": 59.91, "longitude": 10.75, "country": "Norway" }]
            })))
            .mount(&server)
            .await;
        mount_forecast(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/air-quality"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "current": { "european_aqi": 23.0, "pm2_5": 4.1, "pm10": 7.9 }
            })))
            .mount(&server)
            .await;

        let client = OpenMeteoClient::new(Endpoints::with_base(&server.uri()), Duration::from_secs(5)).unwrap();
        let query = WeatherQuery::City("Oslo".to_string());
        let report = client.fetch(&query, "en", Units::Metric).await.unwrap();

        assert_eq!(report.place, "Oslo, Norway");
        assert_eq!(report.coordinates, Coordinates::new(59.91, 10.75));
        assert_eq!(report.current.condition, Condition::Overcast);
        assert_eq!(report.current.humidity, 81);
        // Second day has no minimum and is skipped
        assert_eq!(report.daily.len(), 1);
        assert_eq!(report.daily[0].precipitation_chance, 10);
        assert_eq!(report.air_quality.as_ref().map(|a| a.european_aqi), Some(23));
    }

    #[tokio::test]
    async fn test_fetch_by_position_standard_units() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .and(query_param("temperature_unit", "celsius"))
            .and(query_param("wind_speed_unit", "ms"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/air-quality"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = OpenMeteoClient::new(Endpoints::with_base(&server.uri()), Duration::from_secs(5)).unwrap();
        let query = WeatherQuery::Position(Coordinates::new(40.0, -3.7));
        let report = client.fetch(&query, "es", Units::Standard).await.unwrap();

        assert_eq!(report.place, "40.00, -3.70");
        assert!((report.current.temperature - (12.4 + KELVIN_OFFSET)).abs() < 1e-9);
        assert_eq!(report.language, "es");
        // Air quality failure is not fatal
        assert!(report.air_quality.is_none());
    }

    #[tokio::test]
    async fn test_fetch_forecast_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = OpenMeteoClient::new(Endpoints::with_base(&server.uri()), Duration::from_secs(5)).unwrap();
        let query = WeatherQuery::Position(Coordinates::new(1.0, 1.0));
        let err = client.fetch(&query, "en", Units::Imperial).await.unwrap_err();
        assert!(matches!(err, WeatherError::Status(502)));
    }

    #[test]
    fn test_endpoints_with_base_trims_slash() {
        let endpoints = Endpoints::with_base("http://localhost:1234/");
        assert_eq!(endpoints.forecast_url, "http://localhost:1234/v1/forecast");
        assert_eq!(endpoints.geocoding_url, "http://localhost:1234/v1/search");
    }
}
