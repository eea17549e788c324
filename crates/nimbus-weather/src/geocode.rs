//! Forward geocoding: convert a city name to coordinates.
//! Uses the Open-Meteo geocoding API - free, no API key required.

use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::types::{Coordinates, WeatherError};

pub const DEFAULT_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<GeocodingResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResult {
    name: String,
    latitude: f64,
    longitude: f64,
    country: Option<String>,
}

/// A resolved place
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub name: String,
    pub coordinates: Coordinates,
}

/// Resolve `city` to its best match, localized to `language` when the service supports it
pub async fn resolve_city(
    client: &Client,
    base_url: &str,
    city: &str,
    language: &str,
) -> Result<Place, WeatherError> {
    let city = city.trim();
    if city.is_empty() {
        return Err(WeatherError::CityNotFound(String::new()));
    }

    let url = Url::parse_with_params(
        base_url,
        &[
            ("name", city),
            ("count", "1"),
            ("language", language),
            ("format", "json"),
        ],
    )
    .map_err(|e| WeatherError::Parse(format!("invalid geocoding URL: {}", e)))?;

    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(WeatherError::Status(response.status().as_u16()));
    }

    let body: GeocodingResponse = response
        .json()
        .await
        .map_err(|e| WeatherError::Parse(e.to_string()))?;

    let hit = body
        .results
        .into_iter()
        .next()
        .ok_or_else(|| WeatherError::CityNotFound(city.to_string()))?;

    let name = match hit.country {
        Some(country) if !country.is_empty() && country != hit.name => {
            format!("{}, {}", hit.name, country)
        }
        _ => hit.name,
    };

    tracing::debug!("Geocoded '{}' to {} ({}, {})", city, name, hit.latitude, hit.longitude);

    Ok(Place {
        name,
        coordinates: Coordinates::new(hit.latitude, hit.longitude),
    })
}
