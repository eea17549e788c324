//! Location providers.
//!
//! A provider wraps whatever the platform offers for positioning. The
//! tracker in `nimbus-ui` asks it for permission once per tracking session
//! and then polls `read_position` from a dedicated worker thread.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::types::{Coordinates, LocationError};

/// Boxed future returned by [`LocationProvider`] methods
pub type LocationFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LocationError>> + Send + 'a>>;

/// Source of position fixes
pub trait LocationProvider: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Ask the platform for permission to read the position.
    ///
    /// May suspend for as long as a permission dialog is open.
    fn request_permission(&self) -> LocationFuture<'_, ()>;

    /// Read the most recent position reported by the platform
    fn read_position(&self) -> LocationFuture<'_, Coordinates>;
}

/// Always reports the same configured coordinates
#[derive(Debug, Clone)]
pub struct FixedLocationProvider {
    coordinates: Coordinates,
}

impl FixedLocationProvider {
    pub fn new(coordinates: Coordinates) -> Self {
        Self { coordinates }
    }
}

impl LocationProvider for FixedLocationProvider {
    fn name(&self) -> &str {
        "fixed"
    }

    fn request_permission(&self) -> LocationFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn read_position(&self) -> LocationFuture<'_, Coordinates> {
        let coordinates = self.coordinates;
        Box::pin(async move { Ok(coordinates) })
    }
}

/// Used when location is switched off in configuration
#[derive(Debug, Clone, Default)]
pub struct DisabledLocationProvider;

impl LocationProvider for DisabledLocationProvider {
    fn name(&self) -> &str {
        "disabled"
    }

    fn request_permission(&self) -> LocationFuture<'_, ()> {
        Box::pin(async {
            Err(LocationError::ProviderUnavailable(
                "location is disabled in configuration".to_string(),
            ))
        })
    }

    fn read_position(&self) -> LocationFuture<'_, Coordinates> {
        Box::pin(async {
            Err(LocationError::ProviderUnavailable(
                "location is disabled in configuration".to_string(),
            ))
        })
    }
}

/// Default endpoint for IP based geolocation
pub const DEFAULT_IP_LOOKUP_URL: &str = "http://ip-api.com/json";

#[derive(Debug, Deserialize)]
struct IpLookupResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(alias = "latitude")]
    lat: Option<f64>,
    #[serde(alias = "longitude")]
    lon: Option<f64>,
}

/// Approximate position derived from the public IP address.
///
/// Needs no OS permission, so `request_permission` always succeeds.
#[derive(Debug, Clone)]
pub struct IpLocationProvider {
    client: Client,
    url: String,
}

impl IpLocationProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, LocationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LocationError::ProviderUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn lookup(&self) -> Result<Coordinates, LocationError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if !response.status().is_success() {
            return Err(LocationError::ProviderUnavailable(format!(
                "IP lookup returned status {}",
                response.status()
            )));
        }

        let body: IpLookupResponse = response.json().await.map_err(map_reqwest_error)?;

        if body.status.as_deref() == Some("fail") {
            return Err(LocationError::ProviderUnavailable(
                body.message.unwrap_or_else(|| "IP lookup failed".to_string()),
            ));
        }

        let (Some(lat), Some(lon)) = (body.lat, body.lon) else {
            return Err(LocationError::Other(
                "IP lookup response has no coordinates".to_string(),
            ));
        };

        let coordinates = Coordinates::new(lat, lon);
        if !coordinates.is_valid() {
            return Err(LocationError::Other(format!(
                "IP lookup returned out-of-range coordinates: {}",
                coordinates
            )));
        }

        tracing::debug!("IP lookup resolved to {}", coordinates);
        Ok(coordinates)
    }
}

impl LocationProvider for IpLocationProvider {
    fn name(&self) -> &str {
        "ip"
    }

    fn request_permission(&self) -> LocationFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn read_position(&self) -> LocationFuture<'_, Coordinates> {
        Box::pin(self.lookup())
    }
}

fn map_reqwest_error(e: reqwest::Error) -> LocationError {
    if e.is_timeout() {
        LocationError::Timeout
    } else {
        LocationError::ProviderUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fixed_provider_reports_coordinates() {
        let provider = FixedLocationProvider::new(Coordinates::new(51.5, -0.12));
        provider.request_permission().await.unwrap();
        let coords = provider.read_position().await.unwrap();
        assert_eq!(coords, Coordinates::new(51.5, -0.12));
    }

    #[tokio::test]
    async fn test_disabled_provider_is_unavailable() {
        let provider = DisabledLocationProvider;
        let err = provider.request_permission().await.unwrap_err();
        assert!(matches!(err, LocationError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn test_ip_provider_parses_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "lat": 52.52,
                "lon": 13.40
            })))
            .mount(&server)
            .await;

        let provider = IpLocationProvider::new(server.uri(), Duration::from_secs(5)).unwrap();
        let coords = provider.read_position().await.unwrap();
        assert_eq!(coords, Coordinates::new(52.52, 13.40));
    }

    #[tokio::test]
    async fn test_ip_provider_accepts_long_field_names() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "latitude": -33.87,
                "longitude": 151.21
            })))
            .mount(&server)
            .await;

        let provider = IpLocationProvider::new(server.uri(), Duration::from_secs(5)).unwrap();
        let coords = provider.read_position().await.unwrap();
        assert_eq!(coords, Coordinates::new(-33.87, 151.21));
    }

    #[tokio::test]
    async fn test_ip_provider_reports_failure_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "fail",
                "message": "reserved range"
            })))
            .mount(&server)
            .await;

        let provider = IpLocationProvider::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = provider.read_position().await.unwrap_err();
        assert_eq!(
            err,
            LocationError::ProviderUnavailable("reserved range".to_string())
        );
    }

    #[tokio::test]
    async fn test_ip_provider_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = IpLocationProvider::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = provider.read_position().await.unwrap_err();
        assert!(matches!(err, LocationError::ProviderUnavailable(_)));
    }
}
