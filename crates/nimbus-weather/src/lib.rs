//! Weather domain for Nimbus
//!
//! Provides the shared domain types, location providers and the weather
//! fetch collaborator (Open-Meteo forecast, geocoding and air quality).

pub mod geocode;
pub mod location;
pub mod provider;
pub mod types;

pub use location::{
    DisabledLocationProvider, FixedLocationProvider, IpLocationProvider, LocationFuture,
    LocationProvider,
};
pub use provider::{Endpoints, FetchFuture, OpenMeteoClient, WeatherFetcher};
pub use types::*;
