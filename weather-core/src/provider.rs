//! Collaborator contracts the core drives.
//!
//! Transport, device location and geocoding live behind these traits so the
//! orchestration can be exercised without a network.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    error::{ApiError, SearchError},
    model::{Coordinate, CurrentWeather, ForecastEntry, Lookup, PlaceMatch, SearchCandidate},
};

pub mod openweather;

pub use openweather::{OpenWeatherClient, OpenWeatherGeocoder};

#[async_trait]
pub trait WeatherApiClient: Send + Sync + Debug {
    async fn fetch_current_weather(&self, lookup: &Lookup) -> Result<CurrentWeather, ApiError>;

    /// Flat 3-hour forecast feed, ascending by time.
    async fn fetch_forecast(&self, lookup: &Lookup) -> Result<Vec<ForecastEntry>, ApiError>;
}

#[async_trait]
pub trait Geocoder: Send + Sync + Debug {
    /// Locality name for a coordinate, if one is known.
    async fn reverse_geocode(&self, coordinate: Coordinate) -> Option<String>;

    /// Best place match for an autocomplete candidate.
    async fn search_place(&self, candidate: &SearchCandidate) -> Option<PlaceMatch>;
}

#[async_trait]
pub trait CompletionSource: Send + Sync + Debug {
    async fn complete(&self, fragment: &str) -> Result<Vec<SearchCandidate>, SearchError>;
}
