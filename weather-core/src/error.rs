//! Error taxonomy shared by the collaborators and the published state.

use thiserror::Error;

/// Failures reported by a [`crate::WeatherApiClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Invalid request URL")]
    InvalidUrl,
    #[error("City not found")]
    CityNotFound,
    #[error("Failed to decode server response")]
    DecodingError,
    #[error("No data received")]
    NoData,
    #[error("Network error: {0}")]
    Other(String),
}

/// Failures of a device location request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Location access denied")]
    AccessDenied,
    #[error("Location request failed")]
    Failed,
    #[error("Location request timed out")]
    TimedOut,
}

/// Failures of the autocomplete collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    /// The source dropped the request because a newer one replaced it.
    #[error("Search cancelled")]
    Cancelled,
    #[error("Search transport error: {0}")]
    Transport(String),
}

/// User-visible errors published by the orchestrator and the search pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeatherError {
    #[error("City not found. Please check the name.")]
    CityNotFound,
    #[error("Location access denied. Enable it in system settings.")]
    LocationAccessDenied,
    #[error("Could not determine your location quickly.")]
    LocationTimedOut,
    #[error("Could not determine your location.")]
    LocationFailed,
    #[error("Critical network error. Could not load weather data: {0}")]
    NetworkOrDecoding(String),
    #[error("Connection error: {0}")]
    SearchTransport(String),
}

impl From<LocationError> for WeatherError {
    fn from(err: LocationError) -> Self {
        match err {
            LocationError::AccessDenied => WeatherError::LocationAccessDenied,
            LocationError::TimedOut => WeatherError::LocationTimedOut,
            LocationError::Failed => WeatherError::LocationFailed,
        }
    }
}

impl From<ApiError> for WeatherError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::CityNotFound => WeatherError::CityNotFound,
            other => WeatherError::NetworkOrDecoding(other.to_string()),
        }
    }
}
