//! Core library for the `weather` CLI.
//!
//! This crate defines:
//! - Configuration & favorites persistence
//! - Collaborator contracts (weather API, device location, geocoding) and an
//!   OpenWeatherMap implementation
//! - The resolution state machine deciding which weather is shown
//! - Debounced, cancellable city search with concurrent verification
//! - Day-bucketed forecast aggregation
//!
//! It is used by `weather-cli`, but can also be driven by any other front end
//! that supplies the collaborators.

pub mod config;
pub mod error;
pub mod favorites;
pub mod forecast;
pub mod location;
pub mod model;
pub mod orchestrator;
pub mod provider;
pub mod search;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{ApiError, LocationError, SearchError, WeatherError};
pub use favorites::{FavoriteLocation, FavoritesList};
pub use forecast::ForecastDigest;
pub use location::{AuthorizationStatus, LocationFix, LocationProvider, LocationResolver};
pub use model::{
    Coordinate, CurrentWeather, ForecastEntry, Lookup, PlaceMatch, SearchCandidate, VerifiedCity,
    WeatherQuery,
};
pub use orchestrator::{
    Collaborators, OrchestratorConfig, OrchestratorHandle, Phase, WeatherOrchestrator, WeatherState,
};
pub use provider::{
    CompletionSource, Geocoder, OpenWeatherClient, OpenWeatherGeocoder, WeatherApiClient,
};
pub use search::{SearchConfig, SearchHandle, SearchPipeline, SearchState, SearchStatus};
