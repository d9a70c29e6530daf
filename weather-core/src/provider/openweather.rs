use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};

use crate::{
    config::Config,
    error::{ApiError, SearchError},
    model::{
        Condition, Coordinate, CurrentWeather, ForecastEntry, Lookup, PlaceMatch, Readings,
        SearchCandidate, Wind,
    },
};

use super::{CompletionSource, Geocoder, WeatherApiClient};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";
pub const DEFAULT_GEO_URL: &str = "https://api.openweathermap.org/geo/1.0";

const HTTP_TIMEOUT_SECS: u64 = 15;
const COMPLETION_LIMIT: u8 = 5;

fn http_client() -> anyhow::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .context("Failed to build HTTP client")
}

/// OpenWeatherMap current-weather and 5-day/3-hour forecast endpoints.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    api_key: String,
    units: String,
    language: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherClient {
    pub fn new(api_key: String) -> anyhow::Result<Self> {
        Ok(Self {
            api_key,
            units: "metric".to_string(),
            language: "en".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            http: http_client()?,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = Self::new(config.require_api_key()?.to_owned())?;
        Ok(client.with_units(&config.units).with_language(&config.language))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_units(mut self, units: &str) -> Self {
        self.units = units.to_string();
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    fn lookup_query(lookup: &Lookup) -> Vec<(&'static str, String)> {
        match lookup {
            Lookup::City(name) => vec![("q", name.clone())],
            Lookup::Coordinate(c) => vec![("lat", c.lat.to_string()), ("lon", c.lon.to_string())],
        }
    }

    async fn fetch_data<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        lookup: &Lookup,
    ) -> Result<T, ApiError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint);

        let mut query = vec![
            ("appid", self.api_key.clone()),
            ("units", self.units.clone()),
            ("lang", self.language.clone()),
        ];
        query.extend(Self::lookup_query(lookup));

        let res = self.http.get(&url).query(&query).send().await.map_err(|e| {
            if e.is_builder() {
                ApiError::InvalidUrl
            } else {
                tracing::warn!("OpenWeather {endpoint} request for {lookup} failed: {e}");
                ApiError::Other(e.to_string())
            }
        })?;

        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!("OpenWeather {endpoint}: {lookup} not found");
            return Err(ApiError::CityNotFound);
        }
        if !status.is_success() {
            return Err(ApiError::Other(format!("HTTP Error: {}", status.as_u16())));
        }

        let body = res.text().await.map_err(|e| ApiError::Other(e.to_string()))?;
        if body.trim().is_empty() {
            return Err(ApiError::NoData);
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(
                "Failed to decode OpenWeather {endpoint} response: {e}; body: {}",
                truncate_body(&body)
            );
            ApiError::DecodingError
        })
    }
}

#[async_trait]
impl WeatherApiClient for OpenWeatherClient {
    async fn fetch_current_weather(&self, lookup: &Lookup) -> Result<CurrentWeather, ApiError> {
        let parsed: OwCurrentResponse = self.fetch_data("weather", lookup).await?;
        Ok(parsed.into())
    }

    async fn fetch_forecast(&self, lookup: &Lookup) -> Result<Vec<ForecastEntry>, ApiError> {
        let parsed: OwForecastResponse = self.fetch_data("forecast", lookup).await?;
        Ok(parsed.list.into_iter().map(Into::into).collect())
    }
}

/// OpenWeatherMap geocoding API, used both as the autocomplete source and as
/// the verifier for its candidates.
#[derive(Debug, Clone)]
pub struct OpenWeatherGeocoder {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherGeocoder {
    pub fn new(api_key: String) -> anyhow::Result<Self> {
        Ok(Self { api_key, base_url: DEFAULT_GEO_URL.to_string(), http: http_client()? })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(config.require_api_key()?.to_owned())
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_places(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<OwGeoPlace>, String> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint);

        let res = self
            .http
            .get(&url)
            .query(&[("appid", self.api_key.as_str())])
            .query(query)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = res.status();
        if !status.is_success() {
            return Err(format!("HTTP Error: {}", status.as_u16()));
        }

        res.json::<Vec<OwGeoPlace>>().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl CompletionSource for OpenWeatherGeocoder {
    async fn complete(&self, fragment: &str) -> Result<Vec<SearchCandidate>, SearchError> {
        let places = self
            .get_places(
                "direct",
                &[("q", fragment.to_string()), ("limit", COMPLETION_LIMIT.to_string())],
            )
            .await
            .map_err(SearchError::Transport)?;

        Ok(places
            .into_iter()
            .map(|p| {
                let subtitle = join_parts(&[p.state.as_deref(), Some(p.country.as_str())]);
                SearchCandidate::new(p.name, subtitle)
            })
            .collect())
    }
}

#[async_trait]
impl Geocoder for OpenWeatherGeocoder {
    async fn reverse_geocode(&self, coordinate: Coordinate) -> Option<String> {
        let query = [
            ("lat", coordinate.lat.to_string()),
            ("lon", coordinate.lon.to_string()),
            ("limit", "1".to_string()),
        ];
        match self.get_places("reverse", &query).await {
            Ok(places) => places.into_iter().next().map(|p| p.name),
            Err(e) => {
                tracing::debug!("Reverse geocode for {coordinate} failed: {e}");
                None
            }
        }
    }

    async fn search_place(&self, candidate: &SearchCandidate) -> Option<PlaceMatch> {
        // "City,State,CC" is the query form the direct endpoint understands.
        let q = if candidate.subtitle.is_empty() {
            candidate.title.clone()
        } else {
            format!("{},{}", candidate.title, candidate.subtitle.replace(", ", ","))
        };

        match self.get_places("direct", &[("q", q), ("limit", "1".to_string())]).await {
            Ok(places) => places.into_iter().next().map(|p| PlaceMatch {
                name: Some(p.name.clone()),
                locality: Some(p.name),
                thoroughfare: None,
                admin_area: p.state,
                country: Some(p.country),
                coordinate: Some(Coordinate::new(p.lat, p.lon)),
            }),
            Err(e) => {
                tracing::debug!("Place lookup for {:?} failed: {e}", candidate.title);
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct OwCoord {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    temp_min: f64,
    temp_max: f64,
    humidity: u8,
    pressure: u32,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    main: String,
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: Option<f64>,
    deg: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct OwSys {
    #[serde(default)]
    country: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    coord: OwCoord,
    weather: Vec<OwWeather>,
    main: OwMain,
    wind: Option<OwWind>,
    dt: i64,
    sys: OwSys,
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: Option<OwWind>,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    list: Vec<OwForecastEntry>,
}

#[derive(Debug, Deserialize)]
struct OwGeoPlace {
    name: String,
    lat: f64,
    lon: f64,
    #[serde(default)]
    country: String,
    state: Option<String>,
}

impl From<OwMain> for Readings {
    fn from(m: OwMain) -> Self {
        Readings {
            temperature: m.temp,
            temp_min: m.temp_min,
            temp_max: m.temp_max,
            humidity: m.humidity,
            pressure: m.pressure,
        }
    }
}

impl From<OwWeather> for Condition {
    fn from(w: OwWeather) -> Self {
        Condition { main: w.main, description: w.description, icon: w.icon }
    }
}

impl From<OwWind> for Wind {
    fn from(w: OwWind) -> Self {
        Wind { speed: w.speed, deg: w.deg }
    }
}

impl From<OwCurrentResponse> for CurrentWeather {
    fn from(r: OwCurrentResponse) -> Self {
        CurrentWeather {
            city_id: r.id,
            name: r.name,
            country: r.sys.country,
            coordinate: Coordinate::new(r.coord.lat, r.coord.lon),
            readings: r.main.into(),
            conditions: r.weather.into_iter().map(Into::into).collect(),
            wind: r.wind.map(Into::into),
            observed_at: DateTime::from_timestamp(r.dt, 0).unwrap_or_else(Utc::now),
        }
    }
}

impl From<OwForecastEntry> for ForecastEntry {
    fn from(e: OwForecastEntry) -> Self {
        ForecastEntry {
            timestamp: e.dt,
            readings: e.main.into(),
            conditions: e.weather.into_iter().map(Into::into).collect(),
            wind: e.wind.map(Into::into),
        }
    }
}

fn join_parts(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}
