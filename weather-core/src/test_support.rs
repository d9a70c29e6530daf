//! In-memory collaborators for unit tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::{
    error::{ApiError, LocationError, SearchError},
    location::{AuthorizationStatus, LocationFix, LocationProvider},
    model::{
        Condition, Coordinate, CurrentWeather, ForecastEntry, Lookup, PlaceMatch, Readings,
        SearchCandidate,
    },
    provider::{CompletionSource, Geocoder, WeatherApiClient},
};

const COMPLETION_LATENCY: Duration = Duration::from_millis(10);

pub fn fix_aged(coordinate: Coordinate, age_secs: i64) -> LocationFix {
    LocationFix::new(coordinate, Utc::now() - chrono::Duration::seconds(age_secs))
}

pub fn city_match(name: &str, country: &str, coordinate: Coordinate) -> PlaceMatch {
    PlaceMatch {
        name: Some(name.to_string()),
        locality: Some(name.to_string()),
        thoroughfare: None,
        admin_area: None,
        country: Some(country.to_string()),
        coordinate: Some(coordinate),
    }
}

fn readings(temperature: f64) -> Readings {
    Readings {
        temperature,
        temp_min: temperature - 2.0,
        temp_max: temperature + 2.0,
        humidity: 60,
        pressure: 1013,
    }
}

pub fn weather(name: &str, coordinate: Coordinate) -> CurrentWeather {
    CurrentWeather {
        city_id: name.len() as i64,
        name: name.to_string(),
        country: "UA".to_string(),
        coordinate,
        readings: readings(12.0),
        conditions: vec![Condition {
            main: "Clouds".into(),
            description: "scattered clouds".into(),
            icon: "03d".into(),
        }],
        wind: None,
        observed_at: Utc::now(),
    }
}

/// Two days of 3-hour slots starting now.
pub fn sample_forecast() -> Vec<ForecastEntry> {
    let start = Utc::now().timestamp();
    (0..16)
        .map(|i| ForecastEntry {
            timestamp: start + i * 3 * 3600,
            readings: readings(10.0 + i as f64),
            conditions: vec![],
            wind: None,
        })
        .collect()
}

type Scripted<T> = (Duration, Result<T, ApiError>);

#[derive(Debug)]
pub struct MockWeatherClient {
    by_city: Mutex<HashMap<String, Scripted<CurrentWeather>>>,
    by_coordinate: Mutex<Option<Scripted<CurrentWeather>>>,
    forecast: Mutex<Scripted<Vec<ForecastEntry>>>,
    current_calls: Mutex<Vec<Lookup>>,
    forecast_calls: Mutex<Vec<Lookup>>,
}

impl Default for MockWeatherClient {
    fn default() -> Self {
        Self {
            by_city: Mutex::new(HashMap::new()),
            by_coordinate: Mutex::new(None),
            forecast: Mutex::new((Duration::from_millis(20), Ok(sample_forecast()))),
            current_calls: Mutex::new(Vec::new()),
            forecast_calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockWeatherClient {
    pub fn city(&self, name: &str, delay: Duration, result: Result<CurrentWeather, ApiError>) {
        self.by_city.lock().insert(name.to_string(), (delay, result));
    }

    pub fn coordinates(&self, delay: Duration, result: Result<CurrentWeather, ApiError>) {
        *self.by_coordinate.lock() = Some((delay, result));
    }

    pub fn forecast(&self, result: Result<Vec<ForecastEntry>, ApiError>) {
        self.forecast.lock().1 = result;
    }

    pub fn current_calls(&self) -> Vec<Lookup> {
        self.current_calls.lock().clone()
    }

    pub fn forecast_calls(&self) -> Vec<Lookup> {
        self.forecast_calls.lock().clone()
    }
}

#[async_trait]
impl WeatherApiClient for MockWeatherClient {
    async fn fetch_current_weather(&self, lookup: &Lookup) -> Result<CurrentWeather, ApiError> {
        self.current_calls.lock().push(lookup.clone());
        let scripted = match lookup {
            Lookup::City(name) => self.by_city.lock().get(name).cloned(),
            Lookup::Coordinate(_) => self.by_coordinate.lock().clone(),
        };
        let (delay, result) = scripted.unwrap_or((Duration::ZERO, Err(ApiError::CityNotFound)));
        tokio::time::sleep(delay).await;
        result
    }

    async fn fetch_forecast(&self, lookup: &Lookup) -> Result<Vec<ForecastEntry>, ApiError> {
        self.forecast_calls.lock().push(lookup.clone());
        let (delay, result) = self.forecast.lock().clone();
        tokio::time::sleep(delay).await;
        result
    }
}

#[derive(Debug)]
pub struct MockLocationProvider {
    status: Mutex<AuthorizationStatus>,
    change: Mutex<Option<(Duration, AuthorizationStatus)>>,
    responses: Mutex<VecDeque<(Duration, Result<LocationFix, LocationError>)>>,
    last_known: Mutex<Option<LocationFix>>,
    requests: AtomicUsize,
}

impl MockLocationProvider {
    pub fn with_status(status: AuthorizationStatus) -> Self {
        Self {
            status: Mutex::new(status),
            change: Mutex::new(None),
            responses: Mutex::new(VecDeque::new()),
            last_known: Mutex::new(None),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn authorized() -> Self {
        Self::with_status(AuthorizationStatus::Authorized)
    }

    pub fn grant_after(&self, delay: Duration, status: AuthorizationStatus) {
        *self.change.lock() = Some((delay, status));
    }

    pub fn push_fix(&self, delay: Duration, fix: LocationFix) {
        self.responses.lock().push_back((delay, Ok(fix)));
    }

    pub fn push_failure(&self, delay: Duration, err: LocationError) {
        self.responses.lock().push_back((delay, Err(err)));
    }

    pub fn set_last_known(&self, fix: LocationFix) {
        *self.last_known.lock() = Some(fix);
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationProvider for MockLocationProvider {
    async fn authorization_status(&self) -> AuthorizationStatus {
        *self.status.lock()
    }

    async fn authorization_changed(&self) -> AuthorizationStatus {
        let change = self.change.lock().take();
        match change {
            Some((delay, status)) => {
                tokio::time::sleep(delay).await;
                *self.status.lock() = status;
                status
            }
            None => std::future::pending().await,
        }
    }

    async fn request_location(&self) -> Result<LocationFix, LocationError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let next = self.responses.lock().pop_front();
        match next {
            Some((delay, result)) => {
                tokio::time::sleep(delay).await;
                result
            }
            None => std::future::pending().await,
        }
    }

    fn last_known(&self) -> Option<LocationFix> {
        *self.last_known.lock()
    }
}

#[derive(Debug, Default)]
pub struct MockGeocoder {
    places: Mutex<HashMap<String, (Duration, Option<PlaceMatch>)>>,
    reverse: Mutex<Option<String>>,
    lookups: AtomicUsize,
}

impl MockGeocoder {
    pub fn place(&self, title: &str, delay: Duration, place: Option<PlaceMatch>) {
        self.places.lock().insert(title.to_string(), (delay, place));
    }

    pub fn reverse_to(&self, name: &str) {
        *self.reverse.lock() = Some(name.to_string());
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn reverse_geocode(&self, _coordinate: Coordinate) -> Option<String> {
        self.reverse.lock().clone()
    }

    async fn search_place(&self, candidate: &SearchCandidate) -> Option<PlaceMatch> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let scripted = self.places.lock().get(&candidate.title).cloned();
        let (delay, place) = scripted?;
        tokio::time::sleep(delay).await;
        place
    }
}

#[derive(Debug, Default)]
pub struct MockCompletionSource {
    responses: Mutex<HashMap<String, Result<Vec<SearchCandidate>, SearchError>>>,
    fragments: Mutex<Vec<String>>,
}

impl MockCompletionSource {
    pub fn respond(&self, fragment: &str, result: Result<Vec<SearchCandidate>, SearchError>) {
        self.responses.lock().insert(fragment.to_string(), result);
    }

    pub fn fragments(&self) -> Vec<String> {
        self.fragments.lock().clone()
    }
}

#[async_trait]
impl CompletionSource for MockCompletionSource {
    async fn complete(&self, fragment: &str) -> Result<Vec<SearchCandidate>, SearchError> {
        self.fragments.lock().push(fragment.to_string());
        let result = self.responses.lock().get(fragment).cloned().unwrap_or(Ok(Vec::new()));
        tokio::time::sleep(COMPLETION_LATENCY).await;
        result
    }
}
