use std::hash::{Hash, Hasher};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A point on the globe in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}, {:.4}", self.lat, self.lon)
    }
}

/// Input to a single resolution attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum WeatherQuery {
    City { name: String },
    /// `label` overrides the name the API reports, e.g. after reverse-geocoding
    /// or when a stored favorite is opened.
    Coordinates {
        coordinate: Coordinate,
        label: Option<String>,
    },
}

impl WeatherQuery {
    pub fn city(name: impl Into<String>) -> Self {
        Self::City { name: name.into() }
    }

    pub fn coordinates(coordinate: Coordinate, label: Option<String>) -> Self {
        Self::Coordinates { coordinate, label }
    }
}

/// What a [`crate::WeatherApiClient`] is asked to look up.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    City(String),
    Coordinate(Coordinate),
}

impl std::fmt::Display for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lookup::City(name) => f.write_str(name),
            Lookup::Coordinate(c) => write!(f, "({c})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Readings {
    pub temperature: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity: u8,
    pub pressure: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    pub speed: Option<f64>,
    pub deg: Option<u16>,
}

/// One weather condition as reported by the API ("Rain", "light rain", "10d").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub main: String,
    pub description: String,
    pub icon: String,
}

/// Current conditions for one place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub city_id: i64,
    /// Canonical city name as returned by the API.
    pub name: String,
    pub country: String,
    pub coordinate: Coordinate,
    pub readings: Readings,
    pub conditions: Vec<Condition>,
    pub wind: Option<Wind>,
    pub observed_at: DateTime<Utc>,
}

impl CurrentWeather {
    pub fn primary_condition(&self) -> Option<&Condition> {
        self.conditions.first()
    }
}

/// One 3-hour slot of the forecast feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    /// Epoch seconds; the authoritative time of the slot.
    pub timestamp: i64,
    pub readings: Readings,
    pub conditions: Vec<Condition>,
    pub wind: Option<Wind>,
}

impl ForecastEntry {
    pub fn time(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.timestamp, 0).unwrap_or_default()
    }

    /// Calendar day of this slot in the given zone.
    pub fn day_in<Tz: TimeZone>(&self, tz: &Tz) -> NaiveDate {
        self.time().with_timezone(tz).date_naive()
    }
}

/// Raw completion from the autocomplete collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchCandidate {
    pub title: String,
    pub subtitle: String,
}

impl SearchCandidate {
    pub fn new(title: impl Into<String>, subtitle: impl Into<String>) -> Self {
        Self { title: title.into(), subtitle: subtitle.into() }
    }

    /// Titles starting with a digit are street addresses or postcodes, never cities.
    pub fn looks_numeric(&self) -> bool {
        self.title.chars().next().is_some_and(|c| c.is_numeric())
    }
}

/// Geocoder answer for one candidate.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaceMatch {
    pub name: Option<String>,
    pub locality: Option<String>,
    pub thoroughfare: Option<String>,
    pub admin_area: Option<String>,
    pub country: Option<String>,
    pub coordinate: Option<Coordinate>,
}

impl PlaceMatch {
    /// A match counts as a city when it names a locality and has no street component.
    pub fn is_city(&self) -> bool {
        self.locality.is_some() && self.thoroughfare.is_none() && self.coordinate.is_some()
    }
}

/// A search candidate confirmed to be a city.
///
/// Identity is title + coordinate; the subtitle is display-only.
#[derive(Debug, Clone)]
pub struct VerifiedCity {
    pub title: String,
    pub subtitle: String,
    pub coordinate: Coordinate,
}

impl VerifiedCity {
    pub fn from_match(candidate: &SearchCandidate, place: &PlaceMatch) -> Option<Self> {
        if !place.is_city() {
            return None;
        }
        let coordinate = place.coordinate?;
        let title = place
            .locality
            .clone()
            .or_else(|| place.name.clone())
            .unwrap_or_else(|| candidate.title.clone());

        let subtitle = [place.admin_area.as_deref(), place.country.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ");

        Some(Self { title, subtitle, coordinate })
    }

    pub fn query(&self) -> WeatherQuery {
        WeatherQuery::coordinates(self.coordinate, Some(self.title.clone()))
    }

    fn identity(&self) -> (&str, u64, u64) {
        (self.title.as_str(), self.coordinate.lat.to_bits(), self.coordinate.lon.to_bits())
    }
}

impl PartialEq for VerifiedCity {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for VerifiedCity {}

impl Hash for VerifiedCity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}
