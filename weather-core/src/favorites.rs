use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    config::Config,
    model::{Coordinate, CurrentWeather, WeatherQuery},
};

/// Two favorites with the same city id closer than this (in degrees, ≈5 km)
/// are the same place.
pub const SAME_PLACE_DEGREES: f64 = 0.05;

/// A saved place, keyed by the API's city id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoriteLocation {
    pub id: i64,
    pub name: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

impl FavoriteLocation {
    pub fn from_weather(weather: &CurrentWeather, display_name: &str) -> Self {
        Self {
            id: weather.city_id,
            name: display_name.to_string(),
            country: weather.country.clone(),
            lat: weather.coordinate.lat,
            lon: weather.coordinate.lon,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }

    /// Opening a favorite resolves by coordinate but keeps the stored name.
    pub fn query(&self) -> WeatherQuery {
        WeatherQuery::coordinates(self.coordinate(), Some(self.name.clone()))
    }
}

/// Same id and within [`SAME_PLACE_DEGREES`] on both axes. The API reuses ids
/// for neighbouring villages, so the id alone is not enough.
impl PartialEq for FavoriteLocation {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && (self.lat - other.lat).abs() < SAME_PLACE_DEGREES
            && (self.lon - other.lon).abs() < SAME_PLACE_DEGREES
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FavoritesList {
    items: Vec<FavoriteLocation>,
}

impl FavoritesList {
    pub fn items(&self) -> &[FavoriteLocation] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn contains(&self, location: &FavoriteLocation) -> bool {
        self.items.contains(location)
    }

    /// Removes the location if it is already saved, otherwise appends it.
    /// Returns `true` when the location ends up saved.
    pub fn toggle(&mut self, location: FavoriteLocation) -> bool {
        match self.items.iter().position(|f| *f == location) {
            Some(index) => {
                self.items.remove(index);
                false
            }
            None => {
                self.items.push(location);
                true
            }
        }
    }

    pub fn remove_at(&mut self, index: usize) -> Option<FavoriteLocation> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::file_path()?)
    }

    /// A missing or unreadable file yields an empty list; the next save rewrites it.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read favorites file: {}", path.display()))?;

        match serde_json::from_str(&contents) {
            Ok(list) => Ok(list),
            Err(e) => {
                tracing::warn!("Failed to decode favorites at {}: {e}", path.display());
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create data directory: {}", parent.display())
            })?;
        }

        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize favorites to JSON")?;

        fs::write(path, json)
            .with_context(|| format!("Failed to write favorites file: {}", path.display()))?;

        Ok(())
    }

    pub fn file_path() -> Result<PathBuf> {
        Ok(Config::project_dirs()?.data_dir().join("favorites.json"))
    }
}
