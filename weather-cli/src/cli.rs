use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use weather_core::{
    Collaborators, Config, FavoriteLocation, FavoritesList, Lookup, OpenWeatherClient,
    OpenWeatherGeocoder, OrchestratorConfig, OrchestratorHandle, SearchConfig, SearchHandle,
    SearchPipeline, SearchState, SearchStatus, WeatherApiClient, WeatherError,
    WeatherOrchestrator, WeatherQuery, WeatherState,
};

use crate::{device::CommandLineLocation, output};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Weather CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure the OpenWeatherMap API key and the default city.
    Configure,

    /// Show current weather and the 5-day outlook.
    ///
    /// Without a city, the location given by --lat/--lon is used; if that is
    /// missing too, the default city is shown.
    Show {
        /// City name, e.g. "Lviv".
        city: Option<String>,

        /// Latitude of "my location".
        #[arg(long, requires = "lon", allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Longitude of "my location".
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lon: Option<f64>,

        /// Print every 3-hour slot of each upcoming day.
        #[arg(long)]
        details: bool,
    },

    /// Search for cities matching a name fragment.
    Search {
        text: String,
    },

    /// Manage favorite locations.
    Favorites {
        #[command(subcommand)]
        action: FavoritesCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum FavoritesCommand {
    /// List saved favorites.
    List,
    /// Add a city to favorites, or remove it if already saved.
    Toggle { city: String },
    /// Show weather for the favorite at INDEX (as printed by `list`).
    Show {
        index: usize,
        #[arg(long)]
        details: bool,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Show { city, lat, lon, details } => {
                let config = Config::load()?;
                let handle = orchestrator(&config, CommandLineLocation::new(lat, lon))?;
                match city {
                    Some(city) => handle.resolve(WeatherQuery::city(city), true),
                    None => handle.request_initial_location(),
                }
                let state = settle(&handle).await?;
                output::print_weather(&state, &config.units, details);
                Ok(())
            }
            Command::Search { text } => search(&text).await,
            Command::Favorites { action } => favorites(action).await,
        }
    }
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let api_key = inquire::Password::new("OpenWeatherMap API key:")
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;
    config.set_api_key(api_key);

    let city = inquire::Text::new("Default city:")
        .with_default(&config.default_city)
        .prompt()
        .context("Failed to read default city")?;
    config.set_default_city(&city);

    config.save()?;
    println!("Configuration saved to {}", Config::config_file_path()?.display());
    Ok(())
}

fn orchestrator(
    config: &Config,
    location: CommandLineLocation,
) -> anyhow::Result<OrchestratorHandle> {
    let collaborators = Collaborators {
        weather: Arc::new(OpenWeatherClient::from_config(config)?),
        location: Arc::new(location),
        geocoder: Arc::new(OpenWeatherGeocoder::from_config(config)?),
    };
    Ok(WeatherOrchestrator::spawn(collaborators, OrchestratorConfig::from(config)))
}

async fn settle(handle: &OrchestratorHandle) -> anyhow::Result<WeatherState> {
    let state = handle
        .wait_for(WeatherState::is_settled)
        .await
        .ok_or_else(|| anyhow!("Weather orchestrator stopped unexpectedly"))?;
    tracing::debug!(phase = ?state.phase, city = %state.current_city, "Weather settled");
    Ok(state)
}

async fn search(text: &str) -> anyhow::Result<()> {
    if text.trim().is_empty() {
        bail!("Search text must not be empty");
    }

    let config = Config::load()?;
    let geocoder = Arc::new(OpenWeatherGeocoder::from_config(&config)?);
    let handle = SearchPipeline::spawn(geocoder.clone(), geocoder, SearchConfig::from(&config));

    let state = search_once(&handle, text).await?;
    output::print_search(&state);
    Ok(())
}

/// Submits `text` and waits until the batch for exactly that query has finished,
/// whatever its outcome.
async fn search_once(handle: &SearchHandle, text: &str) -> anyhow::Result<SearchState> {
    let mut rx = handle.subscribe();
    handle.query_changed(text);

    let state = rx
        .wait_for(|s| s.query == text && s.status != SearchStatus::Searching)
        .await
        .context("Search pipeline stopped unexpectedly")?
        .clone();
    tracing::debug!(status = ?state.status, results = state.results.len(), "Search finished");
    Ok(state)
}

/// Looks `city` up directly, without the default-city fallback, so a failed
/// lookup never touches the saved list. Returns the saved name and whether the
/// city ended up saved.
async fn toggle_favorite(
    list: &mut FavoritesList,
    client: &dyn WeatherApiClient,
    city: &str,
) -> anyhow::Result<(String, bool)> {
    let weather = client
        .fetch_current_weather(&Lookup::City(city.to_string()))
        .await
        .map_err(WeatherError::from)
        .with_context(|| format!("Failed to look up {city:?}"))?;

    let favorite = FavoriteLocation::from_weather(&weather, &weather.name);
    let name = favorite.name.clone();
    Ok((name, list.toggle(favorite)))
}

async fn favorites(action: FavoritesCommand) -> anyhow::Result<()> {
    let mut list = FavoritesList::load()?;

    match action {
        FavoritesCommand::List => output::print_favorites(&list),
        FavoritesCommand::Toggle { city } => {
            let config = Config::load()?;
            let client = OpenWeatherClient::from_config(&config)?;

            let (name, saved) = toggle_favorite(&mut list, &client, &city).await?;
            list.save()?;
            tracing::debug!(favorites = list.len(), "Favorites saved");

            if saved {
                println!("Added {name} to favorites");
            } else {
                println!("Removed {name} from favorites");
            }
        }
        FavoritesCommand::Show { index, details } => {
            let favorite = list.items().get(index).ok_or_else(|| {
                anyhow!("No favorite at index {index}; see `weather favorites list`")
            })?;

            let config = Config::load()?;
            let handle = orchestrator(&config, CommandLineLocation::new(None, None))?;
            handle.resolve(favorite.query(), false);
            let state = settle(&handle).await?;
            output::print_weather(&state, &config.units, details);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use async_trait::async_trait;
    use chrono::Utc;
    use weather_core::{
        ApiError, CompletionSource, Coordinate, CurrentWeather, ForecastEntry, Geocoder,
        PlaceMatch, SearchCandidate, SearchError, model::Readings,
    };

    use super::*;

    #[derive(Debug, Default)]
    struct StubWeather {
        cities: HashMap<String, Result<CurrentWeather, ApiError>>,
    }

    impl StubWeather {
        fn with(mut self, city: &str, result: Result<CurrentWeather, ApiError>) -> Self {
            self.cities.insert(city.to_string(), result);
            self
        }
    }

    #[async_trait]
    impl WeatherApiClient for StubWeather {
        async fn fetch_current_weather(&self, lookup: &Lookup) -> Result<CurrentWeather, ApiError> {
            match lookup {
                Lookup::City(name) => {
                    self.cities.get(name).cloned().unwrap_or(Err(ApiError::CityNotFound))
                }
                Lookup::Coordinate(_) => Err(ApiError::NoData),
            }
        }

        async fn fetch_forecast(&self, _lookup: &Lookup) -> Result<Vec<ForecastEntry>, ApiError> {
            Ok(Vec::new())
        }
    }

    fn current(id: i64, name: &str, lat: f64, lon: f64) -> CurrentWeather {
        CurrentWeather {
            city_id: id,
            name: name.to_string(),
            country: "XX".to_string(),
            coordinate: Coordinate::new(lat, lon),
            readings: Readings {
                temperature: 12.0,
                temp_min: 10.0,
                temp_max: 14.0,
                humidity: 60,
                pressure: 1012,
            },
            conditions: Vec::new(),
            wind: None,
            observed_at: Utc::now(),
        }
    }

    fn lviv_saved() -> FavoritesList {
        let mut list = FavoritesList::default();
        let lviv = current(702_550, "Lviv", 49.84, 24.02);
        list.toggle(FavoriteLocation::from_weather(&lviv, "Lviv"));
        list
    }

    #[tokio::test]
    async fn toggle_failure_leaves_favorites_untouched() {
        let client = StubWeather::default()
            .with("Lviv", Ok(current(702_550, "Lviv", 49.84, 24.02)))
            .with("Paris", Err(ApiError::Other("HTTP Error: 500".into())));
        let mut list = lviv_saved();

        let err = toggle_favorite(&mut list, &client, "Paris").await.unwrap_err();

        assert!(err.to_string().contains("Paris"));
        assert_eq!(list, lviv_saved());
        assert_eq!(list.items()[0].name, "Lviv");
    }

    #[tokio::test]
    async fn toggle_adds_and_removes_the_requested_city() {
        let client =
            StubWeather::default().with("Paris", Ok(current(2_988_507, "Paris", 48.85, 2.35)));
        let mut list = lviv_saved();

        let (name, saved) = toggle_favorite(&mut list, &client, "Paris").await.expect("added");
        assert_eq!((name.as_str(), saved), ("Paris", true));
        assert_eq!(list.len(), 2);

        let (_, saved) = toggle_favorite(&mut list, &client, "Paris").await.expect("removed");
        assert!(!saved);
        assert_eq!(list, lviv_saved());
    }

    #[derive(Debug)]
    struct CancellingCompletion;

    #[async_trait]
    impl CompletionSource for CancellingCompletion {
        async fn complete(&self, _fragment: &str) -> Result<Vec<SearchCandidate>, SearchError> {
            Err(SearchError::Cancelled)
        }
    }

    #[derive(Debug)]
    struct NoPlaces;

    #[async_trait]
    impl Geocoder for NoPlaces {
        async fn reverse_geocode(&self, _coordinate: Coordinate) -> Option<String> {
            None
        }

        async fn search_place(&self, _candidate: &SearchCandidate) -> Option<PlaceMatch> {
            None
        }
    }

    #[tokio::test]
    async fn search_returns_when_completion_is_cancelled() {
        let config = SearchConfig { debounce: Duration::from_millis(1), max_candidates: 4 };
        let handle =
            SearchPipeline::spawn(Arc::new(CancellingCompletion), Arc::new(NoPlaces), config);

        let state = tokio::time::timeout(Duration::from_secs(5), search_once(&handle, "Ber"))
            .await
            .expect("search finished")
            .expect("pipeline alive");

        assert_eq!(state.query, "Ber");
        assert_eq!(state.status, SearchStatus::Idle);
        assert!(state.results.is_empty());
    }

    #[test]
    fn show_accepts_negative_coordinates() {
        let cli = Cli::try_parse_from(["weather", "show", "--lat", "-33.87", "--lon", "151.21"])
            .expect("valid args");
        match cli.command {
            Command::Show { city, lat, lon, details } => {
                assert_eq!(city, None);
                assert_eq!(lat, Some(-33.87));
                assert_eq!(lon, Some(151.21));
                assert!(!details);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn lat_requires_lon() {
        assert!(Cli::try_parse_from(["weather", "show", "--lat", "10"]).is_err());
    }

    #[test]
    fn favorites_show_takes_an_index() {
        let cli = Cli::try_parse_from(["weather", "favorites", "show", "2", "--details"])
            .expect("valid args");
        assert!(matches!(
            cli.command,
            Command::Favorites { action: FavoritesCommand::Show { index: 2, details: true } }
        ));
    }
}
