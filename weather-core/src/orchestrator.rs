//! Top-level state machine deciding which weather is shown.
//!
//! The orchestrator runs as a single task that owns all resolution state.
//! Public operations arrive as commands; every collaborator call runs in its
//! own task and reports back as a [`Completion`] on a second channel, so state
//! is only ever touched from the orchestrator task. Each public operation
//! starts a new generation and completions from older generations are dropped,
//! which makes the most recent request win regardless of response order.

use std::{sync::Arc, time::Duration};

use tokio::sync::{mpsc, watch};

use crate::{
    config::{Config, DEFAULT_CITY},
    error::{ApiError, LocationError, WeatherError},
    forecast::ForecastDigest,
    location::{LocationProvider, LocationResolver},
    model::{Coordinate, CurrentWeather, ForecastEntry, Lookup, WeatherQuery},
    provider::{Geocoder, WeatherApiClient},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    ResolvingLocation,
    FetchingCurrent,
    FetchingForecast,
    Loaded,
    Error,
}

/// Everything presentation needs to render the weather screen.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherState {
    pub phase: Phase,
    pub current_city: String,
    pub current_weather: Option<CurrentWeather>,
    pub forecast: ForecastDigest,
    pub is_loading: bool,
    pub error: Option<WeatherError>,
    /// Location access was denied on an explicit refresh; offer system settings.
    pub show_settings_alert: bool,
    pub is_initial_load: bool,
}

impl WeatherState {
    fn initial(default_city: &str) -> Self {
        Self {
            phase: Phase::Idle,
            current_city: default_city.to_string(),
            current_weather: None,
            forecast: ForecastDigest::default(),
            is_loading: false,
            error: None,
            show_settings_alert: false,
            is_initial_load: true,
        }
    }

    /// No request in flight and the last one reached a terminal phase.
    pub fn is_settled(&self) -> bool {
        !self.is_loading && matches!(self.phase, Phase::Loaded | Phase::Error)
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub default_city: String,
    pub location_timeout: Duration,
    pub location_cache_max_age: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_city: DEFAULT_CITY.to_string(),
            location_timeout: Duration::from_secs(10),
            location_cache_max_age: Duration::from_secs(300),
        }
    }
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        Self {
            default_city: config.default_city.clone(),
            location_timeout: config.location_timeout(),
            location_cache_max_age: config.location_cache_max_age(),
        }
    }
}

/// The collaborators the orchestrator owns.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub weather: Arc<dyn WeatherApiClient>,
    pub location: Arc<dyn LocationProvider>,
    pub geocoder: Arc<dyn Geocoder>,
}

#[derive(Debug)]
enum Command {
    RequestInitialLocation,
    Resolve { query: WeatherQuery, is_user_search: bool },
    ForceRefreshLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocationOrigin {
    InitialLoad,
    ForcedRefresh,
}

#[derive(Debug)]
struct Located {
    coordinate: Coordinate,
    name: Option<String>,
}

/// One current-weather fetch and how to interpret its result.
#[derive(Debug, Clone)]
struct Attempt {
    label: Option<String>,
    /// This fetch is the fallback to the default city.
    is_system_reserve: bool,
}

#[derive(Debug)]
enum Completion {
    Location {
        generation: u64,
        origin: LocationOrigin,
        result: Result<Located, LocationError>,
    },
    Current {
        generation: u64,
        attempt: Attempt,
        result: Result<CurrentWeather, ApiError>,
    },
    Forecast {
        generation: u64,
        result: Result<Vec<ForecastEntry>, ApiError>,
    },
}

impl Completion {
    fn generation(&self) -> u64 {
        match self {
            Completion::Location { generation, .. }
            | Completion::Current { generation, .. }
            | Completion::Forecast { generation, .. } => *generation,
        }
    }
}

#[derive(Debug)]
struct ResolutionContext {
    is_user_search: bool,
    is_initial_load: bool,
    initial_request_pending: bool,
}

/// Cloneable handle used by presentation to drive and observe the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<WeatherState>,
}

impl OrchestratorHandle {
    /// Resolve the device location on first launch. No-op once weather has
    /// loaded or while a resolution is outstanding.
    pub fn request_initial_location(&self) {
        self.send(Command::RequestInitialLocation);
    }

    /// Entry point for search submissions and favorite taps.
    pub fn resolve(&self, query: WeatherQuery, is_user_search: bool) {
        self.send(Command::Resolve { query, is_user_search });
    }

    /// "Use my location": reuses a recent fix, otherwise asks the device with a timeout.
    pub fn force_refresh_location(&self) {
        self.send(Command::ForceRefreshLocation);
    }

    pub fn state(&self) -> WeatherState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WeatherState> {
        self.state.clone()
    }

    /// Waits for the first state matching `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&WeatherState) -> bool,
    ) -> Option<WeatherState> {
        let mut rx = self.state.clone();
        rx.wait_for(predicate).await.ok().map(|s| s.clone())
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("Weather orchestrator has stopped; command ignored");
        }
    }
}

pub struct WeatherOrchestrator {
    collaborators: Collaborators,
    resolver: Arc<LocationResolver>,
    config: OrchestratorConfig,
    ctx: ResolutionContext,
    generation: u64,
    state: WeatherState,
    published: watch::Sender<WeatherState>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl WeatherOrchestrator {
    /// Starts the orchestrator task; it stops once every handle is dropped.
    pub fn spawn(collaborators: Collaborators, config: OrchestratorConfig) -> OrchestratorHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let state = WeatherState::initial(&config.default_city);
        let (state_tx, state_rx) = watch::channel(state.clone());

        let resolver = Arc::new(LocationResolver::new(
            collaborators.location.clone(),
            config.location_timeout,
        ));

        let orchestrator = WeatherOrchestrator {
            collaborators,
            resolver,
            config,
            ctx: ResolutionContext {
                is_user_search: false,
                is_initial_load: true,
                initial_request_pending: false,
            },
            generation: 0,
            state,
            published: state_tx,
            completions: completion_tx,
        };
        tokio::spawn(orchestrator.run(command_rx, completion_rx));

        OrchestratorHandle { commands: command_tx, state: state_rx }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(completion) = completions.recv() => self.handle_completion(completion),
            }
            self.publish();
        }
        tracing::debug!("Weather orchestrator stopped");
    }

    fn publish(&mut self) {
        self.state.is_initial_load = self.ctx.is_initial_load;
        if *self.published.borrow() != self.state {
            self.published.send_replace(self.state.clone());
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn begin_loading(&mut self, phase: Phase) {
        self.state.phase = phase;
        self.state.is_loading = true;
        self.state.error = None;
    }

    fn fail(&mut self, error: WeatherError) {
        tracing::info!("Resolution failed: {error}");
        self.state.phase = Phase::Error;
        self.state.is_loading = false;
        self.state.error = Some(error);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::RequestInitialLocation => {
                if !self.ctx.is_initial_load
                    || self.ctx.initial_request_pending
                    || self.state.is_loading
                {
                    tracing::debug!("Initial location request ignored");
                    return;
                }
                self.next_generation();
                self.ctx.initial_request_pending = true;
                self.begin_loading(Phase::ResolvingLocation);
                self.spawn_location(LocationOrigin::InitialLoad);
            }
            Command::Resolve { query, is_user_search } => {
                self.next_generation();
                self.start_resolution(query, is_user_search);
            }
            Command::ForceRefreshLocation => {
                self.next_generation();
                self.state.show_settings_alert = false;
                self.begin_loading(Phase::ResolvingLocation);
                self.spawn_location(LocationOrigin::ForcedRefresh);
            }
        }
    }

    fn start_resolution(&mut self, query: WeatherQuery, is_user_search: bool) {
        self.ctx.is_user_search = is_user_search;
        self.begin_loading(Phase::FetchingCurrent);

        match query {
            WeatherQuery::Coordinates { coordinate, label } => {
                tracing::info!(generation = self.generation, "Resolving weather at {coordinate}");
                self.spawn_current(
                    Lookup::Coordinate(coordinate),
                    Attempt { label, is_system_reserve: false },
                );
            }
            WeatherQuery::City { name } => {
                tracing::info!(generation = self.generation, "Resolving weather for {name:?}");
                let is_system_reserve = name == self.config.default_city;
                self.state.current_city = name.clone();
                self.spawn_current(Lookup::City(name), Attempt { label: None, is_system_reserve });
            }
        }
    }

    fn fall_back_to_default_city(&mut self) {
        let city = self.config.default_city.clone();
        tracing::warn!("Falling back to default city {city:?}");
        self.state.current_city = city.clone();
        self.state.phase = Phase::FetchingCurrent;
        self.spawn_current(Lookup::City(city), Attempt { label: None, is_system_reserve: true });
    }

    fn handle_completion(&mut self, completion: Completion) {
        if let Completion::Location { origin: LocationOrigin::InitialLoad, .. } = &completion {
            self.ctx.initial_request_pending = false;
        }

        if completion.generation() != self.generation {
            tracing::debug!(
                stale = completion.generation(),
                current = self.generation,
                "Dropping superseded result"
            );
            return;
        }

        match completion {
            Completion::Location { origin, result, .. } => self.on_location(origin, result),
            Completion::Current { attempt, result, .. } => self.on_current(attempt, result),
            Completion::Forecast { result, .. } => self.on_forecast(result),
        }
    }

    fn on_location(&mut self, origin: LocationOrigin, result: Result<Located, LocationError>) {
        match (origin, result) {
            (_, Ok(located)) => {
                let query = WeatherQuery::coordinates(located.coordinate, located.name);
                self.start_resolution(query, false);
            }
            (LocationOrigin::InitialLoad, Err(err)) => {
                tracing::info!("Initial location unavailable ({err})");
                if self.ctx.is_initial_load {
                    self.ctx.is_user_search = false;
                    self.fall_back_to_default_city();
                } else {
                    self.state.is_loading = false;
                    self.state.phase = Phase::Loaded;
                }
            }
            (LocationOrigin::ForcedRefresh, Err(err)) => {
                if err == LocationError::AccessDenied {
                    self.state.show_settings_alert = true;
                }
                self.fail(err.into());
            }
        }
    }

    fn on_current(&mut self, attempt: Attempt, result: Result<CurrentWeather, ApiError>) {
        match result {
            Ok(weather) => {
                self.state.current_city = attempt
                    .label
                    .filter(|label| !label.is_empty())
                    .unwrap_or_else(|| weather.name.clone());
                self.ctx.is_initial_load = false;
                self.state.phase = Phase::FetchingForecast;

                // Forecast follows the coordinate the API resolved, not the input.
                let lookup = Lookup::Coordinate(weather.coordinate);
                self.state.current_weather = Some(weather);
                self.spawn_forecast(lookup);
            }
            Err(ApiError::CityNotFound) if self.ctx.is_user_search => {
                self.state.current_weather = None;
                self.state.forecast = ForecastDigest::default();
                self.fail(WeatherError::CityNotFound);
            }
            Err(err) if !attempt.is_system_reserve => {
                tracing::info!("Current weather failed ({err})");
                self.fall_back_to_default_city();
            }
            Err(err) => {
                self.fail(WeatherError::NetworkOrDecoding(err.to_string()));
            }
        }
    }

    fn on_forecast(&mut self, result: Result<Vec<ForecastEntry>, ApiError>) {
        self.state.is_loading = false;
        match result {
            Ok(entries) => {
                self.state.forecast = ForecastDigest::from_entries(&entries);
                self.state.phase = Phase::Loaded;
                tracing::info!("Weather loaded for {:?}", self.state.current_city);
            }
            Err(err) => {
                tracing::warn!("Forecast failed: {err}");
                self.state.phase = Phase::Error;
                if self.state.error.is_none() {
                    self.state.error = Some(WeatherError::NetworkOrDecoding(err.to_string()));
                }
            }
        }
    }

    fn spawn_location(&self, origin: LocationOrigin) {
        let generation = self.generation;
        let resolver = self.resolver.clone();
        let geocoder = self.collaborators.geocoder.clone();
        let completions = self.completions.clone();
        let timeout = self.config.location_timeout;
        let max_age = self.config.location_cache_max_age;

        tokio::spawn(async move {
            let coordinate = match origin {
                LocationOrigin::InitialLoad => resolver.request_location(timeout).await,
                LocationOrigin::ForcedRefresh => resolver.current_location(max_age).await,
            };
            let result = match coordinate {
                Ok(coordinate) => {
                    let name = geocoder.reverse_geocode(coordinate).await;
                    Ok(Located { coordinate, name })
                }
                Err(err) => Err(err),
            };
            let _ = completions.send(Completion::Location { generation, origin, result });
        });
    }

    fn spawn_current(&self, lookup: Lookup, attempt: Attempt) {
        let generation = self.generation;
        let client = self.collaborators.weather.clone();
        let completions = self.completions.clone();

        tokio::spawn(async move {
            let result = client.fetch_current_weather(&lookup).await;
            let _ = completions.send(Completion::Current { generation, attempt, result });
        });
    }

    fn spawn_forecast(&self, lookup: Lookup) {
        let generation = self.generation;
        let client = self.collaborators.weather.clone();
        let completions = self.completions.clone();

        tokio::spawn(async move {
            let result = client.fetch_forecast(&lookup).await;
            let _ = completions.send(Completion::Forecast { generation, result });
        });
    }
}
