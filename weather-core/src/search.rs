//! Debounced city search with concurrent candidate verification.
//!
//! Each debounced query starts a batch tagged with a generation number. The
//! batch asks the completion source for candidates, verifies the shortlist in
//! parallel against the geocoder and reports back to the pipeline task, which
//! publishes the outcome only if no newer query has replaced it.

use std::{collections::HashSet, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{
    sync::{mpsc, watch},
    task::JoinSet,
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    error::{SearchError, WeatherError},
    model::{SearchCandidate, VerifiedCity},
    provider::{CompletionSource, Geocoder},
};

#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub debounce: Duration,
    pub max_candidates: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { debounce: Duration::from_millis(500), max_candidates: 4 }
    }
}

impl From<&Config> for SearchConfig {
    fn from(config: &Config) -> Self {
        Self { debounce: config.debounce(), max_candidates: config.search.max_candidates }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SearchStatus {
    /// No query yet, or the input was cleared.
    #[default]
    Idle,
    Searching,
    Found,
    NoCityFound,
    Failed(WeatherError),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchState {
    pub query: String,
    /// Verified cities, unique by identity, sorted by title.
    pub results: Vec<VerifiedCity>,
    pub status: SearchStatus,
}

/// Keeps the first `limit` candidates and drops numeric-leading titles.
pub fn shortlist(candidates: Vec<SearchCandidate>, limit: usize) -> Vec<SearchCandidate> {
    candidates.into_iter().take(limit).filter(|c| !c.looks_numeric()).collect()
}

/// Handle to a running search pipeline.
#[derive(Debug, Clone)]
pub struct SearchHandle {
    input: mpsc::UnboundedSender<String>,
    state: watch::Receiver<SearchState>,
}

impl SearchHandle {
    /// Feed the current contents of the search field.
    pub fn query_changed(&self, text: impl Into<String>) {
        if self.input.send(text.into()).is_err() {
            tracing::warn!("Search pipeline has stopped; input ignored");
        }
    }

    pub fn state(&self) -> SearchState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.state.clone()
    }
}

pub struct SearchPipeline {
    completion: Arc<dyn CompletionSource>,
    geocoder: Arc<dyn Geocoder>,
    config: SearchConfig,
    generation: u64,
    active: Option<CancellationToken>,
    last_submitted: Option<String>,
    state: watch::Sender<SearchState>,
    outcomes: mpsc::UnboundedSender<BatchOutcome>,
}

impl SearchPipeline {
    /// Starts the pipeline task; it stops once every handle is dropped.
    pub fn spawn(
        completion: Arc<dyn CompletionSource>,
        geocoder: Arc<dyn Geocoder>,
        config: SearchConfig,
    ) -> SearchHandle {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SearchState::default());

        let pipeline = SearchPipeline {
            completion,
            geocoder,
            config,
            generation: 0,
            active: None,
            last_submitted: None,
            state: state_tx,
            outcomes: outcome_tx,
        };
        tokio::spawn(pipeline.run(input_rx, outcome_rx));

        SearchHandle { input: input_tx, state: state_rx }
    }

    async fn run(
        mut self,
        mut input: mpsc::UnboundedReceiver<String>,
        mut outcomes: mpsc::UnboundedReceiver<BatchOutcome>,
    ) {
        let mut pending: Option<(String, Instant)> = None;

        loop {
            let deadline = pending.as_ref().map(|(_, at)| *at);
            tokio::select! {
                text = input.recv() => match text {
                    None => break,
                    Some(text) if text.is_empty() => {
                        pending = None;
                        self.clear();
                    }
                    Some(text) => pending = Some((text, Instant::now() + self.config.debounce)),
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() =>
                {
                    if let Some((text, _)) = pending.take() {
                        self.submit(text);
                    }
                }
                Some(outcome) = outcomes.recv() => self.apply(outcome),
            }
        }

        self.cancel_active();
        tracing::debug!("Search pipeline stopped");
    }

    fn cancel_active(&mut self) {
        if let Some(token) = self.active.take() {
            token.cancel();
        }
    }

    fn clear(&mut self) {
        self.cancel_active();
        self.generation += 1;
        self.last_submitted = Some(String::new());
        self.state.send_replace(SearchState::default());
    }

    fn submit(&mut self, fragment: String) {
        if self.last_submitted.as_deref() == Some(fragment.as_str()) {
            tracing::debug!("Query {fragment:?} unchanged, skipping");
            return;
        }

        self.cancel_active();
        self.generation += 1;
        let token = CancellationToken::new();
        self.active = Some(token.clone());
        self.last_submitted = Some(fragment.clone());

        self.state.send_modify(|s| {
            s.query = fragment.clone();
            s.status = SearchStatus::Searching;
        });
        tracing::debug!(generation = self.generation, "Searching for {fragment:?}");

        let batch = VerificationBatch {
            generation: self.generation,
            fragment,
            completion: self.completion.clone(),
            geocoder: self.geocoder.clone(),
            token,
            max_candidates: self.config.max_candidates,
        };
        let outcomes = self.outcomes.clone();
        tokio::spawn(async move {
            let outcome = batch.run().await;
            let _ = outcomes.send(outcome);
        });
    }

    fn apply(&mut self, outcome: BatchOutcome) {
        if outcome.generation != self.generation {
            tracing::debug!(
                stale = outcome.generation,
                current = self.generation,
                "Discarding superseded search batch"
            );
            return;
        }
        self.active = None;

        self.state.send_modify(|s| match outcome.result {
            BatchResult::Cancelled => {
                s.status =
                    if s.results.is_empty() { SearchStatus::Idle } else { SearchStatus::Found };
            }
            BatchResult::Transport(msg) => {
                tracing::warn!("City search failed: {msg}");
                s.status = SearchStatus::Failed(WeatherError::SearchTransport(msg));
            }
            BatchResult::Verified(cities) if cities.is_empty() => {
                s.results.clear();
                s.status = SearchStatus::NoCityFound;
            }
            BatchResult::Verified(cities) => {
                s.results = cities;
                s.status = SearchStatus::Found;
            }
        });
    }
}

#[derive(Debug)]
struct BatchOutcome {
    generation: u64,
    result: BatchResult,
}

#[derive(Debug)]
enum BatchResult {
    Cancelled,
    Transport(String),
    Verified(Vec<VerifiedCity>),
}

struct VerificationBatch {
    generation: u64,
    fragment: String,
    completion: Arc<dyn CompletionSource>,
    geocoder: Arc<dyn Geocoder>,
    token: CancellationToken,
    max_candidates: usize,
}

impl VerificationBatch {
    async fn run(self) -> BatchOutcome {
        let result = self.verify().await;
        BatchOutcome { generation: self.generation, result }
    }

    async fn verify(&self) -> BatchResult {
        let completed = tokio::select! {
            _ = self.token.cancelled() => return BatchResult::Cancelled,
            completed = self.completion.complete(&self.fragment) => completed,
        };

        let candidates = match completed {
            Ok(candidates) => shortlist(candidates, self.max_candidates),
            Err(SearchError::Cancelled) => return BatchResult::Cancelled,
            Err(SearchError::Transport(msg)) => return BatchResult::Transport(msg),
        };
        if candidates.is_empty() {
            return BatchResult::Verified(Vec::new());
        }

        let verified = Arc::new(Mutex::new(HashSet::new()));
        let mut lookups = JoinSet::new();

        for candidate in candidates {
            let geocoder = self.geocoder.clone();
            let token = self.token.clone();
            let verified = verified.clone();

            lookups.spawn(async move {
                let place = tokio::select! {
                    _ = token.cancelled() => return,
                    place = geocoder.search_place(&candidate) => place,
                };
                let Some(city) = place.and_then(|p| VerifiedCity::from_match(&candidate, &p)) else {
                    return;
                };

                let mut set = verified.lock();
                if !token.is_cancelled() {
                    set.insert(city);
                }
            });
        }

        while let Some(joined) = lookups.join_next().await {
            if let Err(e) = joined {
                tracing::warn!("Verification lookup did not finish: {e}");
            }
        }

        if self.token.is_cancelled() {
            return BatchResult::Cancelled;
        }

        let mut cities: Vec<VerifiedCity> = verified.lock().drain().collect();
        cities.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.subtitle.cmp(&b.subtitle)));
        BatchResult::Verified(cities)
    }
}
