//! Device location with a staleness check and a timeout guard.

use std::{
    fmt::Debug,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::{error::LocationError, model::Coordinate};

/// Fixes the device reports that are older than this are discarded and
/// requested again.
pub const MAX_FIX_AGE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Authorized,
    Denied,
    Restricted,
    NotDetermined,
}

/// A coordinate plus the moment the device captured it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    pub coordinate: Coordinate,
    pub captured_at: DateTime<Utc>,
}

impl LocationFix {
    pub fn new(coordinate: Coordinate, captured_at: DateTime<Utc>) -> Self {
        Self { coordinate, captured_at }
    }

    pub fn age(&self) -> Duration {
        (Utc::now() - self.captured_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_younger_than(&self, max_age: Duration) -> bool {
        self.age() < max_age
    }
}

/// Platform location primitives.
#[async_trait]
pub trait LocationProvider: Send + Sync + Debug {
    async fn authorization_status(&self) -> AuthorizationStatus;

    /// Resolves on the next authorization change with the new status.
    async fn authorization_changed(&self) -> AuthorizationStatus;

    async fn request_location(&self) -> Result<LocationFix, LocationError>;

    /// Last fix the platform still remembers, if any.
    fn last_known(&self) -> Option<LocationFix> {
        None
    }
}

#[derive(Debug)]
pub struct LocationResolver {
    provider: Arc<dyn LocationProvider>,
    timeout: Duration,
    cached: Mutex<Option<LocationFix>>,
    latest_request: AtomicU64,
}

impl LocationResolver {
    pub fn new(provider: Arc<dyn LocationProvider>, timeout: Duration) -> Self {
        Self { provider, timeout, cached: Mutex::new(None), latest_request: AtomicU64::new(0) }
    }

    /// Freshest known fix younger than `max_age`.
    pub fn cached_fix(&self, max_age: Duration) -> Option<LocationFix> {
        let own = *self.cached.lock();
        [own, self.provider.last_known()]
            .into_iter()
            .flatten()
            .filter(|fix| fix.is_younger_than(max_age))
            .max_by_key(|fix| fix.captured_at)
    }

    /// Cached coordinate if recent enough, otherwise a new guarded request.
    pub async fn current_location(&self, max_age: Duration) -> Result<Coordinate, LocationError> {
        if let Some(fix) = self.cached_fix(max_age) {
            tracing::debug!("Reusing location fix captured {:?} ago", fix.age());
            return Ok(fix.coordinate);
        }
        self.request_location(self.timeout).await
    }

    /// Requests a new fix; gives up with [`LocationError::TimedOut`] after `timeout`.
    ///
    /// A response arriving after the timeout is dropped with the request future,
    /// and only the latest request may update the cache.
    pub async fn request_location(&self, timeout: Duration) -> Result<Coordinate, LocationError> {
        let request_id = self.latest_request.fetch_add(1, Ordering::SeqCst) + 1;

        match tokio::time::timeout(timeout, self.acquire()).await {
            Ok(Ok(fix)) => {
                if self.latest_request.load(Ordering::SeqCst) == request_id {
                    *self.cached.lock() = Some(fix);
                }
                Ok(fix.coordinate)
            }
            Ok(Err(err)) => {
                tracing::info!("Location request failed: {err}");
                Err(err)
            }
            Err(_) => {
                tracing::warn!("Location request timed out after {timeout:?}");
                Err(LocationError::TimedOut)
            }
        }
    }

    async fn acquire(&self) -> Result<LocationFix, LocationError> {
        let mut status = self.provider.authorization_status().await;
        loop {
            match status {
                AuthorizationStatus::Authorized => {
                    let fix = self.provider.request_location().await?;
                    if fix.is_younger_than(MAX_FIX_AGE) {
                        return Ok(fix);
                    }
                    tracing::debug!("Discarding location fix captured {:?} ago", fix.age());
                }
                AuthorizationStatus::Denied | AuthorizationStatus::Restricted => {
                    return Err(LocationError::AccessDenied);
                }
                AuthorizationStatus::NotDetermined => {
                    tracing::debug!("Location permission not determined yet, waiting");
                    status = self.provider.authorization_changed().await;
                }
            }
        }
    }
}
