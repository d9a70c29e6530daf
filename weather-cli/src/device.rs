use async_trait::async_trait;
use chrono::Utc;
use weather_core::{AuthorizationStatus, Coordinate, LocationError, LocationFix, LocationProvider};

/// Stands in for device GPS: the coordinate given with `--lat`/`--lon`.
///
/// Without one, location access behaves as denied.
#[derive(Debug, Clone, Copy)]
pub struct CommandLineLocation {
    coordinate: Option<Coordinate>,
}

impl CommandLineLocation {
    pub fn new(lat: Option<f64>, lon: Option<f64>) -> Self {
        let coordinate = lat.zip(lon).map(|(lat, lon)| Coordinate::new(lat, lon));
        Self { coordinate }
    }
}

#[async_trait]
impl LocationProvider for CommandLineLocation {
    async fn authorization_status(&self) -> AuthorizationStatus {
        if self.coordinate.is_some() {
            AuthorizationStatus::Authorized
        } else {
            AuthorizationStatus::Denied
        }
    }

    async fn authorization_changed(&self) -> AuthorizationStatus {
        std::future::pending().await
    }

    async fn request_location(&self) -> Result<LocationFix, LocationError> {
        self.coordinate
            .map(|c| LocationFix::new(c, Utc::now()))
            .ok_or(LocationError::AccessDenied)
    }
}
