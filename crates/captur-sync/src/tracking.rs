//! Start/stop control over the platform's location updates.
//!
//! The provider itself (permission prompt, OS-scheduled background task) is
//! an external collaborator behind [`LocationProvider`]. The controller
//! only tracks state. It never flushes the pending queue; callers sync
//! before toggling.

use std::future::Future;
use std::sync::Arc;

use crate::error::TrackingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    Low,
    Balanced,
    High,
}

/// How often the provider should deliver fixes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingOptions {
    pub accuracy: Accuracy,
    pub time_interval_ms: u64,
    pub distance_interval_m: f64,
}

impl TrackingOptions {
    /// Live watch while the map is on screen.
    #[must_use]
    pub fn foreground() -> Self {
        Self {
            accuracy: Accuracy::High,
            time_interval_ms: 1_000,
            distance_interval_m: 10.0,
        }
    }

    /// OS-scheduled task while the app is in the background.
    #[must_use]
    pub fn background() -> Self {
        Self {
            accuracy: Accuracy::Balanced,
            time_interval_ms: 30_000,
            distance_interval_m: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Source of raw location fixes.
pub trait LocationProvider: Send + Sync {
    fn request_permission(
        &self,
    ) -> impl Future<Output = Result<PermissionStatus, TrackingError>> + Send;

    fn start_updates(
        &self,
        options: TrackingOptions,
    ) -> impl Future<Output = Result<(), TrackingError>> + Send;

    fn stop_updates(&self) -> impl Future<Output = Result<(), TrackingError>> + Send;

    /// Whether location updates are currently registered with the platform.
    fn is_registered(&self) -> impl Future<Output = bool> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Idle,
    Tracking,
    /// Terminal for this controller; the user has to re-grant access.
    PermissionDenied,
}

pub struct TrackingController<P> {
    provider: Arc<P>,
    options: TrackingOptions,
    state: TrackingState,
}

impl<P: LocationProvider> TrackingController<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, options: TrackingOptions) -> Self {
        Self {
            provider,
            options,
            state: TrackingState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> TrackingState {
        self.state
    }

    #[must_use]
    pub fn options(&self) -> TrackingOptions {
        self.options
    }

    /// Starts location updates. Already-registered updates are adopted
    /// without asking again.
    ///
    /// # Errors
    ///
    /// Returns [`TrackingError::PermissionDenied`] when access is refused,
    /// now or earlier in this controller's life, and [`TrackingError::Provider`]
    /// when the provider fails to start.
    pub async fn start(&mut self) -> Result<TrackingState, TrackingError> {
        if self.state == TrackingState::PermissionDenied {
            return Err(TrackingError::PermissionDenied);
        }
        if self.provider.is_registered().await {
            self.state = TrackingState::Tracking;
            return Ok(self.state);
        }
        if self.provider.request_permission().await? == PermissionStatus::Denied {
            tracing::warn!("location permission denied");
            self.state = TrackingState::PermissionDenied;
            return Err(TrackingError::PermissionDenied);
        }
        self.provider.start_updates(self.options).await?;
        tracing::info!(
            interval_ms = self.options.time_interval_ms,
            distance_m = self.options.distance_interval_m,
            "location tracking started"
        );
        self.state = TrackingState::Tracking;
        Ok(self.state)
    }

    /// Stops location updates if registered. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TrackingError::Provider`] if the provider fails to stop.
    pub async fn stop(&mut self) -> Result<(), TrackingError> {
        if self.provider.is_registered().await {
            self.provider.stop_updates().await?;
            tracing::info!("location tracking stopped");
        }
        if self.state == TrackingState::Tracking {
            self.state = TrackingState::Idle;
        }
        Ok(())
    }
}
