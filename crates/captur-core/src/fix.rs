//! GPS samples and the identity they are recorded under.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Backend user identity. Every location row and ledger credit is keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FixError {
    #[error("fix has no coordinates")]
    MissingCoordinates,

    #[error("coordinate is not a finite number")]
    NonFinite,

    #[error("coordinate out of range: lat={lat}, lng={lng}")]
    OutOfRange { lat: f64, lng: f64 },
}

/// A single validated GPS sample. Immutable once captured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LocationFix {
    /// Builds a fix from bare coordinates, rejecting anything that is not a
    /// finite point on the globe.
    ///
    /// # Errors
    ///
    /// Returns [`FixError::NonFinite`] for NaN/infinite input and
    /// [`FixError::OutOfRange`] when latitude or longitude leave their ranges.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, FixError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(FixError::NonFinite);
        }
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(FixError::OutOfRange {
                lat: latitude,
                lng: longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
            speed: None,
            timestamp: None,
        })
    }

    #[must_use]
    pub fn with_speed(mut self, speed: Option<f64>) -> Self {
        self.speed = speed.filter(|s| s.is_finite());
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A sample as delivered by a location provider, before validation.
///
/// Providers occasionally emit partial samples; those are turned away by
/// [`LocationFix::try_from`] and never reach the logger or the grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFix {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TryFrom<RawFix> for LocationFix {
    type Error = FixError;

    fn try_from(raw: RawFix) -> Result<Self, Self::Error> {
        let (Some(lat), Some(lng)) = (raw.latitude, raw.longitude) else {
            return Err(FixError::MissingCoordinates);
        };
        Ok(LocationFix::new(lat, lng)?
            .with_speed(raw.speed)
            .with_timestamp(raw.timestamp))
    }
}

impl From<LocationFix> for RawFix {
    fn from(fix: LocationFix) -> Self {
        Self {
            latitude: Some(fix.latitude),
            longitude: Some(fix.longitude),
            speed: fix.speed,
            timestamp: fix.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_fix_without_coordinates_is_rejected() {
        let raw = RawFix {
            latitude: Some(40.0),
            ..RawFix::default()
        };
        assert_eq!(
            LocationFix::try_from(raw).unwrap_err(),
            FixError::MissingCoordinates
        );
    }

    #[test]
    fn nan_coordinates_are_rejected() {
        assert_eq!(
            LocationFix::new(f64::NAN, 3.0).unwrap_err(),
            FixError::NonFinite
        );
    }

    #[test]
    fn out_of_range_latitude_is_rejected() {
        assert!(matches!(
            LocationFix::new(91.0, 0.0),
            Err(FixError::OutOfRange { .. })
        ));
    }

    #[test]
    fn non_finite_speed_is_dropped() {
        let fix = LocationFix::new(40.4, -3.7)
            .unwrap()
            .with_speed(Some(f64::INFINITY));
        assert!(fix.speed.is_none());
    }

    #[test]
    fn raw_fix_parses_from_partial_json() {
        let raw: RawFix =
            serde_json::from_str(r#"{"latitude": 40.41, "longitude": -3.70, "speed": 1.5}"#)
                .unwrap();
        let fix = LocationFix::try_from(raw).unwrap();
        assert!((fix.latitude - 40.41).abs() < f64::EPSILON);
        assert_eq!(fix.speed, Some(1.5));
        assert!(fix.timestamp.is_none());
    }
}
