//! The remote backend seam and the rows that cross it.
//!
//! Everything the tracking pipeline needs from the backend is an insert, a
//! filtered query, or the atomic balance increment. [`RemoteBackend`] names
//! exactly those calls so components can be built over the REST client in
//! production and over in-memory doubles in tests.

use std::future::Future;

use captur_core::{LocationFix, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::error::BackendError;

/// One row of the `locations` table as written by the client.
///
/// `user_id` is `None` only for records queued before the user could be
/// resolved; it is filled in at sync time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRow {
    pub user_id: Option<UserId>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LocationRow {
    #[must_use]
    pub fn from_fix(user_id: Option<UserId>, fix: &LocationFix) -> Self {
        Self {
            user_id,
            latitude: fix.latitude,
            longitude: fix.longitude,
            speed: fix.speed,
            timestamp: fix.timestamp,
        }
    }
}

/// A historical sample as returned by the range query.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryPoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewReport {
    #[serde(rename = "type")]
    pub kind: String,
    pub user_id: UserId,
    pub location_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NewReportValidation {
    pub report_id: i64,
    pub user_id: UserId,
    pub is_valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// The embedded location of a report comes back as an object or a one-element array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EmbeddedLocation {
    One(Coordinates),
    Many(Vec<Coordinates>),
}

impl EmbeddedLocation {
    #[must_use]
    pub fn first(&self) -> Option<Coordinates> {
        match self {
            EmbeddedLocation::One(c) => Some(*c),
            EmbeddedLocation::Many(list) => list.first().copied(),
        }
    }
}

/// A row from the `reports` table joined with its location.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportRow {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub locations: Option<EmbeddedLocation>,
}

/// Operations the client performs against the backend.
///
/// Every call suspends; none blocks a thread. Implementations decide their
/// own retry policy.
pub trait RemoteBackend: Send + Sync {
    /// Identity of the signed-in user.
    fn current_user(&self) -> impl Future<Output = Result<UserId, BackendError>> + Send;

    fn insert_location(
        &self,
        row: &LocationRow,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Inserts a location and returns the new row's id.
    fn insert_location_returning_id(
        &self,
        row: &LocationRow,
    ) -> impl Future<Output = Result<i64, BackendError>> + Send;

    /// Up to `limit` of the user's samples, oldest first.
    fn fetch_locations(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<HistoryPoint>, BackendError>> + Send;

    /// Server-side atomic `balance += amount`.
    fn increment_token_balance(
        &self,
        user_id: UserId,
        amount: i64,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn insert_report(
        &self,
        report: &NewReport,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Reports with `status = active` created at or after `since`.
    fn fetch_active_reports(
        &self,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<ReportRow>, BackendError>> + Send;

    fn set_report_status(
        &self,
        report_id: i64,
        status: &str,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn insert_report_validation(
        &self,
        validation: &NewReportValidation,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Number of `is_valid = false` validations recorded for a report.
    fn count_negative_validations(
        &self,
        report_id: i64,
    ) -> impl Future<Output = Result<u64, BackendError>> + Send;
}

/// Lazily resolved, then cached, user identity.
///
/// A failed lookup is not cached, so the next call tries again.
#[derive(Debug, Default)]
pub struct IdentityCache {
    user: OnceCell<UserId>,
}

impl IdentityCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache that already knows the user.
    #[must_use]
    pub fn known(user_id: UserId) -> Self {
        Self {
            user: OnceCell::new_with(Some(user_id)),
        }
    }

    /// # Errors
    ///
    /// Returns the backend's error when the user cannot be resolved.
    pub async fn resolve<B: RemoteBackend>(&self, backend: &B) -> Result<UserId, BackendError> {
        self.user
            .get_or_try_init(|| backend.current_user())
            .await
            .copied()
    }

    #[must_use]
    pub fn cached(&self) -> Option<UserId> {
        self.user.get().copied()
    }
}
